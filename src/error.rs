//! Error types for remedia.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend connection error: {0}")]
    Connection(String),

    #[error("Backend query failed: {0}")]
    Query(String),

    #[error("Unknown column {column} in sheet {sheet}")]
    UnknownColumn { sheet: String, column: String },

    #[error("Row has {got} cells, sheet {sheet} has {expected} columns")]
    ColumnCount {
        sheet: String,
        expected: usize,
        got: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound channel errors (email, messaging provider).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} is not configured")]
    NotConfigured { name: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid recipient for channel {name}: {reason}")]
    InvalidRecipient { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Notification dispatcher errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("Dispatch worker already shut down")]
    AlreadyShutDown,
}

/// Batch pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid upload row: {0}")]
    InvalidRow(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
