use std::sync::Arc;

use remedia::api::{self, AppState};
use remedia::channels::{
    DisabledEmailSender, DisabledMessagingSender, EmailSender, HttpMessagingSender,
    MessagingSender, SmtpEmailSender,
};
use remedia::config::AppConfig;
use remedia::dispatch::MessageQueue;
use remedia::pipeline::BatchProcessor;
use remedia::store::{LibSqlBackend, SheetService, TabularBackend};
use remedia::tools::{builtin, ToolRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("remedia v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/upload", config.http_port);
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.http_port);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Record store ─────────────────────────────────────────────────
    let backend: Arc<dyn TabularBackend> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    let store = SheetService::open(backend).await?;

    // ── Channels ─────────────────────────────────────────────────────
    let email: Arc<dyn EmailSender> = match config.smtp.clone() {
        Some(smtp) => Arc::new(SmtpEmailSender::new(smtp)),
        None => {
            tracing::warn!("SMTP not configured; email notices will be dropped");
            Arc::new(DisabledEmailSender)
        }
    };
    let messaging: Arc<dyn MessagingSender> = match config.messaging.clone() {
        Some(provider) => Arc::new(HttpMessagingSender::new(provider)),
        None => {
            tracing::warn!("Messaging provider not configured; queued messages will exhaust");
            Arc::new(DisabledMessagingSender)
        }
    };

    // ── Dispatcher and pipeline ──────────────────────────────────────
    let queue = MessageQueue::spawn_with(
        messaging,
        config.dispatch_max_retries,
        config.dispatch_pacing,
    );
    let processor = Arc::new(BatchProcessor::new(
        Arc::clone(&store),
        Arc::clone(&email),
        Arc::clone(&queue),
    ));

    // ── Tool registry ────────────────────────────────────────────────
    let registry = Arc::new(ToolRegistry::new());
    builtin::register_all(&registry, Arc::clone(&store), email, Arc::clone(&queue));

    // ── HTTP server ──────────────────────────────────────────────────
    let state = AppState {
        store,
        processor,
        queue: Arc::clone(&queue),
        registry,
    };
    let app = api::routes(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port)).await?;
    tracing::info!(port = config.http_port, "remedia listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Flush queued notifications before exit.
    queue.shutdown().await;
    Ok(())
}
