//! Batch ingestion pipeline — dedup, classification and dispatch.

pub mod processor;
pub mod types;

pub use processor::BatchProcessor;
pub use types::{BatchOutcome, BatchSummary, Protocol, UploadRow};
