//! Notification dispatch — serialized outbound delivery with bounded retry.

pub mod queue;

pub use queue::{DispatchJob, MessageQueue, QueueStats, CALL_DELAY, MAX_RETRIES};
