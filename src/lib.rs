//! remedia — remediation workflow service for flagged financial transactions.
//!
//! Uploaded transaction batches are deduplicated against a durable tabular
//! Record Store, classified into remediation protocols, and notified over
//! email or a messaging provider. Counterparty replies are correlated back
//! to their transaction through opaque tokens and appended to per-channel
//! history ledgers. A tool registry exposes the whole workflow to a
//! conversational assistant.

pub mod api;
pub mod channels;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod store;
pub mod tools;

pub use error::{Error, Result};
