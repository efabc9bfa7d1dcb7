//! Batch processor — reconciliation and dispatch for uploaded batches.
//!
//! Flow per upload:
//! 1. Reload the Record Store so the diff runs against the latest durable
//!    state.
//! 2. Drop rows whose movement number already exists (idempotent
//!    re-ingestion) and rows without a movement number.
//! 3. Partition the remainder by the `QUERY` classifier into protocol A
//!    (email), protocol B (messaging) and unclassified.
//! 4. Attempt outbound notification per protocol. A failed email send or a
//!    failed enqueue drops that row from the batch — skip, don't poison.
//! 5. Commit every surviving row, persist, and report counts.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::EmailSender;
use crate::correlation;
use crate::dispatch::MessageQueue;
use crate::error::PipelineError;
use crate::pipeline::types::{BatchOutcome, BatchSummary, Protocol, UploadRow};
use crate::store::schema::{columns, Row};
use crate::store::SheetService;

/// Subject line of the protocol-A notice.
const EMAIL_SUBJECT: &str = "Verificación de transacción pendiente";

/// Classification & dedup engine driving outbound dispatch.
pub struct BatchProcessor {
    store: Arc<SheetService>,
    email: Arc<dyn EmailSender>,
    queue: Arc<MessageQueue>,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<SheetService>,
        email: Arc<dyn EmailSender>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        Self {
            store,
            email,
            queue,
        }
    }

    /// Process one uploaded batch. `source_file` is recorded in the
    /// `ARCHIVO` column of every committed row.
    pub async fn process_batch(
        &self,
        rows: Vec<UploadRow>,
        source_file: Option<&str>,
    ) -> Result<BatchOutcome, PipelineError> {
        info!(rows = rows.len(), "Processing batch upload");

        // Diff against the latest durable state. A failed reload leaves the
        // diff running against the in-memory snapshot; dedup still applies.
        if !self.store.reload_all().await {
            warn!("Record store reload failed; deduplicating against in-memory state");
        }

        let existing = self.existing_movements().await;
        let mut summary = BatchSummary::default();
        let mut seen = HashSet::new();
        let mut fresh: Vec<UploadRow> = Vec::new();

        for row in rows {
            let movement = row.movimiento.trim().to_string();
            if movement.is_empty() {
                summary.malformed_dropped += 1;
                continue;
            }
            if existing.contains(&movement) || !seen.insert(movement) {
                summary.duplicates_dropped += 1;
                continue;
            }
            fresh.push(row);
        }

        if fresh.is_empty() {
            info!(
                duplicates = summary.duplicates_dropped,
                malformed = summary.malformed_dropped,
                "No new transactions to process"
            );
            return Ok(BatchOutcome::NoNewTransactions);
        }
        summary.total_new = fresh.len();

        let mut records: Vec<Row> = Vec::with_capacity(fresh.len());
        for row in fresh {
            match row.protocol() {
                Protocol::A => self.handle_protocol_a(row, source_file, &mut summary, &mut records).await,
                Protocol::B => self.handle_protocol_b(row, source_file, &mut summary, &mut records),
                Protocol::Unclassified => {
                    summary.unclassified_count += 1;
                    records.push(row.into_record(
                        Protocol::Unclassified.initial_state(),
                        None,
                        None,
                        source_file,
                    ));
                }
            }
        }

        self.commit(records, &mut summary).await?;

        info!(
            total_new = summary.total_new,
            protocol_a = summary.protocol_a_count,
            protocol_b = summary.protocol_b_count,
            unclassified = summary.unclassified_count,
            dropped_a = summary.protocol_a_dropped,
            dropped_b = summary.protocol_b_dropped,
            persisted = summary.persisted,
            "Batch processing completed"
        );
        Ok(BatchOutcome::Completed { summary })
    }

    /// Protocol A: templated email notice, synchronous send. A transport
    /// failure drops the row from this cycle entirely.
    async fn handle_protocol_a(
        &self,
        row: UploadRow,
        source_file: Option<&str>,
        summary: &mut BatchSummary,
        records: &mut Vec<Row>,
    ) {
        let Some(address) = row.email().map(str::to_string) else {
            // No contact email: committed without an outbound notice.
            summary.protocol_a_count += 1;
            records.push(row.into_record(Protocol::A.initial_state(), None, None, source_file));
            return;
        };

        let token = correlation::generate();
        let body = compose_notice(&row, &token);
        match self.email.send(&address, EMAIL_SUBJECT, &body).await {
            Ok(message_id) => {
                info!(
                    correlation_id = %token,
                    message_id = %message_id,
                    "Protocol-A notice sent"
                );
                summary.protocol_a_count += 1;
                records.push(row.into_record(
                    Protocol::A.initial_state(),
                    Some(token),
                    None,
                    source_file,
                ));
            }
            Err(e) => {
                warn!(
                    movement = %row.movimiento,
                    error = %e,
                    "Email send failed; dropping row from batch"
                );
                summary.protocol_a_dropped += 1;
            }
        }
    }

    /// Protocol B: templated notice enqueued for asynchronous dispatch.
    /// Success means "accepted into the queue", not "delivered"; an enqueue
    /// failure drops the row (delivery failures are the dispatcher's
    /// retry problem, not ours).
    fn handle_protocol_b(
        &self,
        row: UploadRow,
        source_file: Option<&str>,
        summary: &mut BatchSummary,
        records: &mut Vec<Row>,
    ) {
        let Some(phone) = row.phone() else {
            summary.protocol_b_count += 1;
            records.push(row.into_record(Protocol::B.initial_state(), None, None, source_file));
            return;
        };

        let token = correlation::generate();
        let body = compose_notice(&row, &token);
        match self.queue.enqueue(&phone, &body, &token) {
            Ok(()) => {
                summary.protocol_b_count += 1;
                records.push(row.into_record(
                    Protocol::B.initial_state(),
                    None,
                    Some(token),
                    source_file,
                ));
            }
            Err(e) => {
                warn!(
                    movement = %row.movimiento,
                    error = %e,
                    "Dispatch enqueue failed; dropping row from batch"
                );
                summary.protocol_b_dropped += 1;
            }
        }
    }

    async fn commit(
        &self,
        records: Vec<Row>,
        summary: &mut BatchSummary,
    ) -> Result<(), PipelineError> {
        {
            let mut transactions = self.store.transactions.write().await;
            for record in records {
                transactions.add(record)?;
            }
        }
        summary.persisted = self.store.save_all().await;
        if !summary.persisted {
            warn!("Batch committed in memory but persistence failed");
        }
        Ok(())
    }

    async fn existing_movements(&self) -> HashSet<String> {
        let transactions = self.store.transactions.read().await;
        transactions
            .read_all()
            .iter()
            .filter_map(|row| {
                transactions
                    .cell(row, columns::MOVIMIENTO)
                    .map(|c| c.to_string())
            })
            .filter(|m| !m.is_empty())
            .collect()
    }
}

/// Templated counterparty notice. Carries the correlation token as the
/// case number; the movement number itself is never exposed.
fn compose_notice(row: &UploadRow, token: &str) -> String {
    let mut detail = String::new();
    if !row.fecha.is_empty() {
        detail.push_str(&format!(" del {}", row.fecha));
    }
    if let Some(amount) = row.monto {
        detail.push_str(&format!(" por valor de {amount}"));
    }
    if !row.referencia.is_empty() {
        detail.push_str(&format!(" (ref. {})", row.referencia));
    }

    format!(
        "Estimado cliente:\n\n\
         Le escribimos respecto a una transacción{detail} que requiere \
         verificación. Para continuar con el proceso, responda a este \
         mensaje citando el código de caso {token}.\n\n\
         Gracias por su colaboración."
    )
}
