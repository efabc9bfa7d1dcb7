//! Outbound follow-up tools.
//!
//! Follow-ups ride the same correlation ids as the automated notices: a
//! transaction without an id for the channel gets one minted and stored
//! before the message leaves, so the reply path always resolves.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::channels::EmailSender;
use crate::correlation;
use crate::dispatch::MessageQueue;
use crate::store::schema::columns;
use crate::store::{CellValue, SheetService};
use crate::tools::tool::{optional_str, require_str, Tool, ToolError, ToolOutput};
use crate::tools::ToolRegistry;

const DEFAULT_SUBJECT: &str = "Seguimiento de verificación de transacción";

pub fn register(
    registry: &ToolRegistry,
    store: Arc<SheetService>,
    email: Arc<dyn EmailSender>,
    queue: Arc<MessageQueue>,
) {
    registry.register_sync(Arc::new(SendEmailTool::new(Arc::clone(&store), email)));
    registry.register_sync(Arc::new(QueueMessageTool::new(store, queue)));
}

/// Return the transaction's correlation id for `id_column`, minting and
/// storing a fresh one when the column is empty.
async fn ensure_correlation_id(
    store: &SheetService,
    movement: &str,
    id_column: &str,
) -> Result<Option<String>, ToolError> {
    let Some(row) = store.find_transaction(movement).await else {
        return Ok(None);
    };

    let existing = {
        let sheet = store.transactions.read().await;
        sheet
            .cell(&row, id_column)
            .map(|c| c.to_string())
            .unwrap_or_default()
    };
    if !existing.is_empty() {
        return Ok(Some(existing));
    }

    let token = correlation::generate();
    let mut sheet = store.transactions.write().await;
    sheet
        .update(
            columns::MOVIMIENTO,
            &CellValue::text(movement),
            &[(id_column, CellValue::text(token.as_str()))],
        )
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
    Ok(Some(token))
}

fn contact_of(store_row: Option<String>) -> Option<String> {
    store_row.filter(|c| !c.is_empty())
}

// ── send_email ──────────────────────────────────────────────────────

pub struct SendEmailTool {
    store: Arc<SheetService>,
    email: Arc<dyn EmailSender>,
}

impl SendEmailTool {
    pub fn new(store: Arc<SheetService>, email: Arc<dyn EmailSender>) -> Self {
        Self { store, email }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send a follow-up email to the counterparty of a transaction and record it in \
         the email history ledger. The transaction must carry a contact email."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "movement_number": {"type": "string", "description": "Movement number of the transaction"},
                "subject": {"type": "string", "description": "Email subject (optional)"},
                "body": {"type": "string", "description": "Message body"}
            },
            "required": ["movement_number", "body"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let movement = require_str(&params, "movement_number")?;
        let body = require_str(&params, "body")?;
        let subject = optional_str(&params, "subject").unwrap_or(DEFAULT_SUBJECT);

        let Some(row) = self.store.find_transaction(movement).await else {
            return Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            ));
        };
        let address = {
            let sheet = self.store.transactions.read().await;
            contact_of(sheet.cell(&row, columns::CORREO).map(|c| c.to_string()))
        };
        let Some(address) = address else {
            return Ok(ToolOutput::text(
                format!("Transaction {movement} has no contact email."),
                start.elapsed(),
            ));
        };

        let Some(token) = ensure_correlation_id(&self.store, movement, columns::EMAIL_ID).await?
        else {
            return Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            ));
        };

        // The correlation token rides the body so the reply resolves.
        let full_body = format!("{body}\n\nCódigo de caso: {token}");
        self.email
            .send(&address, subject, &full_body)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        if !self.store.add_email_message(&token, &full_body).await {
            warn!(movement, "Sent email could not be recorded in the ledger");
        }
        if !self.store.save_all().await {
            warn!(movement, "Record store persistence failed after email send");
        }

        Ok(ToolOutput::text(
            format!("Email sent to {address} for transaction {movement} (case {token})."),
            start.elapsed(),
        ))
    }
}

// ── queue_message ───────────────────────────────────────────────────

pub struct QueueMessageTool {
    store: Arc<SheetService>,
    queue: Arc<MessageQueue>,
}

impl QueueMessageTool {
    pub fn new(store: Arc<SheetService>, queue: Arc<MessageQueue>) -> Self {
        Self { store, queue }
    }
}

#[async_trait]
impl Tool for QueueMessageTool {
    fn name(&self) -> &str {
        "queue_message"
    }

    fn description(&self) -> &str {
        "Queue a follow-up message to the counterparty of a transaction over the \
         messaging channel and record it in the messaging history ledger. Delivery is \
         asynchronous with bounded retry."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "movement_number": {"type": "string", "description": "Movement number of the transaction"},
                "body": {"type": "string", "description": "Message text"}
            },
            "required": ["movement_number", "body"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let movement = require_str(&params, "movement_number")?;
        let body = require_str(&params, "body")?;

        let Some(row) = self.store.find_transaction(movement).await else {
            return Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            ));
        };
        let phone = {
            let sheet = self.store.transactions.read().await;
            contact_of(sheet.cell(&row, columns::TELEFONO).map(|c| c.to_string()))
        };
        let Some(phone) = phone else {
            return Ok(ToolOutput::text(
                format!("Transaction {movement} has no contact phone."),
                start.elapsed(),
            ));
        };

        let Some(token) = ensure_correlation_id(&self.store, movement, columns::WP_ID).await?
        else {
            return Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            ));
        };

        let full_body = format!("{body}\n\nCódigo de caso: {token}");
        self.queue
            .enqueue(&phone, &full_body, &token)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        if !self.store.add_whatsapp_message(&token, &full_body).await {
            warn!(movement, "Queued message could not be recorded in the ledger");
        }
        if !self.store.save_all().await {
            warn!(movement, "Record store persistence failed after enqueue");
        }

        Ok(ToolOutput::text(
            format!("Message queued for {phone} on transaction {movement} (case {token})."),
            start.elapsed(),
        ))
    }
}
