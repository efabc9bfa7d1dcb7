//! Email history ledger tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::store::schema::columns;
use crate::store::{CellValue, SheetService};
use crate::tools::builtin::row_object;
use crate::tools::tool::{require_str, Tool, ToolError, ToolOutput};
use crate::tools::ToolRegistry;

pub fn register(registry: &ToolRegistry, store: Arc<SheetService>) {
    registry.register_sync(Arc::new(ListEmailHistoryTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(FindEmailMessagesTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(AddEmailMessageTool::new(store)));
}

pub struct ListEmailHistoryTool {
    store: Arc<SheetService>,
}

impl ListEmailHistoryTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListEmailHistoryTool {
    fn name(&self) -> &str {
        "list_email_history"
    }

    fn description(&self) -> &str {
        "List every entry in the email conversation ledger."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let sheet = self.store.email_history.read().await;
        let rows: Vec<serde_json::Value> = sheet
            .read_all()
            .iter()
            .map(|row| row_object(&sheet, row))
            .collect();
        if rows.is_empty() {
            return Ok(ToolOutput::text(
                "The email history ledger is empty.",
                start.elapsed(),
            ));
        }
        ToolOutput::json(&rows, start.elapsed())
    }
}

pub struct FindEmailMessagesTool {
    store: Arc<SheetService>,
}

impl FindEmailMessagesTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindEmailMessagesTool {
    fn name(&self) -> &str {
        "find_email_messages"
    }

    fn description(&self) -> &str {
        "List the email messages recorded for one correlation id (EMAIL ID)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email_id": {
                    "type": "string",
                    "description": "Correlation id of the email thread"
                }
            },
            "required": ["email_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let email_id = require_str(&params, "email_id")?;

        let sheet = self.store.email_history.read().await;
        let rows = sheet
            .find(columns::EMAIL_ID, &CellValue::text(email_id))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        if rows.is_empty() {
            return Ok(ToolOutput::text(
                format!("No email messages recorded for correlation id {email_id}."),
                start.elapsed(),
            ));
        }
        let objects: Vec<serde_json::Value> =
            rows.iter().map(|row| row_object(&sheet, row)).collect();
        ToolOutput::json(&objects, start.elapsed())
    }
}

pub struct AddEmailMessageTool {
    store: Arc<SheetService>,
}

impl AddEmailMessageTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddEmailMessageTool {
    fn name(&self) -> &str {
        "add_email_message"
    }

    fn description(&self) -> &str {
        "Record an email message against a transaction. The correlation id must match \
         the EMAIL ID of an existing transaction."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email_id": {
                    "type": "string",
                    "description": "Correlation id of the email thread"
                },
                "message": {
                    "type": "string",
                    "description": "Message text to record"
                }
            },
            "required": ["email_id", "message"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let email_id = require_str(&params, "email_id")?;
        let message = require_str(&params, "message")?;

        if self.store.add_email_message(email_id, message).await {
            Ok(ToolOutput::text(
                format!("Message recorded for correlation id {email_id}."),
                start.elapsed(),
            ))
        } else {
            Ok(ToolOutput::text(
                format!(
                    "No transaction carries correlation id {email_id}; the message was not recorded."
                ),
                start.elapsed(),
            ))
        }
    }
}
