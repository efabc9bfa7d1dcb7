//! Messaging history ledger tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::store::schema::columns;
use crate::store::{CellValue, SheetService};
use crate::tools::builtin::row_object;
use crate::tools::tool::{require_str, Tool, ToolError, ToolOutput};
use crate::tools::ToolRegistry;

pub fn register(registry: &ToolRegistry, store: Arc<SheetService>) {
    registry.register_sync(Arc::new(ListWpHistoryTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(FindWpMessagesTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(AddWpMessageTool::new(store)));
}

pub struct ListWpHistoryTool {
    store: Arc<SheetService>,
}

impl ListWpHistoryTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListWpHistoryTool {
    fn name(&self) -> &str {
        "list_wp_history"
    }

    fn description(&self) -> &str {
        "List every entry in the messaging conversation ledger."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let sheet = self.store.wp_history.read().await;
        let rows: Vec<serde_json::Value> = sheet
            .read_all()
            .iter()
            .map(|row| row_object(&sheet, row))
            .collect();
        if rows.is_empty() {
            return Ok(ToolOutput::text(
                "The messaging history ledger is empty.",
                start.elapsed(),
            ));
        }
        ToolOutput::json(&rows, start.elapsed())
    }
}

pub struct FindWpMessagesTool {
    store: Arc<SheetService>,
}

impl FindWpMessagesTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindWpMessagesTool {
    fn name(&self) -> &str {
        "find_wp_messages"
    }

    fn description(&self) -> &str {
        "List the messaging entries recorded for one correlation id (WP ID)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "wp_id": {
                    "type": "string",
                    "description": "Correlation id of the messaging thread"
                }
            },
            "required": ["wp_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let wp_id = require_str(&params, "wp_id")?;

        let sheet = self.store.wp_history.read().await;
        let rows = sheet
            .find(columns::WP_ID, &CellValue::text(wp_id))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        if rows.is_empty() {
            return Ok(ToolOutput::text(
                format!("No messaging entries recorded for correlation id {wp_id}."),
                start.elapsed(),
            ));
        }
        let objects: Vec<serde_json::Value> =
            rows.iter().map(|row| row_object(&sheet, row)).collect();
        ToolOutput::json(&objects, start.elapsed())
    }
}

pub struct AddWpMessageTool {
    store: Arc<SheetService>,
}

impl AddWpMessageTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddWpMessageTool {
    fn name(&self) -> &str {
        "add_wp_message"
    }

    fn description(&self) -> &str {
        "Record a messaging-channel message against a transaction. The correlation id \
         must match the WP ID of an existing transaction."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "wp_id": {
                    "type": "string",
                    "description": "Correlation id of the messaging thread"
                },
                "message": {
                    "type": "string",
                    "description": "Message text to record"
                }
            },
            "required": ["wp_id", "message"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let wp_id = require_str(&params, "wp_id")?;
        let message = require_str(&params, "message")?;

        if self.store.add_whatsapp_message(wp_id, message).await {
            Ok(ToolOutput::text(
                format!("Message recorded for correlation id {wp_id}."),
                start.elapsed(),
            ))
        } else {
            Ok(ToolOutput::text(
                format!(
                    "No transaction carries correlation id {wp_id}; the message was not recorded."
                ),
                start.elapsed(),
            ))
        }
    }
}
