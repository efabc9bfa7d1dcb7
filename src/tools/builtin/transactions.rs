//! Transaction record tools.
//!
//! Conversational access to the `Transacciones` sheet. A missing record is
//! a successful answer ("No transaction found..."), not an error; the
//! assistant relays it verbatim.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use std::str::FromStr;

use crate::state::RemediationState;
use crate::store::schema::columns;
use crate::store::{CellValue, SheetService};
use crate::tools::builtin::row_object;
use crate::tools::tool::{optional_str, require_str, Tool, ToolError, ToolOutput};
use crate::tools::ToolRegistry;

pub fn register(registry: &ToolRegistry, store: Arc<SheetService>) {
    registry.register_sync(Arc::new(ListTransactionsTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(FindTransactionTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(AddTransactionTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(UpdateTransactionTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(UpdateStateTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(SaveStoreTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(ReloadStoreTool::new(store)));
}

fn movement_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "movement_number": {
                "type": "string",
                "description": "Movement number (N° Movimiento) of the transaction"
            }
        },
        "required": ["movement_number"]
    })
}

// ── list_transactions ───────────────────────────────────────────────

pub struct ListTransactionsTool {
    store: Arc<SheetService>,
}

impl ListTransactionsTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListTransactionsTool {
    fn name(&self) -> &str {
        "list_transactions"
    }

    fn description(&self) -> &str {
        "List every transaction in the record store with its current remediation state."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let sheet = self.store.transactions.read().await;
        let rows: Vec<serde_json::Value> = sheet
            .read_all()
            .iter()
            .map(|row| row_object(&sheet, row))
            .collect();
        if rows.is_empty() {
            return Ok(ToolOutput::text(
                "The record store has no transactions.",
                start.elapsed(),
            ));
        }
        ToolOutput::json(&rows, start.elapsed())
    }
}

// ── find_transaction ────────────────────────────────────────────────

pub struct FindTransactionTool {
    store: Arc<SheetService>,
}

impl FindTransactionTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindTransactionTool {
    fn name(&self) -> &str {
        "find_transaction"
    }

    fn description(&self) -> &str {
        "Look up a transaction by its movement number."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        movement_schema()
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let movement = require_str(&params, "movement_number")?;

        match self.store.find_transaction(movement).await {
            Some(row) => {
                let sheet = self.store.transactions.read().await;
                ToolOutput::json(&row_object(&sheet, &row), start.elapsed())
            }
            None => Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            )),
        }
    }
}

// ── add_transaction ─────────────────────────────────────────────────

pub struct AddTransactionTool {
    store: Arc<SheetService>,
}

impl AddTransactionTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTransactionTool {
    fn name(&self) -> &str {
        "add_transaction"
    }

    fn description(&self) -> &str {
        "Add a transaction record manually. New records start in the 'No Procesado' state \
         unless a state is given. Changes are in-memory until save_record_store is called."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "movement_number": {"type": "string", "description": "Movement number (unique key)"},
                "fecha": {"type": "string", "description": "Transaction date, dd/mm/yyyy hh:mm:ss"},
                "concepto": {"type": "string", "description": "Transaction concept"},
                "referencia": {"type": "string", "description": "Bank reference"},
                "monto": {"type": "string", "description": "Amount, e.g. '1.234,56'"},
                "query": {"type": "string", "description": "Protocol classifier (2 = email, 3 = messaging)"},
                "correo": {"type": "string", "description": "Counterparty email"},
                "telefono": {"type": "string", "description": "Counterparty phone"},
                "remitente": {"type": "string", "description": "Sender name"},
                "state": {"type": "string", "description": "Initial remediation state (default 'No Procesado')"}
            },
            "required": ["movement_number"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let movement = require_str(&params, "movement_number")?;

        if self.store.find_transaction(movement).await.is_some() {
            return Ok(ToolOutput::text(
                format!("A transaction with movement number {movement} already exists."),
                start.elapsed(),
            ));
        }

        let state = match optional_str(&params, "state") {
            Some(raw) => RemediationState::from_str(raw)
                .map_err(|e| ToolError::InvalidParameters(e.to_string()))?,
            None => RemediationState::NoProcesado,
        };

        let mut values: Vec<(&str, CellValue)> = vec![
            (columns::MOVIMIENTO, CellValue::text(movement)),
            (columns::ESTADO, CellValue::text(state.label())),
        ];
        for (key, column) in [
            ("fecha", columns::FECHA),
            ("concepto", columns::CONCEPTO),
            ("referencia", columns::REFERENCIA),
            ("monto", columns::MONTO),
            ("query", columns::QUERY),
            ("correo", columns::CORREO),
            ("telefono", columns::TELEFONO),
            ("remitente", columns::REMITENTE),
        ] {
            if let Some(value) = optional_str(&params, key) {
                values.push((column, CellValue::text(value)));
            }
        }

        let mut sheet = self.store.transactions.write().await;
        sheet
            .add_values(&values)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(ToolOutput::text(
            format!(
                "Transaction {movement} added in state '{}'. Call save_record_store to persist.",
                state.label()
            ),
            start.elapsed(),
        ))
    }
}

// ── update_transaction ──────────────────────────────────────────────

pub struct UpdateTransactionTool {
    store: Arc<SheetService>,
}

impl UpdateTransactionTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateTransactionTool {
    fn name(&self) -> &str {
        "update_transaction"
    }

    fn description(&self) -> &str {
        "Update columns of a transaction by movement number. 'updates' maps sheet column \
         names (e.g. 'CORREO', 'Referencia') to new values."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "movement_number": {"type": "string", "description": "Movement number of the transaction"},
                "updates": {
                    "type": "object",
                    "description": "Column name to new value",
                    "additionalProperties": {"type": "string"}
                }
            },
            "required": ["movement_number", "updates"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let movement = require_str(&params, "movement_number")?;
        let updates = params
            .get("updates")
            .and_then(|v| v.as_object())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidParameters("'updates' must be a non-empty object".to_string())
            })?;

        let patch: Vec<(&str, CellValue)> = updates
            .iter()
            .map(|(column, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (column.as_str(), CellValue::text(text))
            })
            .collect();

        let mut sheet = self.store.transactions.write().await;
        let matched = sheet
            .update(columns::MOVIMIENTO, &CellValue::text(movement), &patch)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        if matched == 0 {
            return Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            ));
        }
        Ok(ToolOutput::text(
            format!("Transaction {movement} updated. Call save_record_store to persist."),
            start.elapsed(),
        ))
    }
}

// ── update_transaction_state ────────────────────────────────────────

pub struct UpdateStateTool {
    store: Arc<SheetService>,
}

impl UpdateStateTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateStateTool {
    fn name(&self) -> &str {
        "update_transaction_state"
    }

    fn description(&self) -> &str {
        "Move a transaction to a new remediation state. Any state may move to any other; \
         the state machine does not advance on its own."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "movement_number": {"type": "string", "description": "Movement number of the transaction"},
                "state": {
                    "type": "string",
                    "enum": RemediationState::ALL.iter().map(|s| s.label()).collect::<Vec<_>>(),
                    "description": "Target remediation state"
                }
            },
            "required": ["movement_number", "state"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let movement = require_str(&params, "movement_number")?;
        let state = RemediationState::from_str(require_str(&params, "state")?)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        if self.store.update_state(movement, state).await {
            Ok(ToolOutput::text(
                format!("Transaction {movement} moved to state '{}'.", state.label()),
                start.elapsed(),
            ))
        } else {
            Ok(ToolOutput::text(
                format!("No transaction found with movement number {movement}."),
                start.elapsed(),
            ))
        }
    }
}

// ── save_record_store / reload_record_store ─────────────────────────

pub struct SaveStoreTool {
    store: Arc<SheetService>,
}

impl SaveStoreTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveStoreTool {
    fn name(&self) -> &str {
        "save_record_store"
    }

    fn description(&self) -> &str {
        "Persist every worksheet to durable storage."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        if self.store.save_all().await {
            Ok(ToolOutput::text("Record store saved.", start.elapsed()))
        } else {
            Err(ToolError::ExecutionFailed(
                "one or more worksheets failed to save".to_string(),
            ))
        }
    }
}

pub struct ReloadStoreTool {
    store: Arc<SheetService>,
}

impl ReloadStoreTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReloadStoreTool {
    fn name(&self) -> &str {
        "reload_record_store"
    }

    fn description(&self) -> &str {
        "Reload every worksheet from durable storage, discarding unsaved changes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        if self.store.reload_all().await {
            Ok(ToolOutput::text("Record store reloaded.", start.elapsed()))
        } else {
            Err(ToolError::ExecutionFailed(
                "one or more worksheets failed to reload".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::LibSqlBackend;

    async fn store_with_tx(movement: &str) -> Arc<SheetService> {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = SheetService::open(backend).await.unwrap();
        {
            let mut sheet = store.transactions.write().await;
            sheet
                .add_values(&[
                    (columns::MOVIMIENTO, CellValue::text(movement)),
                    (columns::ESTADO, CellValue::text("En Proceso")),
                ])
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn find_reports_absence_in_prose() {
        let store = store_with_tx("1001").await;
        let tool = FindTransactionTool::new(store);

        let out = tool
            .execute(serde_json::json!({"movement_number": "9999"}))
            .await
            .unwrap();
        assert!(out.content.contains("No transaction found"));
        assert!(out.content.contains("9999"));
    }

    #[tokio::test]
    async fn find_returns_row_as_json() {
        let store = store_with_tx("1001").await;
        let tool = FindTransactionTool::new(store);

        let out = tool
            .execute(serde_json::json!({"movement_number": "1001"}))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(value[columns::MOVIMIENTO], "1001");
        assert_eq!(value[columns::ESTADO], "En Proceso");
    }

    #[tokio::test]
    async fn add_rejects_duplicate_movement() {
        let store = store_with_tx("1001").await;
        let tool = AddTransactionTool::new(store);

        let out = tool
            .execute(serde_json::json!({"movement_number": "1001"}))
            .await
            .unwrap();
        assert!(out.content.contains("already exists"));
    }

    #[tokio::test]
    async fn update_state_accepts_any_label() {
        let store = store_with_tx("1001").await;
        let tool = UpdateStateTool::new(Arc::clone(&store));

        let out = tool
            .execute(serde_json::json!({
                "movement_number": "1001",
                "state": "Completado"
            }))
            .await
            .unwrap();
        assert!(out.content.contains("Completado"));

        let row = store.find_transaction("1001").await.unwrap();
        let sheet = store.transactions.read().await;
        assert_eq!(
            sheet.cell(&row, columns::ESTADO).unwrap().to_string(),
            "Completado"
        );
    }

    #[tokio::test]
    async fn update_state_rejects_unknown_label() {
        let store = store_with_tx("1001").await;
        let tool = UpdateStateTool::new(store);

        let err = tool
            .execute(serde_json::json!({
                "movement_number": "1001",
                "state": "Terminado"
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn update_rejects_unknown_column() {
        let store = store_with_tx("1001").await;
        let tool = UpdateTransactionTool::new(store);

        let err = tool
            .execute(serde_json::json!({
                "movement_number": "1001",
                "updates": {"NoSuchColumn": "x"}
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
