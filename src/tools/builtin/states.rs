//! State catalog tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::store::schema::columns;
use crate::store::{CellValue, SheetService};
use crate::tools::builtin::row_object;
use crate::tools::tool::{require_str, Tool, ToolError, ToolOutput};
use crate::tools::ToolRegistry;

pub fn register(registry: &ToolRegistry, store: Arc<SheetService>) {
    registry.register_sync(Arc::new(ListStatesTool::new(Arc::clone(&store))));
    registry.register_sync(Arc::new(FindStateTool::new(store)));
}

pub struct ListStatesTool {
    store: Arc<SheetService>,
}

impl ListStatesTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListStatesTool {
    fn name(&self) -> &str {
        "list_states"
    }

    fn description(&self) -> &str {
        "List the remediation state catalog with the description of each state."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let sheet = self.store.states.read().await;
        let rows: Vec<serde_json::Value> = sheet
            .read_all()
            .iter()
            .map(|row| row_object(&sheet, row))
            .collect();
        ToolOutput::json(&rows, start.elapsed())
    }
}

pub struct FindStateTool {
    store: Arc<SheetService>,
}

impl FindStateTool {
    pub fn new(store: Arc<SheetService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for FindStateTool {
    fn name(&self) -> &str {
        "find_state"
    }

    fn description(&self) -> &str {
        "Look up a remediation state in the catalog by its name."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "State name as it appears in the catalog, e.g. 'En Proceso'"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let name = require_str(&params, "name")?;

        let sheet = self.store.states.read().await;
        let rows = sheet
            .find(columns::ESTADO_NOMBRE, &CellValue::text(name))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        match rows.first() {
            Some(row) => ToolOutput::json(&row_object(&sheet, row), start.elapsed()),
            None => Ok(ToolOutput::text(
                format!("No state named '{name}' exists in the catalog."),
                start.elapsed(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RemediationState;
    use crate::store::backend::LibSqlBackend;

    async fn service() -> Arc<SheetService> {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        SheetService::open(backend).await.unwrap()
    }

    #[tokio::test]
    async fn lists_every_catalog_state() {
        let tool = ListStatesTool::new(service().await);

        let out = tool.execute(serde_json::json!({})).await.unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&out.content).unwrap();
        assert_eq!(rows.len(), RemediationState::ALL.len());
    }

    #[tokio::test]
    async fn finds_state_by_name() {
        let tool = FindStateTool::new(service().await);

        let out = tool
            .execute(serde_json::json!({"name": "En Proceso"}))
            .await
            .unwrap();
        let row: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(row[columns::ESTADO_NOMBRE], "En Proceso");
        assert_eq!(
            row[columns::DESCRIPCION],
            RemediationState::EnProceso.description()
        );
    }

    #[tokio::test]
    async fn find_miss_is_prose() {
        let tool = FindStateTool::new(service().await);

        let out = tool
            .execute(serde_json::json!({"name": "Archivado"}))
            .await
            .unwrap();
        assert!(out.content.contains("No state named 'Archivado'"));
    }
}
