//! Built-in workflow tools.

pub mod email_history;
pub mod outbound;
pub mod states;
pub mod transactions;
pub mod wp_history;

use std::sync::Arc;

use crate::channels::EmailSender;
use crate::dispatch::MessageQueue;
use crate::store::{SheetService, Worksheet};
use crate::tools::ToolRegistry;

/// Render a row as a JSON object keyed by the sheet's column names.
pub(crate) fn row_object(sheet: &Worksheet, row: &crate::store::Row) -> serde_json::Value {
    let entries = sheet
        .schema()
        .columns()
        .iter()
        .zip(&row.cells)
        .map(|(col, cell)| (col.name.to_string(), serde_json::json!(cell.to_string())));
    serde_json::Value::Object(entries.collect())
}

/// Register every built-in tool on `registry`.
pub fn register_all(
    registry: &ToolRegistry,
    store: Arc<SheetService>,
    email: Arc<dyn EmailSender>,
    queue: Arc<MessageQueue>,
) {
    transactions::register(registry, Arc::clone(&store));
    email_history::register(registry, Arc::clone(&store));
    wp_history::register(registry, Arc::clone(&store));
    states::register(registry, Arc::clone(&store));
    outbound::register(registry, store, email, queue);
}
