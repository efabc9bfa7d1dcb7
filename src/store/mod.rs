//! Record Store — typed in-memory worksheets over a durable tabular backend.

pub mod backend;
pub mod schema;
pub mod service;
pub mod worksheet;

pub use backend::{LibSqlBackend, TabularBackend};
pub use schema::{CellValue, Row, SheetSchema};
pub use service::SheetService;
pub use worksheet::Worksheet;
