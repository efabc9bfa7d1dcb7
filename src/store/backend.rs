//! Durable tabular backend.
//!
//! The Record Store mirrors a remote spreadsheet; this module is the
//! long-lived side of that mirror. `save` replaces the whole sheet, matching
//! the overwrite semantics of the spreadsheet provider, and `load` returns
//! the full sheet. There is no row-level write path on purpose.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::info;

use crate::error::StoreError;
use crate::store::schema::Row;

/// Generic whole-sheet load/save contract consumed by worksheets.
#[async_trait]
pub trait TabularBackend: Send + Sync {
    /// Load every row of `sheet`, in stored order. An unknown sheet is an
    /// empty sheet, not an error.
    async fn load(&self, sheet: &str) -> Result<Vec<Row>, StoreError>;

    /// Replace the full contents of `sheet` with `rows`.
    async fn save(&self, sheet: &str, rows: &[Row]) -> Result<(), StoreError>;
}

/// libSQL-backed tabular store.
///
/// Rows are kept as serialized cell vectors keyed by sheet name and
/// position; typing is enforced above this layer by the sheet schemas.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Backend database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to create in-memory db: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS sheet_rows (
                    sheet    TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    data     TEXT NOT NULL,
                    PRIMARY KEY (sheet, position)
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to create sheet_rows: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TabularBackend for LibSqlBackend {
    async fn load(&self, sheet: &str) -> Result<Vec<Row>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT data FROM sheet_rows WHERE sheet = ?1 ORDER BY position",
                params![sheet],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to load sheet {sheet}: {e}")))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let data: String = row
                .get::<String>(0)
                .map_err(|e| StoreError::Query(format!("Bad row in sheet {sheet}: {e}")))?;
            let parsed: Row = serde_json::from_str(&data)
                .map_err(|e| StoreError::Serialization(format!("Sheet {sheet}: {e}")))?;
            out.push(parsed);
        }
        Ok(out)
    }

    async fn save(&self, sheet: &str, rows: &[Row]) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM sheet_rows WHERE sheet = ?1", params![sheet])
            .await
            .map_err(|e| StoreError::Query(format!("Failed to clear sheet {sheet}: {e}")))?;

        for (position, row) in rows.iter().enumerate() {
            let data = serde_json::to_string(row)
                .map_err(|e| StoreError::Serialization(format!("Sheet {sheet}: {e}")))?;
            self.conn
                .execute(
                    "INSERT INTO sheet_rows (sheet, position, data) VALUES (?1, ?2, ?3)",
                    params![sheet, position as i64, data],
                )
                .await
                .map_err(|e| StoreError::Query(format!("Failed to save sheet {sheet}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::CellValue;

    fn row(values: &[&str]) -> Row {
        Row::new(values.iter().map(|v| CellValue::text(*v)).collect())
    }

    #[tokio::test]
    async fn unknown_sheet_loads_empty() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let rows = backend.load("Transacciones").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_rows_and_order() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let rows = vec![row(&["a", "1"]), row(&["b", "2"]), row(&["c", "3"])];
        backend.save("Estados", &rows).await.unwrap();

        let loaded = backend.load("Estados").await.unwrap();
        assert_eq!(loaded, rows);
    }

    #[tokio::test]
    async fn save_replaces_whole_sheet() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        backend
            .save("Estados", &[row(&["old", "x"])])
            .await
            .unwrap();
        backend
            .save("Estados", &[row(&["new", "y"])])
            .await
            .unwrap();

        let loaded = backend.load("Estados").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].cells[0], CellValue::text("new"));
    }

    #[tokio::test]
    async fn sheets_are_independent() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        backend.save("A", &[row(&["a"])]).await.unwrap();
        backend.save("B", &[row(&["b"])]).await.unwrap();

        assert_eq!(backend.load("A").await.unwrap().len(), 1);
        assert_eq!(backend.load("B").await.unwrap().len(), 1);
        backend.save("A", &[]).await.unwrap();
        assert!(backend.load("A").await.unwrap().is_empty());
        assert_eq!(backend.load("B").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn local_file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remedia.db");

        {
            let backend = LibSqlBackend::new_local(&path).await.unwrap();
            backend.save("Estados", &[row(&["kept", "1"])]).await.unwrap();
        }

        let backend = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = backend.load("Estados").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].cells[0], CellValue::text("kept"));
    }
}
