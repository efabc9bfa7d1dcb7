//! In-memory typed worksheet.
//!
//! All mutation happens against the in-memory table; `save` is the only
//! path to durable persistence and `reload` the only path back from it
//! (discarding unsaved changes). Staleness is therefore explicit: a caller
//! that wants a fresh diff reloads first.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::backend::TabularBackend;
use crate::store::schema::{CellValue, Row, SheetSchema};

/// One worksheet of the Record Store.
pub struct Worksheet {
    name: &'static str,
    schema: SheetSchema,
    rows: Vec<Row>,
    backend: Arc<dyn TabularBackend>,
}

impl Worksheet {
    /// Load the worksheet from the backend, coercing every cell to the
    /// schema's column types.
    pub async fn open(
        name: &'static str,
        schema: SheetSchema,
        backend: Arc<dyn TabularBackend>,
    ) -> Result<Self, StoreError> {
        let mut sheet = Self {
            name,
            schema,
            rows: Vec::new(),
            backend,
        };
        sheet.reload().await?;
        Ok(sheet)
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn schema(&self) -> &SheetSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Snapshot of all rows.
    pub fn read_all(&self) -> Vec<Row> {
        self.rows.clone()
    }

    /// Cell of `row` addressed by column name.
    pub fn cell<'a>(&self, row: &'a Row, column: &str) -> Option<&'a CellValue> {
        let idx = self.schema.index_of(column)?;
        row.cells.get(idx)
    }

    fn index_of(&self, column: &str) -> Result<usize, StoreError> {
        self.schema
            .index_of(column)
            .ok_or_else(|| StoreError::UnknownColumn {
                sheet: self.name.to_string(),
                column: column.to_string(),
            })
    }

    /// Append a schema-shaped row, coercing each cell to its column type.
    pub fn add(&mut self, row: Row) -> Result<(), StoreError> {
        if row.cells.len() != self.schema.len() {
            return Err(StoreError::ColumnCount {
                sheet: self.name.to_string(),
                expected: self.schema.len(),
                got: row.cells.len(),
            });
        }
        let coerced = Row::new(
            row.cells
                .into_iter()
                .zip(self.schema.columns())
                .map(|(cell, col)| cell.coerce(col.ty))
                .collect(),
        );
        self.rows.push(coerced);
        Ok(())
    }

    /// Append a row given `(column, value)` pairs; unnamed columns stay empty.
    pub fn add_values(&mut self, values: &[(&str, CellValue)]) -> Result<(), StoreError> {
        let mut row = Row::empty(&self.schema);
        for (column, value) in values {
            let idx = self.index_of(column)?;
            row.cells[idx] = value.clone();
        }
        self.add(row)
    }

    /// All rows where `column` equals `value`. An empty result is absence,
    /// not an error; only an unknown column is an error.
    ///
    /// The search value is coerced to the column type first, so `"1.234,56"`
    /// matches a numeric cell holding `1234.56`.
    pub fn find(&self, column: &str, value: &CellValue) -> Result<Vec<Row>, StoreError> {
        let idx = self.index_of(column)?;
        let ty = self.schema.columns()[idx].ty;
        let needle = value.clone().coerce(ty);
        Ok(self
            .rows
            .iter()
            .filter(|row| row.cells[idx] == needle)
            .cloned()
            .collect())
    }

    /// Patch every row where `column` equals `search`. Returns the number of
    /// rows patched — callers relying on single-row semantics must search by
    /// a unique key.
    pub fn update(
        &mut self,
        column: &str,
        search: &CellValue,
        patch: &[(&str, CellValue)],
    ) -> Result<usize, StoreError> {
        let idx = self.index_of(column)?;
        let ty = self.schema.columns()[idx].ty;
        let needle = search.clone().coerce(ty);

        let mut targets: Vec<(usize, CellValue)> = Vec::with_capacity(patch.len());
        for (col, value) in patch {
            let col_idx = self.index_of(col)?;
            let col_ty = self.schema.columns()[col_idx].ty;
            targets.push((col_idx, value.clone().coerce(col_ty)));
        }

        let mut matched = 0;
        for row in self.rows.iter_mut().filter(|row| row.cells[idx] == needle) {
            for (col_idx, value) in &targets {
                row.cells[*col_idx] = value.clone();
            }
            matched += 1;
        }

        if matched == 0 {
            debug!(sheet = self.name, column, %needle, "Update matched no rows");
        }
        Ok(matched)
    }

    /// Re-synchronize from the backend, discarding unsaved in-memory changes.
    pub async fn reload(&mut self) -> Result<(), StoreError> {
        let raw = self.backend.load(self.name).await?;
        let mut rows = Vec::with_capacity(raw.len());
        for row in raw {
            if row.cells.len() != self.schema.len() {
                warn!(
                    sheet = self.name,
                    expected = self.schema.len(),
                    got = row.cells.len(),
                    "Dropping malformed backend row"
                );
                continue;
            }
            rows.push(Row::new(
                row.cells
                    .into_iter()
                    .zip(self.schema.columns())
                    .map(|(cell, col)| cell.coerce(col.ty))
                    .collect(),
            ));
        }
        self.rows = rows;
        Ok(())
    }

    /// Persist the in-memory table, replacing the backend sheet.
    pub async fn save(&self) -> Result<(), StoreError> {
        self.backend.save(self.name, &self.rows).await
    }
}
