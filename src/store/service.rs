//! Sheet service — the four worksheets plus the cross-sheet operations.
//!
//! Owns the Record Store proper (`Transacciones`), the two append-only
//! history ledgers (`Historial_Correos`, `Historial_WP`) and the state
//! catalog (`Estados`). Cross-sheet operations here expose the boolean
//! failure mode the callers expect: failures are logged and reported as
//! `false`, never raised.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::error::StoreError;
use crate::state::RemediationState;
use crate::store::backend::TabularBackend;
use crate::store::schema::{self, columns, CellValue, Row, SheetSchema, DATE_FORMAT};
use crate::store::worksheet::Worksheet;

/// In-memory mirror of the durable tabular store.
///
/// Each worksheet sits behind its own `RwLock`; there is no cross-sheet
/// transaction. Two racing uploads can both pass the dedup check before
/// either commits — an accepted limitation of the reload-then-diff design.
pub struct SheetService {
    pub transactions: RwLock<Worksheet>,
    pub email_history: RwLock<Worksheet>,
    pub wp_history: RwLock<Worksheet>,
    pub states: RwLock<Worksheet>,
}

impl SheetService {
    /// Load all four worksheets from the backend. Seeds the `Estados`
    /// catalog on first run.
    pub async fn open(backend: Arc<dyn TabularBackend>) -> Result<Arc<Self>, StoreError> {
        let transactions = Worksheet::open(
            schema::SHEET_TRANSACTIONS,
            SheetSchema::transactions(),
            Arc::clone(&backend),
        )
        .await?;
        let email_history = Worksheet::open(
            schema::SHEET_EMAIL_HISTORY,
            SheetSchema::email_history(),
            Arc::clone(&backend),
        )
        .await?;
        let wp_history = Worksheet::open(
            schema::SHEET_WP_HISTORY,
            SheetSchema::wp_history(),
            Arc::clone(&backend),
        )
        .await?;
        let mut states = Worksheet::open(
            schema::SHEET_STATES,
            SheetSchema::states(),
            Arc::clone(&backend),
        )
        .await?;

        if states.is_empty() {
            for state in RemediationState::ALL {
                states.add_values(&[
                    (columns::ESTADO_NOMBRE, CellValue::text(state.label())),
                    (columns::DESCRIPCION, CellValue::text(state.description())),
                ])?;
            }
            states.save().await?;
        }

        Ok(Arc::new(Self {
            transactions: RwLock::new(transactions),
            email_history: RwLock::new(email_history),
            wp_history: RwLock::new(wp_history),
            states: RwLock::new(states),
        }))
    }

    /// Timestamp in the sheet cell format.
    pub fn timestamp() -> String {
        Utc::now().format(DATE_FORMAT).to_string()
    }

    /// Find a transaction by movement number.
    pub async fn find_transaction(&self, movement: &str) -> Option<Row> {
        let sheet = self.transactions.read().await;
        match sheet.find(columns::MOVIMIENTO, &CellValue::text(movement)) {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                error!(error = %e, "Transaction lookup failed");
                None
            }
        }
    }

    /// Update the remediation state of a transaction. Any state may move to
    /// any other; a missing movement number is a no-op reporting `false`.
    pub async fn update_state(&self, movement: &str, new_state: RemediationState) -> bool {
        let mut sheet = self.transactions.write().await;
        match sheet.update(
            columns::MOVIMIENTO,
            &CellValue::text(movement),
            &[(columns::ESTADO, CellValue::text(new_state.label()))],
        ) {
            Ok(0) => {
                warn!(movement, "No transaction found for state update");
                false
            }
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, movement, "State update failed");
                false
            }
        }
    }

    /// Append a message to the email history ledger.
    ///
    /// The correlation id must resolve to a transaction via the `EMAIL ID`
    /// column; otherwise the message is rejected and no ledger row is
    /// written — entries are never orphaned.
    pub async fn add_email_message(&self, email_id: &str, message: &str) -> bool {
        self.add_history_message(&self.email_history, columns::EMAIL_ID, email_id, message)
            .await
    }

    /// Append a message to the messaging history ledger, keyed by `WP ID`.
    pub async fn add_whatsapp_message(&self, wp_id: &str, message: &str) -> bool {
        self.add_history_message(&self.wp_history, columns::WP_ID, wp_id, message)
            .await
    }

    async fn add_history_message(
        &self,
        ledger: &RwLock<Worksheet>,
        id_column: &str,
        correlation_id: &str,
        message: &str,
    ) -> bool {
        let movement = {
            let transactions = self.transactions.read().await;
            let matches = match transactions.find(id_column, &CellValue::text(correlation_id)) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, "Correlation lookup failed");
                    return false;
                }
            };
            let Some(row) = matches.first() else {
                warn!(
                    correlation_id,
                    column = id_column,
                    "No transaction found for correlation id; message rejected"
                );
                return false;
            };
            transactions
                .cell(row, columns::MOVIMIENTO)
                .map(|c| c.to_string())
                .unwrap_or_default()
        };

        let mut sheet = ledger.write().await;
        let result = sheet.add_values(&[
            (columns::FECHA, CellValue::text(Self::timestamp())),
            (columns::MOVIMIENTO, CellValue::text(movement)),
            (id_column, CellValue::text(correlation_id)),
            (columns::MENSAJE, CellValue::text(message)),
        ]);
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, correlation_id, "Failed to append history entry");
                false
            }
        }
    }

    /// Persist every worksheet. Returns `false` if any save failed.
    pub async fn save_all(&self) -> bool {
        let mut ok = true;
        for (name, sheet) in self.all_sheets() {
            if let Err(e) = sheet.read().await.save().await {
                error!(error = %e, sheet = name, "Save failed");
                ok = false;
            }
        }
        ok
    }

    /// Reload every worksheet from the backend, discarding unsaved changes.
    /// Returns `false` if any reload failed.
    pub async fn reload_all(&self) -> bool {
        let mut ok = true;
        for (name, sheet) in self.all_sheets() {
            if let Err(e) = sheet.write().await.reload().await {
                error!(error = %e, sheet = name, "Reload failed");
                ok = false;
            }
        }
        ok
    }

    fn all_sheets(&self) -> [(&'static str, &RwLock<Worksheet>); 4] {
        [
            (schema::SHEET_TRANSACTIONS, &self.transactions),
            (schema::SHEET_EMAIL_HISTORY, &self.email_history),
            (schema::SHEET_WP_HISTORY, &self.wp_history),
            (schema::SHEET_STATES, &self.states),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::LibSqlBackend;

    async fn service() -> Arc<SheetService> {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        SheetService::open(backend).await.unwrap()
    }

    async fn seed_transaction(service: &SheetService, movement: &str, email_id: &str) {
        let mut sheet = service.transactions.write().await;
        sheet
            .add_values(&[
                (columns::MOVIMIENTO, CellValue::text(movement)),
                (columns::ESTADO, CellValue::text("En Proceso")),
                (columns::EMAIL_ID, CellValue::text(email_id)),
            ])
            .unwrap();
    }

    #[tokio::test]
    async fn states_catalog_is_seeded() {
        let service = service().await;
        let states = service.states.read().await;
        assert_eq!(states.len(), RemediationState::ALL.len());
    }

    #[tokio::test]
    async fn update_state_total_function() {
        let service = service().await;
        seed_transaction(&service, "1002", "").await;

        assert!(
            service
                .update_state("1002", RemediationState::Completado)
                .await
        );
        let row = service.find_transaction("1002").await.unwrap();
        let sheet = service.transactions.read().await;
        assert_eq!(
            sheet.cell(&row, columns::ESTADO).unwrap().to_string(),
            "Completado"
        );
    }

    #[tokio::test]
    async fn update_state_missing_movement_is_noop() {
        let service = service().await;
        seed_transaction(&service, "1002", "").await;

        assert!(
            !service
                .update_state("9999", RemediationState::Completado)
                .await
        );
        // Store unchanged.
        let row = service.find_transaction("1002").await.unwrap();
        let sheet = service.transactions.read().await;
        assert_eq!(
            sheet.cell(&row, columns::ESTADO).unwrap().to_string(),
            "En Proceso"
        );
    }

    #[tokio::test]
    async fn ledger_rejects_unknown_correlation_id() {
        let service = service().await;
        seed_transaction(&service, "1001", "abc123-def456").await;

        assert!(!service.add_email_message("zzzzzz-zzzzzz", "hola").await);
        assert!(service.email_history.read().await.is_empty());
    }

    #[tokio::test]
    async fn ledger_appends_resolved_message() {
        let service = service().await;
        seed_transaction(&service, "1001", "abc123-def456").await;

        assert!(service.add_email_message("abc123-def456", "hola").await);

        let ledger = service.email_history.read().await;
        assert_eq!(ledger.len(), 1);
        let rows = ledger
            .find(columns::EMAIL_ID, &CellValue::text("abc123-def456"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            ledger.cell(&rows[0], columns::MOVIMIENTO).unwrap().to_string(),
            "1001"
        );
        assert_eq!(
            ledger.cell(&rows[0], columns::MENSAJE).unwrap().to_string(),
            "hola"
        );
        // Timestamp carries the sheet date format (dd/mm/yyyy hh:mm:ss).
        let stamp = ledger.cell(&rows[0], columns::FECHA).unwrap().to_string();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, DATE_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn save_and_reload_round_trip() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let service = SheetService::open(Arc::clone(&backend) as Arc<dyn TabularBackend>)
            .await
            .unwrap();
        seed_transaction(&service, "1001", "").await;

        assert!(service.save_all().await);

        // Unsaved mutation is rolled back by reload.
        seed_transaction(&service, "1002", "").await;
        assert!(service.reload_all().await);
        assert_eq!(service.transactions.read().await.len(), 1);
    }
}
