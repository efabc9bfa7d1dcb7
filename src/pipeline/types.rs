//! Batch upload types.
//!
//! Upload rows arrive loosely typed (spreadsheet exports, JSON uploads);
//! everything is coerced here, at the ingestion boundary, before the
//! pipeline ever sees it.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::state::RemediationState;
use crate::store::schema::{self, CellValue, Row};

/// Remediation protocol bucket, selected by the `QUERY` classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Classifier 2 — email-based workflow.
    A,
    /// Classifier 3 — messaging-based workflow.
    B,
    /// Any other (or missing) classifier value.
    Unclassified,
}

impl Protocol {
    pub fn classify(query: Option<i64>) -> Self {
        match query {
            Some(2) => Self::A,
            Some(3) => Self::B,
            _ => Self::Unclassified,
        }
    }

    /// Initial remediation state assigned at classification time.
    pub fn initial_state(&self) -> RemediationState {
        match self {
            Self::A | Self::B => RemediationState::EnProceso,
            Self::Unclassified => RemediationState::NoProcesado,
        }
    }
}

/// One parsed row of an uploaded batch. Accepts the sheet's Spanish
/// headers as well as snake_case aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRow {
    #[serde(rename = "Fecha", alias = "fecha", default)]
    pub fecha: String,

    #[serde(rename = "Concepto", alias = "concepto", default)]
    pub concepto: String,

    #[serde(
        rename = "N° Movimiento",
        alias = "movimiento",
        alias = "movement_number",
        default,
        deserialize_with = "de_flexible_string"
    )]
    pub movimiento: String,

    #[serde(rename = "Referencia", alias = "referencia", default)]
    pub referencia: String,

    #[serde(
        rename = "Monto",
        alias = "monto",
        default,
        deserialize_with = "de_amount"
    )]
    pub monto: Option<Decimal>,

    #[serde(
        rename = "QUERY",
        alias = "query",
        default,
        deserialize_with = "de_classifier"
    )]
    pub query: Option<i64>,

    #[serde(rename = "CORREO", alias = "correo", alias = "email", default)]
    pub correo: String,

    #[serde(
        rename = "TELEFONO",
        alias = "telefono",
        alias = "phone",
        default,
        deserialize_with = "de_flexible_string"
    )]
    pub telefono: String,

    #[serde(rename = "REMITENTE", alias = "remitente", default)]
    pub remitente: String,

    #[serde(rename = "ARCHIVO", alias = "archivo", default)]
    pub archivo: String,
}

impl UploadRow {
    pub fn protocol(&self) -> Protocol {
        Protocol::classify(self.query)
    }

    /// Contact email, if present and non-empty.
    pub fn email(&self) -> Option<&str> {
        let trimmed = self.correo.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Contact phone, E.164-normalized, if present and non-empty.
    pub fn phone(&self) -> Option<String> {
        let normalized = schema::normalize_phone(&self.telefono);
        (!normalized.is_empty()).then_some(normalized)
    }

    /// Build the transaction record for this row.
    pub fn into_record(
        self,
        state: RemediationState,
        email_id: Option<String>,
        wp_id: Option<String>,
        source_file: Option<&str>,
    ) -> Row {
        let query_cell = self
            .query
            .map(|q| CellValue::text(q.to_string()))
            .unwrap_or(CellValue::Empty);
        let archivo = source_file.unwrap_or(&self.archivo);

        // Cell order matches the `Transacciones` schema.
        Row::new(vec![
            CellValue::text(self.fecha),
            CellValue::text(self.concepto),
            CellValue::text(self.movimiento),
            CellValue::text(self.referencia),
            self.monto.map(CellValue::Number).unwrap_or(CellValue::Empty),
            query_cell,
            CellValue::text(self.correo.trim()),
            CellValue::text(schema::normalize_phone(&self.telefono)),
            CellValue::text(self.remitente),
            CellValue::text(state.label()),
            email_id.map(CellValue::text).unwrap_or(CellValue::Empty),
            wp_id.map(CellValue::text).unwrap_or(CellValue::Empty),
            CellValue::text(archivo),
        ])
    }
}

// ── Flexible deserializers ──────────────────────────────────────────

/// Accept a string or number; anything else becomes empty.
fn de_flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Accept an amount as a JSON number or a formatted string. Only strings
/// carry sheet formatting; a JSON number is already decimal, so its dot is
/// never a thousands separator.
fn de_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) => schema::parse_amount(&s),
        _ => None,
    })
}

/// Accept a classifier as a JSON integer or numeric string.
fn de_classifier<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

// ── Batch outcome ───────────────────────────────────────────────────

/// Per-batch counts. Silent drops stay observable through these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Rows remaining after dedup (before the drop policy).
    pub total_new: usize,
    /// Rows dropped because the movement number already existed (or
    /// repeated within the batch).
    pub duplicates_dropped: usize,
    /// Rows dropped for missing a movement number.
    pub malformed_dropped: usize,
    /// Committed protocol-A rows.
    pub protocol_a_count: usize,
    /// Committed protocol-B rows.
    pub protocol_b_count: usize,
    /// Committed unclassified rows.
    pub unclassified_count: usize,
    /// Protocol-A rows dropped because the email send failed.
    pub protocol_a_dropped: usize,
    /// Protocol-B rows dropped because the dispatch enqueue failed.
    pub protocol_b_dropped: usize,
    /// Whether the store was persisted after commit.
    pub persisted: bool,
}

/// Result of one batch upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "response")]
pub enum BatchOutcome {
    /// Every row was a duplicate (or the upload was empty) — a successful
    /// no-op, not an error.
    #[serde(rename = "No new transactions to process")]
    NoNewTransactions,
    #[serde(rename = "Processing completed")]
    Completed { summary: BatchSummary },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn classifier_partition() {
        assert_eq!(Protocol::classify(Some(2)), Protocol::A);
        assert_eq!(Protocol::classify(Some(3)), Protocol::B);
        assert_eq!(Protocol::classify(Some(7)), Protocol::Unclassified);
        assert_eq!(Protocol::classify(None), Protocol::Unclassified);
    }

    #[test]
    fn initial_states() {
        assert_eq!(Protocol::A.initial_state(), RemediationState::EnProceso);
        assert_eq!(Protocol::B.initial_state(), RemediationState::EnProceso);
        assert_eq!(
            Protocol::Unclassified.initial_state(),
            RemediationState::NoProcesado
        );
    }

    #[test]
    fn deserializes_spanish_headers() {
        let row: UploadRow = serde_json::from_value(serde_json::json!({
            "Fecha": "01/02/2025 10:00:00",
            "Concepto": "Transferencia",
            "N° Movimiento": 1002,
            "Monto": "1.234,56",
            "QUERY": "3",
            "TELEFONO": "'573178965432"
        }))
        .unwrap();

        assert_eq!(row.movimiento, "1002");
        assert_eq!(row.monto, Decimal::from_str("1234.56").ok());
        assert_eq!(row.query, Some(3));
        assert_eq!(row.phone().as_deref(), Some("+573178965432"));
        assert_eq!(row.protocol(), Protocol::B);
    }

    #[test]
    fn deserializes_snake_case_aliases() {
        let row: UploadRow = serde_json::from_value(serde_json::json!({
            "movimiento": "1001",
            "monto": 99.5,
            "query": 2,
            "correo": " cliente@example.com "
        }))
        .unwrap();

        assert_eq!(row.movimiento, "1001");
        assert_eq!(row.monto, Decimal::from_str("99.5").ok());
        assert_eq!(row.email(), Some("cliente@example.com"));
        assert_eq!(row.protocol(), Protocol::A);
    }

    #[test]
    fn record_carries_state_and_ids() {
        let row: UploadRow = serde_json::from_value(serde_json::json!({
            "movimiento": "1002",
            "query": 3,
            "telefono": "573178965432"
        }))
        .unwrap();

        let record = row.into_record(
            RemediationState::EnProceso,
            None,
            Some("abc123-def456".into()),
            Some("upload.xlsx"),
        );
        assert_eq!(record.cells.len(), 13);
        assert_eq!(record.cells[2], CellValue::text("1002"));
        assert_eq!(record.cells[9], CellValue::text("En Proceso"));
        assert_eq!(record.cells[11], CellValue::text("abc123-def456"));
        assert_eq!(record.cells[12], CellValue::text("upload.xlsx"));
    }

    #[test]
    fn amount_formats_by_source_type() {
        // A string amount uses sheet formatting; a JSON number is decimal.
        let row: UploadRow = serde_json::from_value(serde_json::json!({
            "movimiento": "1",
            "monto": "1.234"
        }))
        .unwrap();
        assert_eq!(row.monto, Decimal::from_str("1234").ok());

        let row: UploadRow = serde_json::from_value(serde_json::json!({
            "movimiento": "2",
            "monto": 1.234
        }))
        .unwrap();
        assert_eq!(row.monto, Decimal::from_str("1.234").ok());
    }

    #[test]
    fn missing_contact_fields_are_none() {
        let row: UploadRow =
            serde_json::from_value(serde_json::json!({ "movimiento": "1" })).unwrap();
        assert!(row.email().is_none());
        assert!(row.phone().is_none());
    }
}
