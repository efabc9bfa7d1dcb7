//! Sheet schemas and typed cells.
//!
//! The durable backend is a loosely-typed tabular store; every value passes
//! through a fixed per-sheet schema on load and on `add` so column types
//! cannot drift. Amounts are decimals, never binary floats.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Worksheet names in the durable backend.
pub const SHEET_TRANSACTIONS: &str = "Transacciones";
pub const SHEET_EMAIL_HISTORY: &str = "Historial_Correos";
pub const SHEET_WP_HISTORY: &str = "Historial_WP";
pub const SHEET_STATES: &str = "Estados";

/// Timestamp format used in sheet cells.
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Column names, as they appear in the sheets.
pub mod columns {
    pub const FECHA: &str = "Fecha";
    pub const CONCEPTO: &str = "Concepto";
    pub const MOVIMIENTO: &str = "N° Movimiento";
    pub const REFERENCIA: &str = "Referencia";
    pub const MONTO: &str = "Monto";
    pub const QUERY: &str = "QUERY";
    pub const CORREO: &str = "CORREO";
    pub const TELEFONO: &str = "TELEFONO";
    pub const REMITENTE: &str = "REMITENTE";
    pub const ESTADO: &str = "ESTADO DE REMEDIACION";
    pub const EMAIL_ID: &str = "EMAIL ID";
    pub const WP_ID: &str = "WP ID";
    pub const ARCHIVO: &str = "ARCHIVO";
    pub const MENSAJE: &str = "Mensaje";
    pub const ESTADO_NOMBRE: &str = "Estado";
    pub const DESCRIPCION: &str = "Descripción";
}

/// Type of a sheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Number,
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(Decimal),
}

impl CellValue {
    /// Text cell; empty strings collapse to `Empty`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    pub fn number(value: Decimal) -> Self {
        Self::Number(value)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Coerce this cell to a column type. Unparseable values become `Empty`
    /// rather than poisoning the sheet, matching the ingestion converters of
    /// the upstream store.
    pub fn coerce(self, ty: ColumnType) -> Self {
        match (ty, self) {
            (_, Self::Empty) => Self::Empty,
            (ColumnType::Text, Self::Text(s)) => Self::text(s),
            (ColumnType::Text, Self::Number(n)) => Self::Text(n.to_string()),
            (ColumnType::Number, Self::Number(n)) => Self::Number(n),
            (ColumnType::Number, Self::Text(s)) => {
                parse_amount(&s).map(Self::Number).unwrap_or(Self::Empty)
            }
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Parse a monetary amount that may use Latin-American formatting
/// (`.` thousands separator, `,` decimal separator) or plain decimal text.
///
/// A string with a `,`, or with dot-separated 3-digit groups ("1.234"), is
/// Latin; the dot is a thousands separator there, so "1.234" is 1234, not
/// one-and-a-fraction.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(',') || is_dot_grouped(trimmed) {
        // "1.234,56" → "1234.56"
        let latin = trimmed.replace('.', "").replace(',', ".");
        return latin.parse::<Decimal>().ok();
    }
    trimmed.parse::<Decimal>().ok()
}

/// True for dot-separated thousands groups without a decimal part,
/// e.g. "1.234" or "-12.345.678".
fn is_dot_grouped(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut groups = digits.split('.');
    let Some(first) = groups.next() else {
        return false;
    };
    if first.is_empty() || first.len() > 3 || !first.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut rest = 0;
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        rest += 1;
    }
    rest >= 1
}

/// Normalize a phone number toward E.164: strip the sheet's leading
/// apostrophe guard and make sure the number carries a `+` prefix.
pub fn normalize_phone(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\'' | ' ' | '-'))
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('+') {
        cleaned
    } else {
        format!("+{cleaned}")
    }
}

/// A sheet column definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Text,
    }
}

const fn number(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Number,
    }
}

/// Fixed column layout of one worksheet.
#[derive(Debug, Clone)]
pub struct SheetSchema {
    columns: &'static [Column],
}

impl SheetSchema {
    /// `Transacciones` — the transaction record sheet.
    pub fn transactions() -> Self {
        const COLS: &[Column] = &[
            text(columns::FECHA),
            text(columns::CONCEPTO),
            text(columns::MOVIMIENTO),
            text(columns::REFERENCIA),
            number(columns::MONTO),
            text(columns::QUERY),
            text(columns::CORREO),
            text(columns::TELEFONO),
            text(columns::REMITENTE),
            text(columns::ESTADO),
            text(columns::EMAIL_ID),
            text(columns::WP_ID),
            text(columns::ARCHIVO),
        ];
        Self { columns: COLS }
    }

    /// `Historial_Correos` — append-only email history.
    pub fn email_history() -> Self {
        const COLS: &[Column] = &[
            text(columns::FECHA),
            text(columns::MOVIMIENTO),
            text(columns::EMAIL_ID),
            text(columns::MENSAJE),
        ];
        Self { columns: COLS }
    }

    /// `Historial_WP` — append-only messaging history.
    pub fn wp_history() -> Self {
        const COLS: &[Column] = &[
            text(columns::FECHA),
            text(columns::MOVIMIENTO),
            text(columns::WP_ID),
            text(columns::MENSAJE),
        ];
        Self { columns: COLS }
    }

    /// `Estados` — state catalog.
    pub fn states() -> Self {
        const COLS: &[Column] = &[text(columns::ESTADO_NOMBRE), text(columns::DESCRIPCION)];
        Self { columns: COLS }
    }

    pub fn columns(&self) -> &[Column] {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// One worksheet row, cells aligned with the sheet schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<CellValue>,
}

impl Row {
    /// A row of empty cells shaped for `schema`.
    pub fn empty(schema: &SheetSchema) -> Self {
        Self {
            cells: vec![CellValue::Empty; schema.len()],
        }
    }

    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn amount_parses_plain_and_latin() {
        assert_eq!(parse_amount("1234.56"), Decimal::from_str("1234.56").ok());
        assert_eq!(parse_amount("1.234,56"), Decimal::from_str("1234.56").ok());
        assert_eq!(parse_amount("-500"), Decimal::from_str("-500").ok());
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn dot_grouped_amount_is_thousands() {
        // The dot is a thousands separator, never a decimal point.
        assert_eq!(parse_amount("1.234"), Decimal::from_str("1234").ok());
        assert_eq!(parse_amount("-12.345.678"), Decimal::from_str("-12345678").ok());
        assert_eq!(parse_amount("99,50"), Decimal::from_str("99.50").ok());
        // Not a grouped form: four-digit head, or short tail group.
        assert_eq!(parse_amount("1234.5"), Decimal::from_str("1234.5").ok());
        assert_eq!(parse_amount("0.5"), Decimal::from_str("0.5").ok());
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("'573178965432"), "+573178965432");
        assert_eq!(normalize_phone("+57 317 896-5432"), "+573178965432");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn coerce_text_amount_to_number() {
        let cell = CellValue::text("1.234,56").coerce(ColumnType::Number);
        assert_eq!(cell.as_number(), Decimal::from_str("1234.56").ok());
    }

    #[test]
    fn coerce_garbage_amount_to_empty() {
        let cell = CellValue::text("pendiente").coerce(ColumnType::Number);
        assert!(cell.is_empty());
    }

    #[test]
    fn transactions_schema_has_expected_columns() {
        let schema = SheetSchema::transactions();
        assert_eq!(schema.len(), 13);
        assert_eq!(schema.index_of(columns::MOVIMIENTO), Some(2));
        assert_eq!(schema.index_of(columns::ESTADO), Some(9));
        assert_eq!(schema.index_of("no-such-column"), None);
    }
}
