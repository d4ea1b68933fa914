//! Encoding of typed rows into BigQuery insert payloads and SQL literals.

use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{Cell, TableRow, TableSchema};

/// Encodes a row as the JSON object shape the tabledata insert API expects.
///
/// Null cells are omitted rather than serialized, which BigQuery treats
/// identically and keeps payloads small.
pub fn encode_row(schema: &TableSchema, row: &TableRow) -> SyncResult<Map<String, Value>> {
    if row.values().len() != schema.columns().len() {
        bail!(
            ErrorKind::InvalidState,
            "Row width does not match the table schema",
            format!(
                "{} cells for {} columns",
                row.values().len(),
                schema.columns().len()
            )
        );
    }

    let mut object = Map::with_capacity(schema.columns().len());
    for (column, cell) in schema.columns().iter().zip(row.values()) {
        if let Some(value) = encode_cell(cell) {
            object.insert(column.name.clone(), value);
        }
    }

    Ok(object)
}

/// Encodes one cell as a JSON value, or [`None`] for nulls.
///
/// Exact decimals travel as strings so no float rounding can occur on the way
/// into a NUMERIC column; dates and timestamps use the canonical BigQuery
/// literal shapes.
fn encode_cell(cell: &Cell) -> Option<Value> {
    match cell {
        Cell::Null => None,
        Cell::Bool(value) => Some(Value::Bool(*value)),
        Cell::I64(value) => Some(Value::from(*value)),
        Cell::F64(value) => Some(Value::from(*value)),
        Cell::Numeric(value) => Some(Value::String(value.to_string())),
        Cell::String(value) => Some(Value::String(value.clone())),
        Cell::Date(value) => Some(Value::String(value.format("%Y-%m-%d").to_string())),
        Cell::Timestamp(value) => Some(Value::String(value.to_rfc3339())),
    }
}

/// Renders a cell as a GoogleSQL literal for embedding in a statement.
pub fn sql_literal(cell: &Cell) -> String {
    match cell {
        Cell::Null => "NULL".to_string(),
        Cell::Bool(value) => value.to_string(),
        Cell::I64(value) => value.to_string(),
        Cell::F64(value) => value.to_string(),
        Cell::Numeric(value) => format!("NUMERIC '{value}'"),
        Cell::String(value) => format!(
            "'{}'",
            super::client::BigQueryClient::escape_string_literal(value)
        ),
        Cell::Date(value) => format!("DATE '{}'", value.format("%Y-%m-%d")),
        Cell::Timestamp(value) => format!("TIMESTAMP '{}'", value.to_rfc3339()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{amount, transactions_schema};
    use chrono::NaiveDate;

    fn transaction_row() -> TableRow {
        TableRow::new(vec![
            Cell::from("TXN-001"),
            Cell::Null,
            Cell::Numeric(amount("150.00")),
            Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
            Cell::from("completed"),
        ])
    }

    #[test]
    fn rows_encode_with_nulls_omitted() {
        let object = encode_row(&transactions_schema(), &transaction_row()).unwrap();

        assert_eq!(object["transaction_id"], Value::from("TXN-001"));
        assert!(!object.contains_key("customer_id"));
        assert_eq!(object["amount"], Value::from("150.00"));
        assert_eq!(object["transaction_date"], Value::from("2024-01-15"));
        assert_eq!(object["status"], Value::from("completed"));
    }

    #[test]
    fn row_width_mismatch_is_rejected() {
        let row = TableRow::new(vec![Cell::from("TXN-001")]);
        let err = encode_row(&transactions_schema(), &row).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn sql_literals_quote_by_type() {
        assert_eq!(sql_literal(&Cell::Null), "NULL");
        assert_eq!(sql_literal(&Cell::from("o'brien")), "'o\\'brien'");
        assert_eq!(sql_literal(&Cell::Numeric(amount("89.99"))), "NUMERIC '89.99'");
        assert_eq!(
            sql_literal(&Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())),
            "DATE '2024-01-15'"
        );
    }
}
