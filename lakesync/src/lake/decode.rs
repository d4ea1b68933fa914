//! Decoding of newline-delimited JSON data files into typed rows.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;
use crate::types::{Cell, ColumnSchema, ColumnType, TableRow, TableSchema};

/// Fixed-point scale applied to every decoded amount.
const AMOUNT_SCALE: i64 = 2;

/// Decodes one NDJSON data-file body into rows of `schema`.
///
/// Blank lines are skipped. Every surviving line must be a JSON object keyed by
/// column name; required columns must be present and non-null.
pub fn decode_rows(schema: &TableSchema, file: &str, body: &str) -> SyncResult<Vec<TableRow>> {
    let mut rows = Vec::new();

    for (line_no, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line).map_err(|err| {
            sync_error!(
                ErrorKind::InvalidData,
                "Data file contains an unparseable row",
                format!("{file}:{}: {err}", line_no + 1)
            )
        })?;

        let object = value.as_object().ok_or_else(|| {
            sync_error!(
                ErrorKind::InvalidData,
                "Data file row is not a JSON object",
                format!("{file}:{}", line_no + 1)
            )
        })?;

        let mut cells = Vec::with_capacity(schema.columns().len());
        for column in schema.columns() {
            let raw = object.get(&column.name).unwrap_or(&Value::Null);
            let cell = decode_cell(column, raw).map_err(|err| {
                sync_error!(
                    ErrorKind::InvalidData,
                    "Data file cell does not match the table schema",
                    format!("{file}:{}: column `{}`: {err}", line_no + 1, column.name)
                )
            })?;
            cells.push(cell);
        }

        rows.push(TableRow::new(cells));
    }

    Ok(rows)
}

/// Decodes a single JSON value into the cell type declared by `column`.
fn decode_cell(column: &ColumnSchema, value: &Value) -> Result<Cell, String> {
    if value.is_null() {
        if column.nullable {
            return Ok(Cell::Null);
        }
        return Err("null in non-nullable column".to_string());
    }

    match column.typ {
        ColumnType::Bool => value
            .as_bool()
            .map(Cell::Bool)
            .ok_or_else(|| format!("expected boolean, got {value}")),
        ColumnType::I64 => value
            .as_i64()
            .map(Cell::I64)
            .ok_or_else(|| format!("expected integer, got {value}")),
        ColumnType::F64 => value
            .as_f64()
            .map(Cell::F64)
            .ok_or_else(|| format!("expected float, got {value}")),
        ColumnType::Numeric => decode_numeric(value),
        ColumnType::String => value
            .as_str()
            .map(Cell::from)
            .ok_or_else(|| format!("expected string, got {value}")),
        ColumnType::Date => decode_date(value),
        ColumnType::Timestamp => decode_timestamp(value),
    }
}

/// Decodes an exact decimal from a JSON number or string, normalized to scale 2.
///
/// Producers disagree on whether amounts are serialized as numbers or strings;
/// both are accepted and funneled through [`BigDecimal`] so no float drift can
/// enter the comparison path.
fn decode_numeric(value: &Value) -> Result<Cell, String> {
    let literal = match value {
        Value::Number(number) => number.to_string(),
        Value::String(literal) => literal.clone(),
        other => return Err(format!("expected decimal, got {other}")),
    };

    let parsed = BigDecimal::from_str(literal.trim())
        .map_err(|err| format!("invalid decimal `{literal}`: {err}"))?;

    Ok(Cell::Numeric(normalize_amount(parsed)))
}

/// Rounds an amount to the fixed pipeline scale (half-up).
pub fn normalize_amount(value: BigDecimal) -> BigDecimal {
    value.with_scale_round(AMOUNT_SCALE, bigdecimal::RoundingMode::HalfUp)
}

/// Decodes a calendar date, discarding any time-of-day component.
fn decode_date(value: &Value) -> Result<Cell, String> {
    let literal = value
        .as_str()
        .ok_or_else(|| format!("expected date string, got {value}"))?;

    if let Ok(date) = NaiveDate::parse_from_str(literal, "%Y-%m-%d") {
        return Ok(Cell::Date(date));
    }

    // Timestamps are tolerated on date columns and truncated to the date.
    DateTime::parse_from_rfc3339(literal)
        .map(|timestamp| Cell::Date(timestamp.date_naive()))
        .map_err(|err| format!("invalid date `{literal}`: {err}"))
}

/// Decodes an RFC 3339 timestamp.
fn decode_timestamp(value: &Value) -> Result<Cell, String> {
    let literal = value
        .as_str()
        .ok_or_else(|| format!("expected timestamp string, got {value}"))?;

    DateTime::parse_from_rfc3339(literal)
        .map(|timestamp| Cell::Timestamp(timestamp.to_utc()))
        .map_err(|err| format!("invalid timestamp `{literal}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::transactions_schema;

    #[test]
    fn rows_decode_against_the_transaction_schema() {
        let body = concat!(
            r#"{"transaction_id":"TXN-001","customer_id":"CUST-A","amount":150.00,"transaction_date":"2024-01-15","status":"completed"}"#,
            "\n",
            r#"{"transaction_id":"TXN-002","customer_id":null,"amount":"220.50","transaction_date":"2024-01-16","status":"pending"}"#,
            "\n",
        );

        let rows = decode_rows(&transactions_schema(), "part-0000.json", body).unwrap();
        assert_eq!(rows.len(), 2);

        let schema = transactions_schema();
        assert_eq!(
            schema.cell(&rows[0], "transaction_id").unwrap().as_str(),
            Some("TXN-001")
        );
        assert!(schema.cell(&rows[1], "customer_id").unwrap().is_null());
        assert_eq!(
            schema.cell(&rows[1], "amount").unwrap().as_numeric(),
            Some(&crate::tables::amount("220.50"))
        );
    }

    #[test]
    fn amounts_normalize_to_scale_two_regardless_of_input_shape() {
        let schema = transactions_schema();
        let body = r#"{"transaction_id":"T","customer_id":"C","amount":45.754,"transaction_date":"2024-01-19","status":"pending"}"#;

        let rows = decode_rows(&schema, "f", body).unwrap();
        assert_eq!(
            schema.cell(&rows[0], "amount").unwrap().as_numeric(),
            Some(&crate::tables::amount("45.75"))
        );
    }

    #[test]
    fn timestamps_on_date_columns_truncate_to_the_date() {
        let schema = transactions_schema();
        let body = r#"{"transaction_id":"T","customer_id":"C","amount":1,"transaction_date":"2024-01-19T23:59:01Z","status":"pending"}"#;

        let rows = decode_rows(&schema, "f", body).unwrap();
        assert_eq!(
            schema.cell(&rows[0], "transaction_date").unwrap(),
            &Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 19).unwrap())
        );
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let body = r#"{"customer_id":"CUST-A","amount":1,"transaction_date":"2024-01-15","status":"x"}"#;

        let err = decode_rows(&transactions_schema(), "f", body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn malformed_line_is_rejected_with_position() {
        let err = decode_rows(&transactions_schema(), "part-1.json", "{oops\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.detail().unwrap().contains("part-1.json:1"));
    }
}
