//! Typed cell values for tabular snapshots and warehouse rows.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};

/// A single typed value within a [`crate::types::TableRow`].
///
/// The variants cover the value kinds this pipeline stores: the transaction
/// snapshot columns plus the timestamp columns maintained by the warehouse side.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Absent value for a nullable column.
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    /// Exact fixed-point value, used for monetary amounts.
    Numeric(BigDecimal),
    String(String),
    /// Calendar date with time-of-day discarded.
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    /// Returns `true` when the cell holds no value.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the contained string slice, if this is a non-null string cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the contained numeric value, if this is a non-null numeric cell.
    pub fn as_numeric(&self) -> Option<&BigDecimal> {
        match self {
            Cell::Numeric(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl<T> From<Option<T>> for Cell
where
    T: Into<Cell>,
{
    /// Maps `None` to [`Cell::Null`], preserving the inner conversion otherwise.
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn optional_values_map_to_null() {
        let absent: Option<&str> = None;
        assert_eq!(Cell::from(absent), Cell::Null);
        assert_eq!(Cell::from(Some("CUST-A")), Cell::String("CUST-A".into()));
    }

    #[test]
    fn accessors_reject_other_variants() {
        let amount = Cell::Numeric(BigDecimal::from_str("150.00").unwrap());
        assert!(amount.as_str().is_none());
        assert!(amount.as_numeric().is_some());
        assert!(!amount.is_null());
        assert!(Cell::Null.is_null());
    }
}
