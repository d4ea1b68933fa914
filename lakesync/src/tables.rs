//! Fixed table definitions for the transaction synchronization pipeline.
//!
//! The pipeline operates on a closed set of tables: the transactions staging
//! table (full-replaced each run), the customers dimension, and the curated
//! final table keyed by transaction id.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::str::FromStr;

use crate::types::{Cell, ColumnSchema, ColumnType, TableRow, TableSchema};

/// Default name of the native staging table.
pub const STAGING_TABLE: &str = "transactions_staging";
/// Default name of the customers dimension table.
pub const DIMENSION_TABLE: &str = "customers";
/// Default name of the curated output table.
pub const CURATED_TABLE: &str = "final_table";
/// Default name of the external (federated) registration.
pub const EXTERNAL_TABLE: &str = "transactions_federated";

/// Schema of the transaction rows read from the lake table and loaded into staging.
pub fn transactions_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSchema::new("transaction_id", ColumnType::String, false, true),
        ColumnSchema::new("customer_id", ColumnType::String, true, false),
        ColumnSchema::new("amount", ColumnType::Numeric, true, false),
        ColumnSchema::new("transaction_date", ColumnType::Date, true, false),
        ColumnSchema::new("status", ColumnType::String, true, false),
    ])
}

/// Schema of the customers dimension table.
pub fn customers_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSchema::new("customer_id", ColumnType::String, false, true),
        ColumnSchema::new("customer_name", ColumnType::String, true, false),
        ColumnSchema::new("email", ColumnType::String, true, false),
        ColumnSchema::new("country", ColumnType::String, true, false),
        ColumnSchema::new("updated_at", ColumnType::Timestamp, true, false),
    ])
}

/// Schema of the curated final table maintained by the merge.
pub fn curated_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSchema::new("transaction_id", ColumnType::String, false, true),
        ColumnSchema::new("customer_id", ColumnType::String, true, false),
        ColumnSchema::new("customer_name", ColumnType::String, true, false),
        ColumnSchema::new("country", ColumnType::String, true, false),
        ColumnSchema::new("amount", ColumnType::Numeric, true, false),
        ColumnSchema::new("transaction_date", ColumnType::Date, true, false),
        ColumnSchema::new("status", ColumnType::String, true, false),
        ColumnSchema::new("last_updated", ColumnType::Timestamp, true, false),
    ])
}

/// The fixed reference customer set seeded into an empty dimension table.
pub fn reference_customers() -> Vec<TableRow> {
    let customers = [
        ("CUST-A", "Alice Johnson", "alice@example.com", "Colombia"),
        ("CUST-B", "Bob Smith", "bob@example.com", "Mexico"),
        ("CUST-C", "Carlos Rivera", "carlos@example.com", "Colombia"),
        ("CUST-D", "Diana Torres", "diana@example.com", "Peru"),
    ];

    let seeded_at = Utc::now();

    customers
        .iter()
        .map(|(id, name, email, country)| {
            TableRow::new(vec![
                Cell::from(*id),
                Cell::from(*name),
                Cell::from(*email),
                Cell::from(*country),
                Cell::Timestamp(seeded_at),
            ])
        })
        .collect()
}

/// Parses an amount literal into the exact scale-2 representation used everywhere
/// amounts are stored or compared.
pub fn amount(literal: &str) -> BigDecimal {
    BigDecimal::from_str(literal)
        .expect("amount literal must be a valid decimal")
        .with_scale(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_and_seed_rows_agree_on_width() {
        assert_eq!(transactions_schema().columns().len(), 5);
        assert_eq!(customers_schema().columns().len(), 5);
        assert_eq!(curated_schema().columns().len(), 8);

        let rows = reference_customers();
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert_eq!(row.values().len(), customers_schema().columns().len());
        }
    }

    #[test]
    fn transaction_key_is_primary() {
        let schema = transactions_schema();
        let key = &schema.columns()[schema.index_of("transaction_id").unwrap()];
        assert!(key.primary);
        assert!(!key.nullable);
    }

    #[test]
    fn amount_literals_normalize_to_scale_two() {
        assert_eq!(amount("150"), amount("150.00"));
        assert_eq!(amount("89.99").to_string(), "89.99");
    }
}
