//! Core data types shared across the lake and warehouse sides.

mod cell;
mod row;
mod schema;

pub use cell::Cell;
pub use row::TableRow;
pub use schema::{ColumnSchema, ColumnType, TableSchema};
