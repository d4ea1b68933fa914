//! BigQuery warehouse support.

pub mod client;
mod core;
mod encoding;

pub use client::{BigQueryClient, BigQueryDatasetId, BigQueryProjectId, BigQueryTableId};
pub use core::BigQueryWarehouse;
