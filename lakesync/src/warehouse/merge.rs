//! Merge contract between staging, dimension, and curated tables.

use crate::tables;

/// Names the three tables participating in the merge.
///
/// The merge always sources from the native staging table; an external-table
/// registration is never a valid source or target.
#[derive(Debug, Clone)]
pub struct MergeSpec {
    pub staging_table: String,
    pub dimension_table: String,
    pub curated_table: String,
}

impl Default for MergeSpec {
    fn default() -> Self {
        Self {
            staging_table: tables::STAGING_TABLE.to_string(),
            dimension_table: tables::DIMENSION_TABLE.to_string(),
            curated_table: tables::CURATED_TABLE.to_string(),
        }
    }
}

/// Outcome counts of one merge execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows inserted or updated by the statement. Zero on an idempotent re-run
    /// with unchanged staging content.
    pub rows_affected: u64,
}
