//! Warehouse abstraction: the operations the pipeline needs from its target.
//!
//! [`Warehouse`] implementations define how registrations are inspected and
//! replaced, how staging loads land, and how the merge executes. The BigQuery
//! implementation is the production target; [`memory::MemoryWarehouse`] mirrors
//! the same semantics in memory for tests and development.

use std::fmt;
use std::future::Future;

use crate::error::SyncResult;
use crate::lake::TableSnapshot;
use crate::types::{TableRow, TableSchema};

pub mod bigquery;
pub mod memory;
mod merge;
mod reconcile;

pub use merge::{MergeSpec, MergeStats};
pub use reconcile::{ensure_replaceable, reconcile_action, ReconcileAction};

/// The kind of an existing warehouse table registration.
///
/// A registration's kind cannot be changed in place; switching kinds requires
/// drop-then-recreate, which is what the reconciler automates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Warehouse-owned storage; the only kind that can be a merge target.
    Native,
    /// Pointer to external storage; read-only, never a merge source or target.
    External,
    /// Any other registration (views, snapshots); always conflicts with a
    /// create-or-replace of either kind above.
    Other,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Native => write!(f, "native"),
            TableKind::External => write!(f, "external"),
            TableKind::Other => write!(f, "other"),
        }
    }
}

/// Declared format of the files behind an external-table registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Parquet,
    DeltaLake,
}

impl SourceFormat {
    /// The format literal used in external-table DDL.
    pub fn as_ddl(&self) -> &'static str {
        match self {
            SourceFormat::Parquet => "PARQUET",
            SourceFormat::DeltaLake => "DELTA_LAKE",
        }
    }
}

/// External storage location an external-table registration points at.
#[derive(Debug, Clone)]
pub struct ExternalSource {
    /// Storage URI of the lake table (or of its exported file snapshot).
    pub location: String,
    pub format: SourceFormat,
    /// Optional warehouse connection used to reach the storage provider.
    pub connection: Option<String>,
}

/// Operations the synchronization pipeline performs against its warehouse.
///
/// All operations are blocking from the orchestrator's perspective: each future
/// resolves only once the warehouse reports a terminal success or failure for
/// the statement.
pub trait Warehouse {
    /// Returns the name of the warehouse, for dispatch logging.
    fn name() -> &'static str;

    /// Returns the kind of an existing registration, or [`None`] when the table
    /// does not exist.
    fn table_kind(
        &self,
        table_id: &str,
    ) -> impl Future<Output = SyncResult<Option<TableKind>>> + Send;

    /// Drops a table registration if it exists.
    fn drop_table(&self, table_id: &str) -> impl Future<Output = SyncResult<()>> + Send;

    /// Creates or replaces an external-table registration pointing at `source`.
    ///
    /// The caller must have reconciled the kind first; replacing across kinds is
    /// refused by the warehouse.
    fn register_external_table(
        &self,
        table_id: &str,
        source: &ExternalSource,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Fully replaces the native staging table with the snapshot's rows.
    ///
    /// Truncate-and-load semantics: stale rows can never survive a run where
    /// the source produced fewer rows. Returns the number of rows loaded.
    fn load_staging(
        &self,
        table_id: &str,
        snapshot: &TableSnapshot,
    ) -> impl Future<Output = SyncResult<u64>> + Send;

    /// Creates a native table when absent; never touches an existing one.
    ///
    /// Returns `true` when the table was created by this call.
    fn create_table_if_missing(
        &self,
        table_id: &str,
        schema: &TableSchema,
    ) -> impl Future<Output = SyncResult<bool>> + Send;

    /// Inserts `rows` only when the table is currently empty.
    ///
    /// The emptiness check and the insert execute as one statement, so repeated
    /// or concurrent seeders converge without locking. Returns the number of
    /// rows inserted (zero when the table already had rows).
    fn seed_if_empty(
        &self,
        table_id: &str,
        schema: &TableSchema,
        rows: Vec<TableRow>,
    ) -> impl Future<Output = SyncResult<u64>> + Send;

    /// Applies the change-aware upsert from staging (joined with the dimension)
    /// into the curated table.
    fn merge_into_curated(
        &self,
        spec: &MergeSpec,
    ) -> impl Future<Output = SyncResult<MergeStats>> + Send;
}
