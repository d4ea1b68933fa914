//! Materialization strategies: how a resolved lake version becomes visible in
//! the warehouse.
//!
//! The two strategies are mutually exclusive and selected once at pipeline
//! construction. After either runs, exactly one of {external pointer, native
//! staging table} reflects the lake table; the other is untouched.

use std::future::Future;
use tracing::info;

use crate::error::{ErrorKind, SyncResult};
use crate::lake::TableSnapshot;
use crate::sync_error;
use crate::warehouse::{ensure_replaceable, ExternalSource, TableKind, Warehouse};

/// Result of one materialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterializeOutcome {
    /// Rows loaded into staging, when the strategy loads rows at all.
    pub rows_loaded: Option<u64>,
}

/// Strategy for making a lake table version usable from the warehouse.
pub trait Materializer<W: Warehouse> {
    /// Returns the name of the strategy, for dispatch logging.
    fn name() -> &'static str;

    /// Whether the strategy consumes an in-memory snapshot of the lake table.
    ///
    /// The orchestrator skips the snapshot read entirely when this is `false`;
    /// an external registration only needs the storage location.
    fn consumes_snapshot(&self) -> bool;

    /// Whether the strategy produces a native merge source.
    ///
    /// An external-table registration is read-only and can never feed the
    /// merge, so the merge step is skipped when this is `false`.
    fn supports_merge(&self) -> bool;

    /// Registers or loads the resolved version into the warehouse.
    fn materialize(
        &self,
        warehouse: &W,
        version: i64,
        snapshot: Option<&TableSnapshot>,
    ) -> impl Future<Output = SyncResult<MaterializeOutcome>> + Send;
}

/// Registers the warehouse table as an external pointer to lake storage.
///
/// The registration is query-only: regions hosting these pointers are
/// federation-only, so it can never be a merge target, and this strategy never
/// reads lake data itself.
#[derive(Debug, Clone)]
pub struct ExternalPointerMaterializer {
    table_id: String,
    source: ExternalSource,
}

impl ExternalPointerMaterializer {
    pub fn new(table_id: impl Into<String>, source: ExternalSource) -> Self {
        Self {
            table_id: table_id.into(),
            source,
        }
    }
}

impl<W: Warehouse + Sync> Materializer<W> for ExternalPointerMaterializer {
    fn name() -> &'static str {
        "external_pointer"
    }

    fn consumes_snapshot(&self) -> bool {
        false
    }

    fn supports_merge(&self) -> bool {
        false
    }

    async fn materialize(
        &self,
        warehouse: &W,
        version: i64,
        _snapshot: Option<&TableSnapshot>,
    ) -> SyncResult<MaterializeOutcome> {
        ensure_replaceable(warehouse, &self.table_id, TableKind::External).await?;
        warehouse
            .register_external_table(&self.table_id, &self.source)
            .await?;

        info!(
            table_id = %self.table_id,
            location = %self.source.location,
            lake_version = version,
            "registered external table for resolved lake version"
        );

        Ok(MaterializeOutcome { rows_loaded: None })
    }
}

/// Loads the snapshot into a native staging table with full-replace semantics.
///
/// This bypasses any external-pointer abstraction and cross-region
/// restrictions entirely; it is the strategy the merge depends on.
#[derive(Debug, Clone)]
pub struct BridgeLoadMaterializer {
    staging_table: String,
}

impl BridgeLoadMaterializer {
    pub fn new(staging_table: impl Into<String>) -> Self {
        Self {
            staging_table: staging_table.into(),
        }
    }
}

impl<W: Warehouse + Sync> Materializer<W> for BridgeLoadMaterializer {
    fn name() -> &'static str {
        "bridge_load"
    }

    fn consumes_snapshot(&self) -> bool {
        true
    }

    fn supports_merge(&self) -> bool {
        true
    }

    async fn materialize(
        &self,
        warehouse: &W,
        version: i64,
        snapshot: Option<&TableSnapshot>,
    ) -> SyncResult<MaterializeOutcome> {
        let snapshot = snapshot.ok_or_else(|| {
            sync_error!(
                ErrorKind::InvalidState,
                "Bridge load requires a materialized snapshot"
            )
        })?;

        ensure_replaceable(warehouse, &self.staging_table, TableKind::Native).await?;
        let rows_loaded = warehouse.load_staging(&self.staging_table, snapshot).await?;

        info!(
            staging_table = %self.staging_table,
            rows_loaded,
            lake_version = version,
            "bridge-loaded snapshot into staging"
        );

        Ok(MaterializeOutcome {
            rows_loaded: Some(rows_loaded),
        })
    }
}
