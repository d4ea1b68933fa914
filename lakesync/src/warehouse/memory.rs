//! In-memory warehouse for testing and development purposes.
//!
//! [`MemoryWarehouse`] mirrors the warehouse semantics the pipeline relies on
//! (registration kinds, kind-checked replaces, guarded seeding, and the
//! change-aware merge) entirely in memory. All data is lost when the process
//! terminates.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ErrorKind, SyncResult};
use crate::lake::TableSnapshot;
use crate::{bail, sync_error};
use crate::types::{Cell, TableRow, TableSchema};
use crate::warehouse::{ExternalSource, MergeSpec, MergeStats, TableKind, Warehouse};

/// Operations whose next invocation can be made to fail, for exercising the
/// orchestrator's failure propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailableOp {
    TableKind,
    DropTable,
    RegisterExternal,
    LoadStaging,
    CreateTable,
    Seed,
    Merge,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    kind: TableKind,
    schema: Option<TableSchema>,
    rows: Vec<TableRow>,
    external: Option<ExternalSource>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, MemoryTable>,
    fail_next: Option<FailableOp>,
}

/// In-memory [`Warehouse`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next invocation of `op` fail with a destination error.
    pub async fn fail_next(&self, op: FailableOp) {
        let mut inner = self.inner.lock().await;
        inner.fail_next = Some(op);
    }

    /// Returns a copy of a table's rows, if the table exists.
    pub async fn table_rows(&self, table_id: &str) -> Option<Vec<TableRow>> {
        let inner = self.inner.lock().await;
        inner.tables.get(table_id).map(|table| table.rows.clone())
    }

    /// Returns the external source a registration points at, if any.
    pub async fn external_source(&self, table_id: &str) -> Option<ExternalSource> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table_id)
            .and_then(|table| table.external.clone())
    }

    /// Pre-creates a native table, for arranging conflict scenarios in tests.
    pub async fn put_native_table(&self, table_id: &str, schema: TableSchema) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(
            table_id.to_string(),
            MemoryTable {
                kind: TableKind::Native,
                schema: Some(schema),
                rows: Vec::new(),
                external: None,
            },
        );
    }
}

impl Inner {
    fn check_fail(&mut self, op: FailableOp) -> SyncResult<()> {
        if self.fail_next == Some(op) {
            self.fail_next = None;
            return Err(sync_error!(
                ErrorKind::DestinationQueryFailed,
                "Injected warehouse failure",
                format!("{op:?}")
            ));
        }
        Ok(())
    }

    fn schema_of(&self, table_id: &str) -> SyncResult<TableSchema> {
        self.tables
            .get(table_id)
            .and_then(|table| table.schema.clone())
            .ok_or_else(|| {
                sync_error!(
                    ErrorKind::InvalidState,
                    "Table has no schema in the memory warehouse",
                    table_id
                )
            })
    }
}

/// Looks up the enrichment cells for a staging row's customer id.
///
/// Unmatched lookups yield null enrichment, never a dropped row.
fn dimension_lookup(
    dimension_schema: &TableSchema,
    dimension_rows: &[TableRow],
    customer_id: &Cell,
) -> SyncResult<(Cell, Cell)> {
    if customer_id.is_null() {
        return Ok((Cell::Null, Cell::Null));
    }

    for row in dimension_rows {
        if dimension_schema.cell(row, "customer_id")? == customer_id {
            return Ok((
                dimension_schema.cell(row, "customer_name")?.clone(),
                dimension_schema.cell(row, "country")?.clone(),
            ));
        }
    }

    Ok((Cell::Null, Cell::Null))
}

impl Warehouse for MemoryWarehouse {
    fn name() -> &'static str {
        "memory"
    }

    async fn table_kind(&self, table_id: &str) -> SyncResult<Option<TableKind>> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::TableKind)?;

        Ok(inner.tables.get(table_id).map(|table| table.kind))
    }

    async fn drop_table(&self, table_id: &str) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::DropTable)?;

        inner.tables.remove(table_id);
        Ok(())
    }

    async fn register_external_table(
        &self,
        table_id: &str,
        source: &ExternalSource,
    ) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::RegisterExternal)?;

        // A replace across kinds is refused, exactly like the real warehouse;
        // the reconciler is expected to have dropped a conflicting table first.
        if let Some(existing) = inner.tables.get(table_id) {
            if existing.kind != TableKind::External {
                bail!(
                    ErrorKind::LoadFailed,
                    "Cannot replace a table of a different kind with an external table",
                    format!("table `{table_id}` exists as {}", existing.kind)
                );
            }
        }

        inner.tables.insert(
            table_id.to_string(),
            MemoryTable {
                kind: TableKind::External,
                schema: None,
                rows: Vec::new(),
                external: Some(source.clone()),
            },
        );

        info!(table_id, location = %source.location, "registered external table in memory");
        Ok(())
    }

    async fn load_staging(&self, table_id: &str, snapshot: &TableSnapshot) -> SyncResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::LoadStaging)?;

        if let Some(existing) = inner.tables.get(table_id) {
            if existing.kind != TableKind::Native {
                bail!(
                    ErrorKind::LoadFailed,
                    "Cannot replace a non-native table with a native staging table",
                    format!("table `{table_id}` exists as {}", existing.kind)
                );
            }
        }

        let rows = snapshot.rows().to_vec();
        let loaded = rows.len() as u64;
        inner.tables.insert(
            table_id.to_string(),
            MemoryTable {
                kind: TableKind::Native,
                schema: Some(snapshot.schema().clone()),
                rows,
                external: None,
            },
        );

        Ok(loaded)
    }

    async fn create_table_if_missing(
        &self,
        table_id: &str,
        schema: &TableSchema,
    ) -> SyncResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::CreateTable)?;

        if inner.tables.contains_key(table_id) {
            return Ok(false);
        }

        inner.tables.insert(
            table_id.to_string(),
            MemoryTable {
                kind: TableKind::Native,
                schema: Some(schema.clone()),
                rows: Vec::new(),
                external: None,
            },
        );

        Ok(true)
    }

    async fn seed_if_empty(
        &self,
        table_id: &str,
        _schema: &TableSchema,
        rows: Vec<TableRow>,
    ) -> SyncResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::Seed)?;

        let table = inner.tables.get_mut(table_id).ok_or_else(|| {
            sync_error!(
                ErrorKind::DestinationQueryFailed,
                "Cannot seed a table that does not exist",
                table_id
            )
        })?;

        if !table.rows.is_empty() {
            return Ok(0);
        }

        let seeded = rows.len() as u64;
        table.rows = rows;
        Ok(seeded)
    }

    async fn merge_into_curated(&self, spec: &MergeSpec) -> SyncResult<MergeStats> {
        let mut inner = self.inner.lock().await;
        inner.check_fail(FailableOp::Merge)?;

        for (role, table_id) in [
            ("staging", &spec.staging_table),
            ("dimension", &spec.dimension_table),
            ("curated", &spec.curated_table),
        ] {
            match inner.tables.get(table_id.as_str()) {
                Some(table) if table.kind == TableKind::Native => {}
                Some(table) => {
                    return Err(sync_error!(
                        ErrorKind::MergeFailed,
                        "Merge requires native tables",
                        format!("{role} table `{table_id}` is {}", table.kind)
                    ));
                }
                None => {
                    return Err(sync_error!(
                        ErrorKind::MergeFailed,
                        "Merge references a missing table",
                        format!("{role} table `{table_id}` does not exist")
                    ));
                }
            }
        }

        let staging_schema = inner.schema_of(&spec.staging_table)?;
        let dimension_schema = inner.schema_of(&spec.dimension_table)?;
        let curated_schema = inner.schema_of(&spec.curated_table)?;

        let staging_rows = inner.tables[spec.staging_table.as_str()].rows.clone();
        let dimension_rows = inner.tables[spec.dimension_table.as_str()].rows.clone();

        let key_index = curated_schema.index_of("transaction_id").ok_or_else(|| {
            sync_error!(
                ErrorKind::MergeFailed,
                "Curated table has no transaction_id column"
            )
        })?;

        let mut rows_affected = 0u64;
        let now = Utc::now();

        // Build the source set first: staging left-joined to the dimension.
        let mut source_rows = Vec::with_capacity(staging_rows.len());
        for row in &staging_rows {
            let customer_id = staging_schema.cell(row, "customer_id")?.clone();
            let (customer_name, country) =
                dimension_lookup(&dimension_schema, &dimension_rows, &customer_id)?;

            source_rows.push(TableRow::new(vec![
                staging_schema.cell(row, "transaction_id")?.clone(),
                customer_id,
                customer_name,
                country,
                staging_schema.cell(row, "amount")?.clone(),
                staging_schema.cell(row, "transaction_date")?.clone(),
                staging_schema.cell(row, "status")?.clone(),
                Cell::Timestamp(now),
            ]));
        }

        let curated = inner
            .tables
            .get_mut(spec.curated_table.as_str())
            .ok_or_else(|| {
                sync_error!(ErrorKind::MergeFailed, "Curated table disappeared mid-merge")
            })?;

        for source in source_rows {
            let key = source.values()[key_index].clone();
            let existing = curated
                .rows
                .iter_mut()
                .find(|row| row.values().get(key_index) == Some(&key));

            match existing {
                Some(target) => {
                    // Update only when a tracked field actually differs; an
                    // unconditional overwrite would churn timestamps and break
                    // re-run idempotency.
                    let changed = ["status", "customer_name", "amount"].iter().any(|column| {
                        let target_cell = curated_schema.cell(target, column).ok();
                        let source_cell = curated_schema.cell(&source, column).ok();
                        target_cell != source_cell
                    });

                    if changed {
                        let mut updated = target.values().to_vec();
                        for column in ["customer_name", "country", "amount", "status", "last_updated"]
                        {
                            if let Some(index) = curated_schema.index_of(column) {
                                updated[index] = source.values()[index].clone();
                            }
                        }
                        *target = TableRow::new(updated);
                        rows_affected += 1;
                    }
                }
                None => {
                    curated.rows.push(source);
                    rows_affected += 1;
                }
            }
        }

        info!(
            curated_table = %spec.curated_table,
            rows_affected,
            "applied merge in memory warehouse"
        );

        Ok(MergeStats { rows_affected })
    }
}
