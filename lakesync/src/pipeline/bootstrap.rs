//! Reference-data bootstrap: dimension and curated tables exist before the merge.

use tracing::info;

use crate::error::SyncResult;
use crate::tables;
use crate::types::{TableRow, TableSchema};
use crate::warehouse::Warehouse;

/// Tables the bootstrap step guarantees to exist, plus the dimension seed.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    pub dimension_table: String,
    pub dimension_schema: TableSchema,
    /// Rows seeded into the dimension table only while it is empty.
    pub seed_rows: Vec<TableRow>,
    pub curated_table: String,
    pub curated_schema: TableSchema,
}

impl Default for ReferenceTables {
    fn default() -> Self {
        Self {
            dimension_table: tables::DIMENSION_TABLE.to_string(),
            dimension_schema: tables::customers_schema(),
            seed_rows: tables::reference_customers(),
            curated_table: tables::CURATED_TABLE.to_string(),
            curated_schema: tables::curated_schema(),
        }
    }
}

/// What the bootstrap actually did on this run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapReport {
    pub dimension_created: bool,
    pub curated_created: bool,
    /// Zero whenever the dimension already held rows.
    pub seeded_rows: u64,
}

/// Idempotently ensures the dimension and curated tables exist, seeding the
/// dimension once.
///
/// Both creates are `if not exists` and never destructive; the seed is guarded
/// by an emptiness predicate inside the insert statement itself, so re-running
/// with existing rows is a guaranteed no-op.
pub async fn bootstrap_reference_data<W: Warehouse>(
    warehouse: &W,
    reference: &ReferenceTables,
) -> SyncResult<BootstrapReport> {
    let dimension_created = warehouse
        .create_table_if_missing(&reference.dimension_table, &reference.dimension_schema)
        .await?;

    let seeded_rows = warehouse
        .seed_if_empty(
            &reference.dimension_table,
            &reference.dimension_schema,
            reference.seed_rows.clone(),
        )
        .await?;

    let curated_created = warehouse
        .create_table_if_missing(&reference.curated_table, &reference.curated_schema)
        .await?;

    info!(
        dimension_table = %reference.dimension_table,
        curated_table = %reference.curated_table,
        dimension_created,
        curated_created,
        seeded_rows,
        "reference tables bootstrapped"
    );

    Ok(BootstrapReport {
        dimension_created,
        curated_created,
        seeded_rows,
    })
}
