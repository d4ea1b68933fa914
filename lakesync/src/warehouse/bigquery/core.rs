//! BigQuery implementation of the [`Warehouse`] operations.

use metrics::counter;
use tracing::info;

use crate::error::{ErrorKind, SyncResult};
use crate::lake::TableSnapshot;
use crate::metrics::{LAKESYNC_MERGE_ROWS_AFFECTED_TOTAL, LAKESYNC_STAGING_ROWS_LOADED_TOTAL};
use crate::sync_error;
use crate::types::{TableRow, TableSchema};
use crate::warehouse::bigquery::client::{BigQueryClient, BigQueryDatasetId};
use crate::warehouse::bigquery::encoding::{encode_row, sql_literal};
use crate::warehouse::{ExternalSource, MergeSpec, MergeStats, TableKind, Warehouse};

/// Rows per tabledata insert request during staging loads.
///
/// The insert API caps request payloads; chunking also bounds the blast radius
/// of a transient failure to one batch.
const INSERT_BATCH_ROWS: usize = 500;

/// Table type literal the information schema reports for native tables.
const TABLE_TYPE_NATIVE: &str = "BASE TABLE";
/// Table type literal the information schema reports for external tables.
const TABLE_TYPE_EXTERNAL: &str = "EXTERNAL";

/// A BigQuery-backed [`Warehouse`] scoped to one dataset.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: BigQueryClient,
    dataset_id: BigQueryDatasetId,
}

impl BigQueryWarehouse {
    pub fn new(client: BigQueryClient, dataset_id: BigQueryDatasetId) -> Self {
        Self { client, dataset_id }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// Renders the guarded seed insert: rows land only while the table is empty.
    ///
    /// The emptiness predicate lives inside the same statement as the insert,
    /// so two evaluations of "is it empty" can never race within a run.
    fn seed_statement(
        full_table_name: &str,
        schema: &TableSchema,
        rows: &[TableRow],
    ) -> SyncResult<String> {
        let column_names: Vec<&str> = schema
            .columns()
            .iter()
            .map(|column| column.name.as_str())
            .collect();

        let mut structs = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            if row.values().len() != column_names.len() {
                return Err(sync_error!(
                    ErrorKind::InvalidState,
                    "Seed row width does not match the table schema",
                    format!("row {row_index}")
                ));
            }

            let fields: Vec<String> = row
                .values()
                .iter()
                .zip(&column_names)
                .map(|(cell, name)| {
                    // Aliases on the first struct name the columns for UNNEST.
                    if row_index == 0 {
                        format!("{} as {name}", sql_literal(cell))
                    } else {
                        sql_literal(cell)
                    }
                })
                .collect();

            structs.push(format!("struct({})", fields.join(", ")));
        }

        Ok(format!(
            "insert into {full_table_name} ({columns}) \
             select * from unnest([{structs}]) \
             where not exists (select 1 from {full_table_name} limit 1)",
            columns = column_names.join(", "),
            structs = structs.join(", "),
        ))
    }

    /// Renders the change-aware merge from staging (joined to the dimension)
    /// into the curated table.
    ///
    /// Tracked fields compare with `is distinct from` so a null on either side
    /// still counts as a difference; amounts are cast to NUMERIC and dates
    /// truncated to calendar days inside the statement, mirroring how staging
    /// rows were normalized on the way in.
    fn merge_statement(staging: &str, dimension: &str, curated: &str) -> String {
        format!(
            "merge {curated} as target \
             using ( \
             select t.transaction_id, t.customer_id, c.customer_name, c.country, \
             cast(t.amount as numeric) as amount, \
             date(t.transaction_date) as transaction_date, \
             t.status, current_timestamp() as last_updated \
             from {staging} as t \
             left join {dimension} as c on t.customer_id = c.customer_id \
             ) as source \
             on target.transaction_id = source.transaction_id \
             when matched and ( \
             target.status is distinct from source.status \
             or target.customer_name is distinct from source.customer_name \
             or target.amount is distinct from source.amount \
             ) then update set \
             customer_name = source.customer_name, \
             country = source.country, \
             amount = source.amount, \
             status = source.status, \
             last_updated = source.last_updated \
             when not matched by target then insert ( \
             transaction_id, customer_id, customer_name, country, \
             amount, transaction_date, status, last_updated \
             ) values ( \
             source.transaction_id, source.customer_id, source.customer_name, source.country, \
             source.amount, source.transaction_date, source.status, source.last_updated \
             )"
        )
    }
}

impl Warehouse for BigQueryWarehouse {
    fn name() -> &'static str {
        "bigquery"
    }

    async fn table_kind(&self, table_id: &str) -> SyncResult<Option<TableKind>> {
        let table_type = self
            .client
            .table_type(&self.dataset_id, &table_id.to_string())
            .await?;

        Ok(table_type.map(|literal| match literal.as_str() {
            TABLE_TYPE_NATIVE => TableKind::Native,
            TABLE_TYPE_EXTERNAL => TableKind::External,
            _ => TableKind::Other,
        }))
    }

    async fn drop_table(&self, table_id: &str) -> SyncResult<()> {
        self.client
            .drop_table(&self.dataset_id, &table_id.to_string())
            .await
    }

    async fn register_external_table(
        &self,
        table_id: &str,
        source: &ExternalSource,
    ) -> SyncResult<()> {
        self.client
            .create_or_replace_external_table(
                &self.dataset_id,
                &table_id.to_string(),
                &source.location,
                source.format.as_ddl(),
                source.connection.as_deref(),
            )
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::LoadFailed,
                    "External table registration did not complete",
                    format!("table `{table_id}`: {err}")
                )
            })
    }

    async fn load_staging(&self, table_id: &str, snapshot: &TableSnapshot) -> SyncResult<u64> {
        let table_id = table_id.to_string();

        // Full-replace semantics: recreate the table, then stream the rows in.
        // A run that dies between the two leaves an empty staging table, which
        // the next run's replace makes whole again.
        self.client
            .create_or_replace_table(&self.dataset_id, &table_id, snapshot.schema())
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::LoadFailed,
                    "Staging table replace did not complete",
                    format!("table `{table_id}`: {err}")
                )
            })?;

        let mut encoded = Vec::with_capacity(snapshot.row_count());
        for row in snapshot.rows() {
            encoded.push(encode_row(snapshot.schema(), row)?);
        }

        for batch in encoded.chunks(INSERT_BATCH_ROWS) {
            self.client
                .insert_rows(&self.dataset_id, &table_id, batch)
                .await
                .map_err(|err| {
                    sync_error!(
                        ErrorKind::LoadFailed,
                        "Staging load did not complete",
                        format!("table `{table_id}`: {err}")
                    )
                })?;
        }

        let loaded = snapshot.row_count() as u64;
        counter!(LAKESYNC_STAGING_ROWS_LOADED_TOTAL, "table" => table_id.clone())
            .increment(loaded);
        info!(
            %table_id,
            rows = loaded,
            lake_version = snapshot.version(),
            "loaded snapshot into staging table"
        );

        Ok(loaded)
    }

    async fn create_table_if_missing(
        &self,
        table_id: &str,
        schema: &TableSchema,
    ) -> SyncResult<bool> {
        self.client
            .create_table_if_missing(&self.dataset_id, &table_id.to_string(), schema)
            .await
    }

    async fn seed_if_empty(
        &self,
        table_id: &str,
        schema: &TableSchema,
        rows: Vec<TableRow>,
    ) -> SyncResult<u64> {
        let full_table_name = self
            .client
            .full_table_name(&self.dataset_id, &table_id.to_string())?;
        let sql = Self::seed_statement(&full_table_name, schema, &rows)?;

        let response = self.client.query(sql).await?;
        let seeded = BigQueryClient::dml_affected_rows(&response);

        info!(table_id, rows = seeded, "seeded reference rows while table was empty");

        Ok(seeded)
    }

    async fn merge_into_curated(&self, spec: &MergeSpec) -> SyncResult<MergeStats> {
        let staging = self
            .client
            .full_table_name(&self.dataset_id, &spec.staging_table)?;
        let dimension = self
            .client
            .full_table_name(&self.dataset_id, &spec.dimension_table)?;
        let curated = self
            .client
            .full_table_name(&self.dataset_id, &spec.curated_table)?;

        let sql = Self::merge_statement(&staging, &dimension, &curated);

        // Executed without retry: staging may have been reloaded between
        // attempts, so a failed merge is only safe to re-run from the top of
        // the pipeline.
        let response = self.client.query_once(sql).await.map_err(|err| {
            sync_error!(
                ErrorKind::MergeFailed,
                "Merge statement errored or was rejected",
                format!("target {curated}, source {staging}: {err}")
            )
        })?;

        let rows_affected = BigQueryClient::dml_affected_rows(&response);
        counter!(LAKESYNC_MERGE_ROWS_AFFECTED_TOTAL, "table" => spec.curated_table.clone())
            .increment(rows_affected);
        info!(
            curated_table = %spec.curated_table,
            rows_affected,
            "merge applied"
        );

        Ok(MergeStats { rows_affected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{amount, customers_schema};
    use crate::types::Cell;
    use chrono::{TimeZone, Utc};

    #[test]
    fn merge_statement_shape() {
        let sql = BigQueryWarehouse::merge_statement(
            "`p.dw_dev.transactions_staging`",
            "`p.dw_dev.customers`",
            "`p.dw_dev.final_table`",
        );

        assert!(sql.starts_with("merge `p.dw_dev.final_table` as target"));
        assert!(sql.contains(
            "from `p.dw_dev.transactions_staging` as t \
             left join `p.dw_dev.customers` as c on t.customer_id = c.customer_id"
        ));
        assert!(sql.contains("on target.transaction_id = source.transaction_id"));
        assert!(sql.contains("target.status is distinct from source.status"));
        assert!(sql.contains("target.amount is distinct from source.amount"));
        assert!(sql.contains("cast(t.amount as numeric) as amount"));
        assert!(sql.contains("date(t.transaction_date) as transaction_date"));
        assert!(sql.contains("when not matched by target then insert"));
        // Additive-corrective only: the statement must not delete history.
        assert!(!sql.contains("when not matched by source"));
        assert!(!sql.contains("delete"));
    }

    #[test]
    fn seed_statement_guards_on_emptiness() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![
            TableRow::new(vec![
                Cell::from("CUST-A"),
                Cell::from("Alice Johnson"),
                Cell::from("alice@example.com"),
                Cell::from("Colombia"),
                Cell::Timestamp(timestamp),
            ]),
            TableRow::new(vec![
                Cell::from("CUST-B"),
                Cell::from("Bob Smith"),
                Cell::from("bob@example.com"),
                Cell::from("Mexico"),
                Cell::Timestamp(timestamp),
            ]),
        ];

        let sql = BigQueryWarehouse::seed_statement(
            "`p.dw_dev.customers`",
            &customers_schema(),
            &rows,
        )
        .unwrap();

        assert!(sql.starts_with(
            "insert into `p.dw_dev.customers` \
             (customer_id, customer_name, email, country, updated_at)"
        ));
        assert!(sql.contains("struct('CUST-A' as customer_id, 'Alice Johnson' as customer_name"));
        // Only the first struct aliases columns; later rows are positional.
        assert!(sql.contains("struct('CUST-B', 'Bob Smith'"));
        assert!(sql.ends_with(
            "where not exists (select 1 from `p.dw_dev.customers` limit 1)"
        ));
    }

    #[test]
    fn seed_statement_rejects_mismatched_rows() {
        let rows = vec![TableRow::new(vec![Cell::Numeric(amount("1.00"))])];
        let err = BigQueryWarehouse::seed_statement("`p.d.customers`", &customers_schema(), &rows)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
