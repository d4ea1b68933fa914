//! Metric name constants for the synchronization pipeline.

/// Counter: rows loaded into the staging table, labeled by table.
pub const LAKESYNC_STAGING_ROWS_LOADED_TOTAL: &str = "lakesync_staging_rows_loaded_total";

/// Counter: rows affected by the merge statement, labeled by table.
pub const LAKESYNC_MERGE_ROWS_AFFECTED_TOTAL: &str = "lakesync_merge_rows_affected_total";

/// Counter: warehouse query retries, labeled by error code.
pub const LAKESYNC_WAREHOUSE_QUERY_RETRIES_TOTAL: &str = "lakesync_warehouse_query_retries_total";

/// Counter: pipeline runs, labeled by outcome (`success` / `failed`) and failing step.
pub const LAKESYNC_PIPELINE_RUNS_TOTAL: &str = "lakesync_pipeline_runs_total";

/// Histogram: rows materialized per snapshot read.
pub const LAKESYNC_SNAPSHOT_ROWS: &str = "lakesync_snapshot_rows";
