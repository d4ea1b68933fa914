//! Pipeline orchestration: one run from version resolution to merge.

use metrics::counter;
use std::fmt;
use std::future::Future;
use tracing::{error, info};

use crate::error::SyncResult;
use crate::lake::LakeTable;
use crate::metrics::LAKESYNC_PIPELINE_RUNS_TOTAL;
use crate::warehouse::{MergeSpec, MergeStats, Warehouse};

mod bootstrap;
mod materialize;

pub use bootstrap::{bootstrap_reference_data, BootstrapReport, ReferenceTables};
pub use materialize::{
    BridgeLoadMaterializer, ExternalPointerMaterializer, MaterializeOutcome, Materializer,
};

/// The sequential steps of one pipeline run.
///
/// No step is re-entered after success; on failure the whole pipeline is
/// re-run from the top by the external retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    ResolveVersion,
    ReadSnapshot,
    RegisterOrLoad,
    BootstrapReference,
    Merge,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::ResolveVersion => "resolve_version",
            PipelineStep::ReadSnapshot => "read_snapshot",
            PipelineStep::RegisterOrLoad => "register_or_load",
            PipelineStep::BootstrapReference => "bootstrap_reference",
            PipelineStep::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Observability summary of a completed run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// The committed lake version this run synchronized.
    pub lake_version: i64,
    /// Rows materialized from the lake, when a snapshot was read.
    pub rows_read: Option<u64>,
    /// Rows loaded into staging, when the strategy loads rows.
    pub rows_loaded: Option<u64>,
    pub bootstrap: BootstrapReport,
    /// Merge outcome; absent when the strategy has no merge source.
    pub merge: Option<MergeStats>,
}

/// One-shot synchronization pipeline.
///
/// Sequences version resolution, snapshot reading, materialization, reference
/// bootstrap, and the merge. Strictly sequential: every step depends on its
/// predecessor's completed output, and the first failure halts the run.
pub struct SyncPipeline<W, M> {
    lake: LakeTable,
    warehouse: W,
    materializer: M,
    reference: ReferenceTables,
    merge: MergeSpec,
}

impl<W, M> SyncPipeline<W, M>
where
    W: Warehouse,
    M: Materializer<W>,
{
    pub fn new(
        lake: LakeTable,
        warehouse: W,
        materializer: M,
        reference: ReferenceTables,
        merge: MergeSpec,
    ) -> Self {
        Self {
            lake,
            warehouse,
            materializer,
            reference,
            merge,
        }
    }

    /// Runs the pipeline once, producing a report or the first fatal error.
    pub async fn run(&self) -> SyncResult<PipelineReport> {
        info!(
            warehouse = W::name(),
            strategy = M::name(),
            "starting synchronization run"
        );

        let result = self.run_steps().await;

        match &result {
            Ok(report) => {
                counter!(LAKESYNC_PIPELINE_RUNS_TOTAL, "outcome" => "success").increment(1);
                info!(
                    lake_version = report.lake_version,
                    rows_read = report.rows_read,
                    rows_loaded = report.rows_loaded,
                    merge_rows_affected = report.merge.map(|stats| stats.rows_affected),
                    "synchronization run completed"
                );
            }
            Err(_) => {
                counter!(LAKESYNC_PIPELINE_RUNS_TOTAL, "outcome" => "failed").increment(1);
            }
        }

        result
    }

    async fn run_steps(&self) -> SyncResult<PipelineReport> {
        let mut report = PipelineReport::default();

        report.lake_version = self
            .step(PipelineStep::ResolveVersion, self.lake.latest_version())
            .await?;

        let snapshot = if self.materializer.consumes_snapshot() {
            let snapshot = self
                .step(
                    PipelineStep::ReadSnapshot,
                    self.lake.read_snapshot(report.lake_version),
                )
                .await?;
            report.rows_read = Some(snapshot.row_count() as u64);
            Some(snapshot)
        } else {
            info!(
                step = %PipelineStep::ReadSnapshot,
                "skipped: strategy does not consume a snapshot"
            );
            None
        };

        let outcome = self
            .step(
                PipelineStep::RegisterOrLoad,
                self.materializer
                    .materialize(&self.warehouse, report.lake_version, snapshot.as_ref()),
            )
            .await?;
        report.rows_loaded = outcome.rows_loaded;

        report.bootstrap = self
            .step(
                PipelineStep::BootstrapReference,
                bootstrap_reference_data(&self.warehouse, &self.reference),
            )
            .await?;

        if self.materializer.supports_merge() {
            let merge = self
                .step(
                    PipelineStep::Merge,
                    self.warehouse.merge_into_curated(&self.merge),
                )
                .await
                .map_err(|err| {
                    // The merge is never retried in place; report what was
                    // attempted so the failure can be diagnosed without
                    // re-running.
                    error!(
                        staging_rows_attempted = report.rows_loaded,
                        error = %err,
                        "merge failed"
                    );
                    err
                })?;
            report.merge = Some(merge);
        } else {
            info!(
                step = %PipelineStep::Merge,
                "skipped: external registration is query-only and cannot feed a merge"
            );
        }

        Ok(report)
    }

    /// Runs one step, attributing any failure to it.
    async fn step<T>(
        &self,
        step: PipelineStep,
        operation: impl Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        info!(step = %step, "pipeline step starting");

        match operation.await {
            Ok(value) => {
                info!(step = %step, "pipeline step completed");
                Ok(value)
            }
            Err(err) => {
                error!(step = %step, error = %err, "pipeline step failed, halting run");
                counter!(
                    LAKESYNC_PIPELINE_RUNS_TOTAL,
                    "outcome" => "step_failed",
                    "step" => step.to_string()
                )
                .increment(1);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_render_snake_case_names() {
        assert_eq!(PipelineStep::ResolveVersion.to_string(), "resolve_version");
        assert_eq!(PipelineStep::RegisterOrLoad.to_string(), "register_or_load");
        assert_eq!(PipelineStep::Merge.to_string(), "merge");
    }
}
