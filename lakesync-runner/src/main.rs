//! lakesync runner service binary.
//!
//! Loads configuration, initializes telemetry, runs one synchronization pass
//! from the lake table into the warehouse, and exits non-zero on any fatal
//! failure. Retries are external: re-running the binary is safe because the
//! pipeline's staging replace, guarded seed, and change-aware merge are all
//! idempotent.

use std::process::ExitCode;

use lakesync_config::Environment;
use lakesync_telemetry::metrics::init_metrics;
use lakesync_telemetry::tracing::init_tracing;
use tracing::info;

use crate::config::load_runner_config;
use crate::core::run_syncer;
use crate::error::{RunnerError, RunnerResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Tracing may not be installed yet, so the report goes to stderr
            // directly.
            eprintln!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> RunnerResult<()> {
    let runner_config = load_runner_config()?;

    let environment = Environment::load().map_err(RunnerError::config)?;
    let json_output = environment == Environment::Prod;

    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), json_output).map_err(RunnerError::telemetry)?;

    init_metrics(Some(environment.as_str())).map_err(RunnerError::telemetry)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RunnerError::config)?
        .block_on(async_main(runner_config))
}

async fn async_main(runner_config: lakesync_config::shared::RunnerConfig) -> RunnerResult<()> {
    let report = run_syncer(runner_config).await?;

    info!(
        lake_version = report.lake_version,
        rows_read = report.rows_read,
        rows_loaded = report.rows_loaded,
        seeded_rows = report.bootstrap.seeded_rows,
        merge_rows_affected = report.merge.map(|stats| stats.rows_affected),
        "lakesync run finished"
    );

    Ok(())
}
