//! Configuration loading for the runner.

use lakesync_config::load_config;
use lakesync_config::shared::RunnerConfig;

use crate::error::{RunnerError, RunnerResult};

/// Loads and validates the runner configuration.
///
/// Validation runs eagerly so a misconfigured deployment fails before any
/// storage or warehouse call.
pub fn load_runner_config() -> RunnerResult<RunnerConfig> {
    let config = load_config::<RunnerConfig>().map_err(RunnerError::config)?;
    config.validate().map_err(RunnerError::config)?;

    Ok(config)
}
