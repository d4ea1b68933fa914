//! Shared configuration types for the synchronization service.

use serde::Deserialize;
use thiserror::Error;

mod lake;
mod pipeline;
mod warehouse;

pub use lake::{LakeConfig, LakeStorageConfig, LakeStorageConfigWithoutSecrets};
pub use pipeline::{ModeConfig, PipelineConfig, RetryConfig, SourceFormatConfig};
pub use warehouse::{WarehouseAuthConfig, WarehouseAuthConfigWithoutSecrets, WarehouseConfig};

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
    /// Retry attempts cannot be zero.
    #[error("`pipeline.retry.max_attempts` cannot be zero")]
    RetryAttemptsZero,
}

/// Top-level configuration of one synchronization service instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub lake: LakeConfig,
    pub warehouse: WarehouseConfig,
    pub pipeline: PipelineConfig,
}

impl RunnerConfig {
    /// Validates the whole configuration eagerly, before any network call.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.lake.validate()?;
        self.warehouse.validate()?;
        self.pipeline.validate()?;

        Ok(())
    }
}
