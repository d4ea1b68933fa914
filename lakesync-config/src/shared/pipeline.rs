//! Pipeline mode, table naming, and retry configuration.

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Declared format of the files behind an external registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormatConfig {
    Parquet,
    DeltaLake,
}

/// Which materialization strategy the run uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeConfig {
    /// Register an external pointer to lake storage; query-only, no merge.
    ExternalPointer {
        /// Name of the external registration.
        #[serde(default = "default_external_table")]
        table: String,
        /// Declared source format of the registration.
        source_format: SourceFormatConfig,
        /// Warehouse connection used to reach the storage provider, when the
        /// provider requires one.
        connection: Option<String>,
        /// Storage URI override; derived from the lake configuration when
        /// absent.
        location: Option<String>,
    },
    /// Read the lake table directly and full-replace the native staging table.
    BridgeLoad {
        /// Name of the staging table.
        #[serde(default = "default_staging_table")]
        table: String,
    },
}

fn default_external_table() -> String {
    "transactions_federated".to_string()
}

fn default_staging_table() -> String {
    "transactions_staging".to_string()
}

fn default_dimension_table() -> String {
    "customers".to_string()
}

fn default_curated_table() -> String {
    "final_table".to_string()
}

/// Bounded retry for transient I/O failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
        }
    }
}

/// Pipeline-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Materialization strategy.
    pub mode: ModeConfig,
    /// Dimension table name.
    #[serde(default = "default_dimension_table")]
    pub dimension_table: String,
    /// Curated table name.
    #[serde(default = "default_curated_table")]
    pub curated_table: String,
    /// Retry policy for lake reads and staging loads.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PipelineConfig {
    /// Validates table names and retry bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dimension_table.is_empty() {
            return Err(ValidationError::EmptyField("pipeline.dimension_table"));
        }
        if self.curated_table.is_empty() {
            return Err(ValidationError::EmptyField("pipeline.curated_table"));
        }
        match &self.mode {
            ModeConfig::ExternalPointer { table, .. } | ModeConfig::BridgeLoad { table } => {
                if table.is_empty() {
                    return Err(ValidationError::EmptyField("pipeline.mode.table"));
                }
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::RetryAttemptsZero);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_config() -> PipelineConfig {
        PipelineConfig {
            mode: ModeConfig::BridgeLoad {
                table: default_staging_table(),
            },
            dimension_table: default_dimension_table(),
            curated_table: default_curated_table(),
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(bridge_config().validate().is_ok());
    }

    #[test]
    fn zero_retry_attempts_are_rejected() {
        let mut config = bridge_config();
        config.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::RetryAttemptsZero)
        ));
    }

    #[test]
    fn mode_deserializes_from_snake_case() {
        let yaml = r#"
mode:
  bridge_load:
    table: transactions_staging
"#;
        let config: PipelineConfig = serde_yaml_like(yaml);
        assert!(matches!(config.mode, ModeConfig::BridgeLoad { .. }));
    }

    /// Deserializes through the `config` crate the way `load_config` does.
    fn serde_yaml_like(yaml: &str) -> PipelineConfig {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
