//! Warehouse (BigQuery) configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// How the warehouse client authenticates.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseAuthConfig {
    /// Inline service account key JSON.
    ServiceAccountKey { key: SecretString },
    /// Path to a service account key file.
    ServiceAccountKeyPath { path: String },
    /// Application Default Credentials from the environment.
    ApplicationDefault,
}

/// Configuration of the warehouse the pipeline writes into.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Cloud project identifier.
    pub project_id: String,
    /// Dataset holding the staging, dimension, and curated tables.
    pub dataset_id: String,
    /// Authentication material.
    pub auth: WarehouseAuthConfig,
}

impl WarehouseConfig {
    /// Validates that every required field is non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.is_empty() {
            return Err(ValidationError::EmptyField("warehouse.project_id"));
        }
        if self.dataset_id.is_empty() {
            return Err(ValidationError::EmptyField("warehouse.dataset_id"));
        }
        if let WarehouseAuthConfig::ServiceAccountKeyPath { path } = &self.auth {
            if path.is_empty() {
                return Err(ValidationError::EmptyField("warehouse.auth.path"));
            }
        }

        Ok(())
    }
}

/// Same as [`WarehouseAuthConfig`] but without secrets, safe to serialize into
/// logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseAuthConfigWithoutSecrets {
    ServiceAccountKey,
    ServiceAccountKeyPath { path: String },
    ApplicationDefault,
}

impl From<&WarehouseAuthConfig> for WarehouseAuthConfigWithoutSecrets {
    fn from(value: &WarehouseAuthConfig) -> Self {
        match value {
            WarehouseAuthConfig::ServiceAccountKey { .. } => {
                WarehouseAuthConfigWithoutSecrets::ServiceAccountKey
            }
            WarehouseAuthConfig::ServiceAccountKeyPath { path } => {
                WarehouseAuthConfigWithoutSecrets::ServiceAccountKeyPath { path: path.clone() }
            }
            WarehouseAuthConfig::ApplicationDefault => {
                WarehouseAuthConfigWithoutSecrets::ApplicationDefault
            }
        }
    }
}
