//! Lake storage configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Storage backend holding the lake table.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in serialized forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LakeStorageConfig {
    /// Azure Data Lake Storage Gen2 via shared-key authentication.
    Azure {
        /// Storage account name.
        account: String,
        /// Container holding the lake table.
        container: String,
        /// Storage account access key.
        access_key: SecretString,
    },
    /// Google Cloud Storage.
    Gcs {
        /// Bucket holding the lake table.
        bucket: String,
        /// Path to a service account key file; when absent, ambient
        /// credentials are used.
        service_account_key_path: Option<String>,
    },
    /// Local filesystem, for development runs against an exported table copy.
    Local {
        /// Directory treated as the storage root.
        root: String,
    },
}

/// Configuration of the lake table to synchronize from.
#[derive(Debug, Clone, Deserialize)]
pub struct LakeConfig {
    /// Storage backend and credentials.
    pub storage: LakeStorageConfig,
    /// Path of the lake table inside the storage root, e.g.
    /// `delta/transactions`.
    pub table_path: String,
}

impl LakeConfig {
    /// Validates that every required field is non-empty.
    ///
    /// Runs eagerly at startup so a misconfigured deployment fails before any
    /// network call.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table_path.is_empty() {
            return Err(ValidationError::EmptyField("lake.table_path"));
        }

        match &self.storage {
            LakeStorageConfig::Azure {
                account, container, ..
            } => {
                if account.is_empty() {
                    return Err(ValidationError::EmptyField("lake.storage.account"));
                }
                if container.is_empty() {
                    return Err(ValidationError::EmptyField("lake.storage.container"));
                }
            }
            LakeStorageConfig::Gcs { bucket, .. } => {
                if bucket.is_empty() {
                    return Err(ValidationError::EmptyField("lake.storage.bucket"));
                }
            }
            LakeStorageConfig::Local { root } => {
                if root.is_empty() {
                    return Err(ValidationError::EmptyField("lake.storage.root"));
                }
            }
        }

        Ok(())
    }

    /// Storage URI of the lake table, as external registrations reference it.
    pub fn table_uri(&self) -> String {
        match &self.storage {
            LakeStorageConfig::Azure { container, .. } => {
                format!("az://{container}/{}", self.table_path)
            }
            LakeStorageConfig::Gcs { bucket, .. } => {
                format!("gs://{bucket}/{}", self.table_path)
            }
            LakeStorageConfig::Local { root } => format!("{root}/{}", self.table_path),
        }
    }
}

/// Same as [`LakeStorageConfig`] but without secrets, safe to serialize into
/// logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LakeStorageConfigWithoutSecrets {
    Azure { account: String, container: String },
    Gcs { bucket: String },
    Local { root: String },
}

impl From<&LakeStorageConfig> for LakeStorageConfigWithoutSecrets {
    fn from(value: &LakeStorageConfig) -> Self {
        match value {
            LakeStorageConfig::Azure {
                account, container, ..
            } => LakeStorageConfigWithoutSecrets::Azure {
                account: account.clone(),
                container: container.clone(),
            },
            LakeStorageConfig::Gcs { bucket, .. } => LakeStorageConfigWithoutSecrets::Gcs {
                bucket: bucket.clone(),
            },
            LakeStorageConfig::Local { root } => {
                LakeStorageConfigWithoutSecrets::Local { root: root.clone() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn azure_config() -> LakeConfig {
        LakeConfig {
            storage: LakeStorageConfig::Azure {
                account: "lakeacct".to_string(),
                container: "datalake".to_string(),
                access_key: SecretString::new("key".to_string()),
            },
            table_path: "delta/transactions".to_string(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(azure_config().validate().is_ok());
    }

    #[test]
    fn empty_fields_fail_validation() {
        let mut config = azure_config();
        config.table_path = String::new();
        assert!(config.validate().is_err());

        let config = LakeConfig {
            storage: LakeStorageConfig::Gcs {
                bucket: String::new(),
                service_account_key_path: None,
            },
            table_path: "delta/transactions".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn table_uri_follows_the_backend_scheme() {
        assert_eq!(azure_config().table_uri(), "az://datalake/delta/transactions");

        let gcs = LakeConfig {
            storage: LakeStorageConfig::Gcs {
                bucket: "raw-dev".to_string(),
                service_account_key_path: None,
            },
            table_path: "delta/transactions".to_string(),
        };
        assert_eq!(gcs.table_uri(), "gs://raw-dev/delta/transactions");
    }
}
