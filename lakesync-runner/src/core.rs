//! Assembly of one synchronization run from configuration.

use std::sync::Arc;
use std::time::Duration;

use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;
use secrecy::ExposeSecret;
use tracing::info;

use lakesync::lake::LakeTable;
use lakesync::pipeline::{
    BridgeLoadMaterializer, ExternalPointerMaterializer, PipelineReport, ReferenceTables,
    SyncPipeline,
};
use lakesync::retry::RetryPolicy;
use lakesync::tables;
use lakesync::warehouse::bigquery::{BigQueryClient, BigQueryWarehouse};
use lakesync::warehouse::{ExternalSource, MergeSpec, SourceFormat};
use lakesync_config::shared::{
    LakeStorageConfig, LakeStorageConfigWithoutSecrets, ModeConfig, RetryConfig, RunnerConfig,
    SourceFormatConfig, WarehouseAuthConfig, WarehouseAuthConfigWithoutSecrets,
};

use crate::error::RunnerResult;

// Statically dispatches pipeline construction per materialization strategy.
macro_rules! run_pipeline_dispatch {
    ($lake:expr, $warehouse:expr, $materializer:expr, $reference:expr, $merge:expr) => {{
        let pipeline = SyncPipeline::new($lake, $warehouse, $materializer, $reference, $merge);
        pipeline.run().await
    }};
}

/// Runs the pipeline once with the given configuration.
pub async fn run_syncer(config: RunnerConfig) -> RunnerResult<PipelineReport> {
    info!(
        lake = ?LakeStorageConfigWithoutSecrets::from(&config.lake.storage),
        table_path = %config.lake.table_path,
        project_id = %config.warehouse.project_id,
        dataset_id = %config.warehouse.dataset_id,
        auth = ?WarehouseAuthConfigWithoutSecrets::from(&config.warehouse.auth),
        "starting lakesync run"
    );

    let retry = retry_policy(&config.pipeline.retry);

    let store = build_object_store(&config.lake.storage)?;
    let lake = LakeTable::new(
        store,
        Path::from(config.lake.table_path.as_str()),
        tables::transactions_schema(),
        retry,
    );

    let client = build_bigquery_client(&config, retry).await?;
    let warehouse = BigQueryWarehouse::new(client, config.warehouse.dataset_id.clone());

    let reference = ReferenceTables {
        dimension_table: config.pipeline.dimension_table.clone(),
        curated_table: config.pipeline.curated_table.clone(),
        ..ReferenceTables::default()
    };

    let report = match &config.pipeline.mode {
        ModeConfig::ExternalPointer {
            table,
            source_format,
            connection,
            location,
        } => {
            let source = ExternalSource {
                location: location
                    .clone()
                    .unwrap_or_else(|| config.lake.table_uri()),
                format: source_format_from_config(*source_format),
                connection: connection.clone(),
            };
            let materializer = ExternalPointerMaterializer::new(table.clone(), source);
            let merge = merge_spec(&config, tables::STAGING_TABLE);

            run_pipeline_dispatch!(lake, warehouse, materializer, reference, merge)?
        }
        ModeConfig::BridgeLoad { table } => {
            let materializer = BridgeLoadMaterializer::new(table.clone());
            let merge = merge_spec(&config, table);

            run_pipeline_dispatch!(lake, warehouse, materializer, reference, merge)?
        }
    };

    Ok(report)
}

/// Maps the serde retry configuration onto the pipeline retry policy.
fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_attempts,
        initial_delay: Duration::from_millis(config.initial_delay_ms),
        max_delay: Duration::from_millis(config.max_delay_ms),
    }
}

fn source_format_from_config(format: SourceFormatConfig) -> SourceFormat {
    match format {
        SourceFormatConfig::Parquet => SourceFormat::Parquet,
        SourceFormatConfig::DeltaLake => SourceFormat::DeltaLake,
    }
}

fn merge_spec(config: &RunnerConfig, staging_table: &str) -> MergeSpec {
    MergeSpec {
        staging_table: staging_table.to_string(),
        dimension_table: config.pipeline.dimension_table.clone(),
        curated_table: config.pipeline.curated_table.clone(),
    }
}

/// Builds the object store the lake table lives in.
fn build_object_store(storage: &LakeStorageConfig) -> RunnerResult<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match storage {
        LakeStorageConfig::Azure {
            account,
            container,
            access_key,
        } => Arc::new(
            MicrosoftAzureBuilder::new()
                .with_account(account)
                .with_container_name(container)
                .with_access_key(access_key.expose_secret())
                .build()?,
        ),
        LakeStorageConfig::Gcs {
            bucket,
            service_account_key_path,
        } => {
            let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(bucket);
            if let Some(path) = service_account_key_path {
                builder = builder.with_service_account_path(path);
            }
            Arc::new(builder.build()?)
        }
        LakeStorageConfig::Local { root } => Arc::new(LocalFileSystem::new_with_prefix(root)?),
    };

    Ok(store)
}

/// Builds the BigQuery client with the configured authentication.
async fn build_bigquery_client(
    config: &RunnerConfig,
    retry: RetryPolicy,
) -> RunnerResult<BigQueryClient> {
    let project_id = config.warehouse.project_id.clone();

    let client = match &config.warehouse.auth {
        WarehouseAuthConfig::ServiceAccountKey { key } => {
            BigQueryClient::new_with_key(project_id, key.expose_secret(), retry).await?
        }
        WarehouseAuthConfig::ServiceAccountKeyPath { path } => {
            BigQueryClient::new_with_key_path(project_id, path, retry).await?
        }
        WarehouseAuthConfig::ApplicationDefault => {
            BigQueryClient::new_with_adc(project_id, retry).await?
        }
    };

    Ok(client)
}
