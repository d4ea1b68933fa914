//! Shared fixtures: an in-memory lake table and pipeline assembly helpers.

use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

use lakesync::lake::LakeTable;
use lakesync::pipeline::{
    BridgeLoadMaterializer, ExternalPointerMaterializer, ReferenceTables, SyncPipeline,
};
use lakesync::retry::RetryPolicy;
use lakesync::tables;
use lakesync::warehouse::memory::MemoryWarehouse;
use lakesync::warehouse::{ExternalSource, MergeSpec, SourceFormat};

pub const LAKE_ROOT: &str = "delta/transactions";

/// An in-memory lake table under [`LAKE_ROOT`] that tests write commits into.
pub struct LakeFixture {
    pub store: Arc<InMemory>,
}

impl LakeFixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }

    async fn put(&self, path: String, body: String) {
        self.store
            .put(&Path::from(path), PutPayload::from(body))
            .await
            .expect("in-memory put cannot fail");
    }

    /// Writes a commit entry whose records add the given data files.
    pub async fn commit_adds(&self, version: i64, files: &[&str]) {
        let body = files
            .iter()
            .map(|file| format!(r#"{{"add":{{"path":"{file}"}}}}"#))
            .collect::<Vec<_>>()
            .join("\n");
        self.commit_raw(version, &body).await;
    }

    /// Writes a commit entry with an arbitrary NDJSON body.
    pub async fn commit_raw(&self, version: i64, body: &str) {
        self.put(
            format!("{LAKE_ROOT}/_delta_log/{version:020}.json"),
            body.to_string(),
        )
        .await;
    }

    /// Writes a data file of NDJSON transaction rows.
    pub async fn data_file(&self, file: &str, rows: &[String]) {
        self.put(format!("{LAKE_ROOT}/{file}"), rows.join("\n")).await;
    }

    pub fn lake_table(&self) -> LakeTable {
        LakeTable::new(
            self.store.clone(),
            Path::from(LAKE_ROOT),
            tables::transactions_schema(),
            RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
        )
    }
}

/// Renders one NDJSON transaction row.
pub fn txn(id: &str, customer: Option<&str>, amount: &str, date: &str, status: &str) -> String {
    let customer = match customer {
        Some(customer) => format!(r#""{customer}""#),
        None => "null".to_string(),
    };
    format!(
        r#"{{"transaction_id":"{id}","customer_id":{customer},"amount":{amount},"transaction_date":"{date}","status":"{status}"}}"#
    )
}

/// Assembles a bridge-load pipeline over the fixture and warehouse.
pub fn bridge_pipeline(
    fixture: &LakeFixture,
    warehouse: MemoryWarehouse,
) -> SyncPipeline<MemoryWarehouse, BridgeLoadMaterializer> {
    SyncPipeline::new(
        fixture.lake_table(),
        warehouse,
        BridgeLoadMaterializer::new(tables::STAGING_TABLE),
        ReferenceTables::default(),
        MergeSpec::default(),
    )
}

/// Assembles an external-pointer pipeline over the fixture and warehouse.
pub fn external_pipeline(
    fixture: &LakeFixture,
    warehouse: MemoryWarehouse,
) -> SyncPipeline<MemoryWarehouse, ExternalPointerMaterializer> {
    SyncPipeline::new(
        fixture.lake_table(),
        warehouse,
        ExternalPointerMaterializer::new(
            tables::EXTERNAL_TABLE,
            ExternalSource {
                location: format!("az://datalake/{LAKE_ROOT}"),
                format: SourceFormat::DeltaLake,
                connection: Some("348306483800.azure-eastus2.adls-conn".to_string()),
            },
        ),
        ReferenceTables::default(),
        MergeSpec::default(),
    )
}
