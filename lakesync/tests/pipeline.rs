//! End-to-end pipeline runs against the in-memory lake and warehouse.

mod support;

use lakesync::error::ErrorKind;
use lakesync::tables::{self, amount, curated_schema};
use lakesync::types::Cell;
use lakesync::warehouse::memory::{FailableOp, MemoryWarehouse};
use lakesync::warehouse::TableKind;
use lakesync::warehouse::Warehouse;

use support::{bridge_pipeline, external_pipeline, txn, LakeFixture};

/// Seeds the fixture with the two-commit history the producer writes: an
/// initial overwrite and an incremental append.
async fn seed_two_versions(fixture: &LakeFixture) {
    fixture
        .data_file(
            "part-0000.json",
            &[
                txn("TXN-001", Some("CUST-A"), "150.00", "2024-01-15", "completed"),
                txn("TXN-002", Some("CUST-B"), "220.50", "2024-01-16", "completed"),
                txn("TXN-003", Some("CUST-A"), "89.99", "2024-01-17", "refunded"),
            ],
        )
        .await;
    fixture.commit_adds(0, &["part-0000.json"]).await;

    fixture
        .data_file(
            "part-0001.json",
            &[
                txn("TXN-006", Some("CUST-D"), "500.00", "2024-01-20", "completed"),
                txn("TXN-007", None, "75.25", "2024-01-21", "completed"),
            ],
        )
        .await;
    fixture.commit_adds(1, &["part-0001.json"]).await;
}

#[tokio::test]
async fn bridge_run_loads_staging_and_merges_with_enrichment() {
    let fixture = LakeFixture::new();
    seed_two_versions(&fixture).await;
    let warehouse = MemoryWarehouse::new();

    let report = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.lake_version, 1);
    assert_eq!(report.rows_read, Some(5));
    assert_eq!(report.rows_loaded, Some(5));
    assert_eq!(report.bootstrap.seeded_rows, 4);
    assert_eq!(report.merge.unwrap().rows_affected, 5);

    let curated = warehouse.table_rows(tables::CURATED_TABLE).await.unwrap();
    assert_eq!(curated.len(), 5);

    let schema = curated_schema();
    let row_for = |id: &str| {
        curated
            .iter()
            .find(|row| schema.cell(row, "transaction_id").unwrap().as_str() == Some(id))
            .unwrap()
            .clone()
    };

    // Dimension enrichment joined in by customer id.
    let enriched = row_for("TXN-001");
    assert_eq!(
        schema.cell(&enriched, "customer_name").unwrap().as_str(),
        Some("Alice Johnson")
    );
    assert_eq!(
        schema.cell(&enriched, "country").unwrap().as_str(),
        Some("Colombia")
    );
    assert_eq!(
        schema.cell(&enriched, "amount").unwrap().as_numeric(),
        Some(&amount("150.00"))
    );

    // A staging row with no dimension match keeps null enrichment, never dropped.
    let unmatched = row_for("TXN-007");
    assert!(schema.cell(&unmatched, "customer_name").unwrap().is_null());
    assert!(schema.cell(&unmatched, "country").unwrap().is_null());
}

#[tokio::test]
async fn rerunning_an_unchanged_source_is_idempotent() {
    let fixture = LakeFixture::new();
    seed_two_versions(&fixture).await;
    let warehouse = MemoryWarehouse::new();

    let first = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(first.merge.unwrap().rows_affected, 5);
    let staging_after_first = warehouse.table_rows(tables::STAGING_TABLE).await.unwrap();

    let second = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    // The full replace leaves the staging table byte-for-byte identical.
    let staging_after_second = warehouse.table_rows(tables::STAGING_TABLE).await.unwrap();
    assert_eq!(staging_after_first, staging_after_second);

    // Staging was fully replaced with identical content, the seed found a
    // populated dimension, and the merge saw no tracked field change.
    assert_eq!(second.rows_loaded, Some(5));
    assert_eq!(second.bootstrap.seeded_rows, 0);
    assert_eq!(second.merge.unwrap().rows_affected, 0);

    let dimension = warehouse.table_rows(tables::DIMENSION_TABLE).await.unwrap();
    assert_eq!(dimension.len(), 4);
    let curated = warehouse.table_rows(tables::CURATED_TABLE).await.unwrap();
    assert_eq!(curated.len(), 5);
}

#[tokio::test]
async fn changed_status_updates_only_the_matching_row() {
    let fixture = LakeFixture::new();
    seed_two_versions(&fixture).await;
    let warehouse = MemoryWarehouse::new();

    bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    let before = warehouse.table_rows(tables::CURATED_TABLE).await.unwrap();
    let schema = curated_schema();
    let stamp_of = |rows: &[lakesync::types::TableRow], id: &str| {
        rows.iter()
            .find(|row| schema.cell(row, "transaction_id").unwrap().as_str() == Some(id))
            .map(|row| schema.cell(row, "last_updated").unwrap().clone())
            .unwrap()
    };
    let untouched_stamp = stamp_of(&before, "TXN-002");

    // The producer replaces the first file with one where TXN-003 completed.
    fixture
        .data_file(
            "part-0002.json",
            &[
                txn("TXN-001", Some("CUST-A"), "150.00", "2024-01-15", "completed"),
                txn("TXN-002", Some("CUST-B"), "220.50", "2024-01-16", "completed"),
                txn("TXN-003", Some("CUST-A"), "89.99", "2024-01-17", "completed"),
            ],
        )
        .await;
    fixture
        .commit_raw(
            2,
            concat!(
                r#"{"remove":{"path":"part-0000.json"}}"#,
                "\n",
                r#"{"add":{"path":"part-0002.json"}}"#,
            ),
        )
        .await;

    let report = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.lake_version, 2);
    assert_eq!(report.merge.unwrap().rows_affected, 1);

    let after = warehouse.table_rows(tables::CURATED_TABLE).await.unwrap();
    assert_eq!(after.len(), 5);

    let updated = after
        .iter()
        .find(|row| schema.cell(row, "transaction_id").unwrap().as_str() == Some("TXN-003"))
        .unwrap();
    assert_eq!(
        schema.cell(updated, "status").unwrap().as_str(),
        Some("completed")
    );

    // Rows with unchanged tracked fields keep their original timestamps.
    assert_eq!(stamp_of(&after, "TXN-002"), untouched_stamp);
    assert_ne!(stamp_of(&after, "TXN-003"), stamp_of(&before, "TXN-003"));
}

#[tokio::test]
async fn missing_commit_log_fails_before_touching_the_warehouse() {
    let fixture = LakeFixture::new();
    let warehouse = MemoryWarehouse::new();

    let err = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoCommitsFound);
    assert!(warehouse.table_rows(tables::STAGING_TABLE).await.is_none());
    assert!(warehouse.table_rows(tables::CURATED_TABLE).await.is_none());
}

#[tokio::test]
async fn load_failure_halts_the_run_before_bootstrap() {
    let fixture = LakeFixture::new();
    seed_two_versions(&fixture).await;
    let warehouse = MemoryWarehouse::new();
    warehouse.fail_next(FailableOp::LoadStaging).await;

    let err = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    assert!(warehouse.table_rows(tables::DIMENSION_TABLE).await.is_none());
    assert!(warehouse.table_rows(tables::CURATED_TABLE).await.is_none());
}

#[tokio::test]
async fn external_mode_replaces_a_conflicting_native_table() {
    let fixture = LakeFixture::new();
    seed_two_versions(&fixture).await;
    let warehouse = MemoryWarehouse::new();

    // A previous bridge deployment left a native table at the federated name.
    warehouse
        .put_native_table(tables::EXTERNAL_TABLE, tables::transactions_schema())
        .await;

    let report = external_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.lake_version, 1);
    assert_eq!(report.rows_read, None);
    assert_eq!(report.rows_loaded, None);
    assert!(report.merge.is_none());

    assert_eq!(
        warehouse.table_kind(tables::EXTERNAL_TABLE).await.unwrap(),
        Some(TableKind::External)
    );
    let source = warehouse
        .external_source(tables::EXTERNAL_TABLE)
        .await
        .unwrap();
    assert!(source.location.ends_with("delta/transactions"));

    // Reference tables are bootstrapped, but nothing was merged into curated.
    let curated = warehouse.table_rows(tables::CURATED_TABLE).await.unwrap();
    assert!(curated.is_empty());
    assert_eq!(report.bootstrap.seeded_rows, 4);
}

#[tokio::test]
async fn bridge_mode_replaces_a_conflicting_external_table() {
    let fixture = LakeFixture::new();
    seed_two_versions(&fixture).await;
    let warehouse = MemoryWarehouse::new();

    // A previous federation deployment registered an external table where the
    // staging table must live.
    warehouse
        .register_external_table(
            tables::STAGING_TABLE,
            &lakesync::warehouse::ExternalSource {
                location: "az://datalake/delta/transactions".to_string(),
                format: lakesync::warehouse::SourceFormat::DeltaLake,
                connection: None,
            },
        )
        .await
        .unwrap();

    let report = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        warehouse.table_kind(tables::STAGING_TABLE).await.unwrap(),
        Some(TableKind::Native)
    );
    assert_eq!(report.merge.unwrap().rows_affected, 5);
}

#[tokio::test]
async fn null_amount_transition_triggers_an_update() {
    let fixture = LakeFixture::new();
    fixture
        .data_file(
            "part-0000.json",
            &[txn("TXN-001", Some("CUST-A"), "null", "2024-01-15", "pending")],
        )
        .await;
    fixture.commit_adds(0, &["part-0000.json"]).await;
    let warehouse = MemoryWarehouse::new();

    bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();

    // The amount arrives on a later version; the null-safe comparison must
    // treat null -> value as a change.
    fixture
        .data_file(
            "part-0001.json",
            &[txn("TXN-001", Some("CUST-A"), "150.00", "2024-01-15", "pending")],
        )
        .await;
    fixture
        .commit_raw(
            1,
            concat!(
                r#"{"remove":{"path":"part-0000.json"}}"#,
                "\n",
                r#"{"add":{"path":"part-0001.json"}}"#,
            ),
        )
        .await;

    let report = bridge_pipeline(&fixture, warehouse.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(report.merge.unwrap().rows_affected, 1);

    let schema = curated_schema();
    let curated = warehouse.table_rows(tables::CURATED_TABLE).await.unwrap();
    assert_eq!(
        schema.cell(&curated[0], "amount").unwrap(),
        &Cell::Numeric(amount("150.00"))
    );
}
