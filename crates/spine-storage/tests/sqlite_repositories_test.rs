//! Integration tests for `SqliteStore` repositories that have no exercising
//! caller in `spine-core` (the execution/work-item/lock/DLQ paths are
//! already driven end to end through real sqlite pools in
//! `spine-core`'s `ledger`/`queue`/`concurrency`/`dlq`/`dispatcher`/
//! `scheduler` test modules). These run against an in-memory sqlite
//! database bootstrapped with the real migration set — no mocks.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;

use spine_contracts::{
    Alert, AlertChannel, AnomalyRow, ExecutionStatus, ManifestRow, QualityResultSummary, RejectRow,
};
use spine_storage::{
    AlertRepository, AnomalyRepository, ExecutionRepository, ManifestRepository, PageSlice,
    QualityRepository, RejectRepository, SqliteStore,
};

async fn store() -> SqliteStore {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    spine_storage::schema::bootstrap_sqlite(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[tokio::test]
async fn manifest_upsert_on_conflict_overwrites_row_count_not_identity() {
    let store = store().await;
    let partition = json!({"week_ending": "2025-12-22", "tier": "OTC"});
    let row = ManifestRow {
        domain: "otc_ats".into(),
        partition_key: partition.clone(),
        stage: "raw".into(),
        stage_rank: 1,
        row_count: 100,
        execution_id: new_id(),
        batch_id: Some("batch-1".into()),
        updated_at: Utc::now(),
    };
    store.upsert(&row).await.unwrap();

    // Same (domain, partition_key, stage) key — row_count advances in place.
    let row2 = ManifestRow {
        row_count: 150,
        stage_rank: 2,
        ..row.clone()
    };
    store.upsert(&row2).await.unwrap();

    let fetched = store
        .get("otc_ats", &partition, "raw")
        .await
        .unwrap()
        .expect("manifest row exists");
    assert_eq!(fetched.row_count, 150);
    assert_eq!(fetched.stage_rank, 2);

    let (rows, total) = ManifestRepository::list_by_domain(&store, "otc_ats", PageSlice::default()).await.unwrap();
    assert_eq!(total, 1, "upsert never creates a second row for the same key");
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn manifest_get_on_missing_key_is_none_not_error() {
    let store = store().await;
    let missing = store
        .get("otc_ats", &json!({"week_ending": "2099-01-01"}), "raw")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn reject_rows_are_append_only_and_list_newest_first() {
    let store = store().await;
    let exec_id = new_id();
    for (i, code) in ["SCHEMA_MISMATCH", "NULL_KEY", "DUPLICATE"].iter().enumerate() {
        let row = RejectRow {
            domain: "otc_ats".into(),
            partition_key: json!({"week_ending": "2025-12-22"}),
            stage: "raw".into(),
            reason_code: (*code).into(),
            reason_detail: Some(format!("detail {i}")),
            raw_json: json!({"row": i}),
            execution_id: exec_id.clone(),
            created_at: Utc::now() + chrono::Duration::seconds(i as i64),
        };
        RejectRepository::insert(&store, &row).await.unwrap();
    }

    let (rows, total) = RejectRepository::list_by_domain(&store, "otc_ats", PageSlice::default()).await.unwrap();
    assert_eq!(total, 3);
    // spec.md §4.2: rejects ordered by created_at DESC.
    assert_eq!(rows[0].reason_code, "DUPLICATE");
    assert_eq!(rows[2].reason_code, "SCHEMA_MISMATCH");
}

#[tokio::test]
async fn quality_aggregate_scopes_to_workflow_and_orders_latest_first() {
    let store = store().await;
    let earlier = QualityResultSummary {
        workflow: "wf-a".into(),
        checks_passed: 8,
        checks_failed: 2,
        score: 0.8,
        run_at: Utc::now(),
    };
    let later = QualityResultSummary {
        run_at: earlier.run_at + chrono::Duration::seconds(5),
        checks_passed: 10,
        checks_failed: 0,
        score: 1.0,
        ..earlier.clone()
    };
    store.record(&earlier).await.unwrap();
    store.record(&later).await.unwrap();
    store
        .record(&QualityResultSummary {
            workflow: "wf-b".into(),
            ..earlier.clone()
        })
        .await
        .unwrap();

    let rows = store.aggregate_by_workflow("wf-a").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].score, 1.0, "most recent run_at first");
    assert_eq!(rows[1].score, 0.8);
}

#[tokio::test]
async fn anomalies_are_append_only_and_scoped_by_domain() {
    let store = store().await;
    let row = AnomalyRow {
        id: new_id(),
        domain: "otc_ats".into(),
        anomaly_type: "ROW_COUNT_SPIKE".into(),
        detail: json!({"expected": 1000, "actual": 50000}),
        severity: "HIGH".into(),
        created_at: Utc::now(),
    };
    AnomalyRepository::insert(&store, &row).await.unwrap();
    AnomalyRepository::insert(
        &store,
        &AnomalyRow {
            id: new_id(),
            domain: "other_domain".into(),
            ..row.clone()
        },
    )
    .await
    .unwrap();

    let (rows, total) = AnomalyRepository::list_by_domain(&store, "otc_ats", PageSlice::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].anomaly_type, "ROW_COUNT_SPIKE");
}

#[tokio::test]
async fn alert_channel_and_alert_round_trip() {
    let store = store().await;
    let channel = AlertChannel {
        id: new_id(),
        name: "pagerduty-oncall".into(),
        channel_type: "pagerduty".into(),
        config: json!({"routing_key": "abc123"}),
        enabled: true,
        created_at: Utc::now(),
    };
    let created = store.create_channel(&channel).await.unwrap();
    assert_eq!(created.name, "pagerduty-oncall");

    let channels = store.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);

    let alert = Alert {
        id: new_id(),
        domain: "otc_ats".into(),
        severity: "CRITICAL".into(),
        message: "ingest stalled".into(),
        detail: json!({"lag_minutes": 45}),
        created_at: Utc::now(),
    };
    store.insert_alert(&alert).await.unwrap();

    let (alerts, total) = store
        .list_alerts(Some("otc_ats"), PageSlice::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(alerts[0].message, "ingest stalled");

    let (none, none_total) = store
        .list_alerts(Some("unrelated_domain"), PageSlice::default())
        .await
        .unwrap();
    assert_eq!(none_total, 0);
    assert!(none.is_empty());
}

#[tokio::test]
async fn list_executions_pagination_reports_total_independent_of_limit() {
    use spine_contracts::{Execution, TriggerSource};

    let store = store().await;
    for i in 0..5 {
        let now = Utc::now();
        let exec = Execution {
            id: Execution::new_id(),
            workflow: "wf-paged".into(),
            params: json!({"i": i}),
            status: ExecutionStatus::Pending,
            lane: "default".into(),
            trigger_source: TriggerSource::Api,
            parent_execution_id: None,
            idempotency_key: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        store.create_execution(&exec).await.unwrap();
    }

    let (page1, total) = store
        .list_executions(Some("wf-paged"), None, None, PageSlice { limit: 2, offset: 0 })
        .await
        .unwrap();
    assert_eq!(total, 5, "total reflects the full matching set, not the page");
    assert_eq!(page1.len(), 2);

    let (page2, total2) = store
        .list_executions(Some("wf-paged"), None, None, PageSlice { limit: 2, offset: 4 })
        .await
        .unwrap();
    assert_eq!(total2, 5);
    assert_eq!(page2.len(), 1, "last page holds the remainder");

    let (filtered, filtered_total) = store
        .list_executions(Some("no_such_workflow"), None, None, PageSlice::default())
        .await
        .unwrap();
    assert_eq!(filtered_total, 0);
    assert!(filtered.is_empty());
}
