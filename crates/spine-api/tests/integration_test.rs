// Integration tests for the spine-api REST facade.
// Run with: cargo test --test integration_test -- --ignored
// Requires a running `spine-api` instance at SPINE_API_TEST_URL (default
// below) backed by an empty or disposable database.

use serde_json::json;
use spine_contracts::{DataResponse, DatabaseHealthResponse, Execution, ListResponse, Schedule, SubmitRunResponse};

const API_BASE_URL: &str = "http://localhost:9100";

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_database_health() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{API_BASE_URL}/database/health"))
        .send()
        .await
        .expect("failed to call /database/health");

    assert_eq!(response.status(), 200);
    let body: DatabaseHealthResponse = response.json().await.expect("failed to parse health response");
    assert!(body.connected);
}

#[tokio::test]
#[ignore]
async fn test_openapi_spec() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{API_BASE_URL}/api-doc/openapi.json"))
        .send()
        .await
        .expect("failed to fetch openapi spec");

    assert_eq!(response.status(), 200);
    let spec: serde_json::Value = response.json().await.expect("failed to parse openapi spec");
    assert_eq!(spec["info"]["title"], "Spine Core API");
}

#[tokio::test]
#[ignore]
async fn test_submit_and_inspect_run() {
    let client = reqwest::Client::new();

    let submit_response = client
        .post(format!("{API_BASE_URL}/runs"))
        .json(&json!({
            "kind": "task",
            "name": "noop",
            "params": {},
        }))
        .send()
        .await
        .expect("failed to submit run");

    assert_eq!(submit_response.status(), 202);
    let submitted: SubmitRunResponse = submit_response.json().await.expect("failed to parse submit response");
    assert!(!submitted.run_id.is_empty());

    let get_response = client
        .get(format!("{API_BASE_URL}/runs/{}", submitted.run_id))
        .send()
        .await
        .expect("failed to fetch run");
    assert_eq!(get_response.status(), 200);

    let events_response = client
        .get(format!("{API_BASE_URL}/runs/{}/events", submitted.run_id))
        .send()
        .await
        .expect("failed to fetch run events");
    assert_eq!(events_response.status(), 200);

    let list_response = client
        .get(format!("{API_BASE_URL}/runs?limit=10"))
        .send()
        .await
        .expect("failed to list runs");
    assert_eq!(list_response.status(), 200);
    let page: ListResponse<Execution> = list_response.json().await.expect("failed to parse run list");
    assert!(page.data.iter().any(|e| e.id == submitted.run_id));
}

#[tokio::test]
#[ignore]
async fn test_unknown_run_returns_404() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{API_BASE_URL}/runs/does-not-exist"))
        .send()
        .await
        .expect("failed to call /runs/:id");

    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore]
async fn test_schedule_crud() {
    let client = reqwest::Client::new();

    let create_response = client
        .post(format!("{API_BASE_URL}/schedules"))
        .json(&json!({
            "name": "noop-every-5-minutes",
            "target_type": "workflow",
            "target_name": "noop",
            "cron_expression": "*/5 * * * *",
            "timezone": "UTC",
            "enabled": true,
        }))
        .send()
        .await
        .expect("failed to create schedule");

    assert_eq!(create_response.status(), 201);
    let schedule: Schedule = create_response
        .json::<DataResponse<Schedule>>()
        .await
        .expect("failed to parse schedule")
        .data;

    let get_response = client
        .get(format!("{API_BASE_URL}/schedules/{}", schedule.id))
        .send()
        .await
        .expect("failed to fetch schedule");
    assert_eq!(get_response.status(), 200);

    let delete_response = client
        .delete(format!("{API_BASE_URL}/schedules/{}", schedule.id))
        .send()
        .await
        .expect("failed to delete schedule");
    assert_eq!(delete_response.status(), 204);
}
