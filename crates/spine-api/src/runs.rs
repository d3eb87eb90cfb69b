//! `/runs` endpoint family (spec.md §6): submit, list, inspect, cancel,
//! and retry executions.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use spine_contracts::{
    DataResponse, Execution, ExecutionEvent, ExecutionStatus, ListResponse, RetryFailedWorkItemsRequest,
    RetryFailedWorkItemsResponse, SubmitRunRequest, SubmitRunResponse, TriggerSource,
};
use spine_storage::PageSlice;

use crate::common::{ApiError, ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/runs", get(list_runs).post(create_run))
        .route("/runs/:id", get(get_run))
        .route("/runs/:id/events", get(list_run_events))
        .route("/runs/:id/cancel", post(cancel_run))
        .route("/runs/:id/retry", post(retry_run))
        .route("/runs/retry-failed", post(retry_failed_work_items))
        .with_state(state)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListRunsParams {
    pub workflow: Option<String>,
    pub status: Option<String>,
    pub lane: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// `POST /runs` — submit an operation (spec.md §6). 202 on fresh
/// dispatch; the same body twice with the same `idempotency_key` still
/// returns 202 with the cached `run_id` rather than 409 — the idempotency
/// *conflict* status named in the spec's error taxonomy refers to a key
/// reused with incompatible params, which this tier does not detect, so
/// the dispatcher's cache-hit path is surfaced as a normal success.
#[utoipa::path(
    post,
    path = "/runs",
    request_body = SubmitRunRequest,
    responses(
        (status = 202, description = "Run submitted", body = SubmitRunResponse),
        (status = 404, description = "Unknown operation"),
    ),
    tag = "runs"
)]
pub async fn create_run(State(state): State<AppState>, Json(body): Json<SubmitRunRequest>) -> ApiResult<Json<SubmitRunResponse>> {
    let trigger = match body.kind.as_str() {
        "task" | "operation" => TriggerSource::Api,
        other => return Err(ApiError::new(spine_contracts::ErrorCategory::Validation, format!("unknown run kind '{other}'"))),
    };
    let execution = state
        .dispatcher
        .submit(&body.name, body.params, "default", trigger, None, body.idempotency_key)
        .await?;
    Ok(Json(SubmitRunResponse { run_id: execution.id }))
}

/// `GET /runs` — paged list, `{data:[...], page:{...}}` (spec.md §6).
#[utoipa::path(
    get,
    path = "/runs",
    params(ListRunsParams),
    responses((status = 200, description = "Paged executions", body = ListResponse<Execution>)),
    tag = "runs"
)]
pub async fn list_runs(State(state): State<AppState>, Query(params): Query<ListRunsParams>) -> ApiResult<Json<ListResponse<Execution>>> {
    let status = params
        .status
        .as_deref()
        .map(|s| s.parse::<ExecutionStatus>())
        .transpose()
        .map_err(|e| ApiError::new(spine_contracts::ErrorCategory::Validation, e))?;
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state
        .ledger
        .list(params.workflow.as_deref(), status, params.lane.as_deref(), page)
        .await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}

#[utoipa::path(
    get,
    path = "/runs/{id}",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution", body = DataResponse<Execution>),
        (status = 404, description = "Not found"),
    ),
    tag = "runs"
)]
pub async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<DataResponse<Execution>>> {
    Ok(Json(DataResponse::new(state.ledger.get(&id).await?)))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListEventsParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[utoipa::path(
    get,
    path = "/runs/{id}/events",
    params(("id" = String, Path, description = "Execution id"), ListEventsParams),
    responses((status = 200, description = "Event log", body = ListResponse<ExecutionEvent>)),
    tag = "runs"
)]
pub async fn list_run_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListEventsParams>,
) -> ApiResult<Json<ListResponse<ExecutionEvent>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (events, total) = state.ledger.list_events(&id, page).await?;
    Ok(Json(ListResponse::new(events, total, page.limit, page.offset)))
}

/// `POST /runs/{id}/cancel` — only valid for non-terminal statuses
/// (spec.md §5 "Execution cancel via API").
#[utoipa::path(
    post,
    path = "/runs/{id}/cancel",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Cancelled", body = DataResponse<Execution>),
        (status = 409, description = "Already terminal"),
    ),
    tag = "runs"
)]
pub async fn cancel_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<DataResponse<Execution>>> {
    let cancelled = state.ledger.update_status(&id, ExecutionStatus::Cancelled, None, None).await?;
    Ok(Json(DataResponse::new(cancelled)))
}

/// `POST /runs/{id}/retry` — re-dispatches a FAILED execution's original
/// params under a new run (mirrors DLQ replay semantics, spec.md §7
/// "Recovery").
#[utoipa::path(
    post,
    path = "/runs/{id}/retry",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 202, description = "Retry submitted", body = SubmitRunResponse),
        (status = 404, description = "Not found"),
        (status = 409, description = "Execution is not FAILED"),
    ),
    tag = "runs"
)]
pub async fn retry_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<SubmitRunResponse>> {
    let original = state.ledger.get(&id).await?;
    if original.status != ExecutionStatus::Failed {
        return Err(ApiError::new(
            spine_contracts::ErrorCategory::Conflict,
            format!("execution {id} is {} — only FAILED executions can be retried", original.status),
        ));
    }
    let retried = state
        .dispatcher
        .submit(
            &original.workflow,
            original.params,
            &original.lane,
            TriggerSource::Retry,
            Some(original.id),
            None,
        )
        .await?;
    Ok(Json(SubmitRunResponse { run_id: retried.id }))
}

/// `POST /runs/retry-failed` — bulk-resets terminal FAILED work items back
/// to PENDING (spec.md §4.2 `retry_failed(filter) → count`). Distinct from
/// `/runs/{id}/retry`, which re-dispatches a single FAILED *execution*; this
/// operates on the work-item queue (spec.md §4.6), not the execution ledger.
#[utoipa::path(
    post,
    path = "/runs/retry-failed",
    request_body = RetryFailedWorkItemsRequest,
    responses((status = 200, description = "Count of work items reset to PENDING", body = RetryFailedWorkItemsResponse)),
    tag = "runs"
)]
pub async fn retry_failed_work_items(
    State(state): State<AppState>,
    Json(body): Json<RetryFailedWorkItemsRequest>,
) -> ApiResult<Json<RetryFailedWorkItemsResponse>> {
    let reset_count = state.queue.retry_failed(body.domain.as_deref(), body.workflow.as_deref()).await?;
    Ok(Json(RetryFailedWorkItemsResponse { reset_count }))
}
