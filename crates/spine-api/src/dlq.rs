//! `/dlq` endpoint family (spec.md §4.8, §6): exhausted-retry capture,
//! list/replay/resolve.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use spine_contracts::{DataResponse, DeadLetter, ListResponse, SubmitRunResponse};
use spine_storage::PageSlice;

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/dlq", get(list_dead_letters))
        .route("/dlq/:id", get(get_dead_letter))
        .route("/dlq/:id/replay", post(replay_dead_letter))
        .route("/dlq/:id/resolve", post(resolve_dead_letter))
        .with_state(state)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListDlqParams {
    pub workflow: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[utoipa::path(
    get,
    path = "/dlq",
    params(ListDlqParams),
    responses((status = 200, description = "Unresolved dead letters", body = ListResponse<DeadLetter>)),
    tag = "dlq"
)]
pub async fn list_dead_letters(State(state): State<AppState>, Query(params): Query<ListDlqParams>) -> ApiResult<Json<ListResponse<DeadLetter>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state.dlq.list_unresolved(params.workflow.as_deref(), page).await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}

#[utoipa::path(
    get,
    path = "/dlq/{id}",
    params(("id" = String, Path, description = "Dead letter id")),
    responses((status = 200, description = "Dead letter", body = DataResponse<DeadLetter>)),
    tag = "dlq"
)]
pub async fn get_dead_letter(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<DataResponse<DeadLetter>>> {
    Ok(Json(DataResponse::new(state.dlq.get(&id).await?)))
}

#[utoipa::path(
    post,
    path = "/dlq/{id}/replay",
    params(("id" = String, Path, description = "Dead letter id")),
    responses((status = 202, description = "Replay submitted", body = SubmitRunResponse)),
    tag = "dlq"
)]
pub async fn replay_dead_letter(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<SubmitRunResponse>> {
    let replayed = state.dlq.replay(&id).await?;
    Ok(Json(SubmitRunResponse { run_id: replayed.id }))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ResolveDlqRequest {
    pub resolved_by: String,
}

#[utoipa::path(
    post,
    path = "/dlq/{id}/resolve",
    params(("id" = String, Path, description = "Dead letter id")),
    request_body = ResolveDlqRequest,
    responses((status = 200, description = "Resolved", body = DataResponse<DeadLetter>)),
    tag = "dlq"
)]
pub async fn resolve_dead_letter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResolveDlqRequest>,
) -> ApiResult<Json<DataResponse<DeadLetter>>> {
    Ok(Json(DataResponse::new(state.dlq.resolve(&id, &body.resolved_by).await?)))
}
