//! `/quality` endpoint family (spec.md §6): per-workflow data-quality
//! aggregates.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use spine_contracts::{DataResponse, QualityResultSummary};

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/quality/:workflow", get(get_quality))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/quality/{workflow}",
    params(("workflow" = String, Path, description = "Workflow name")),
    responses((status = 200, description = "Quality summaries for the workflow", body = DataResponse<Vec<QualityResultSummary>>)),
    tag = "quality"
)]
pub async fn get_quality(State(state): State<AppState>, Path(workflow): Path<String>) -> ApiResult<Json<DataResponse<Vec<QualityResultSummary>>>> {
    Ok(Json(DataResponse::new(state.quality.aggregate_by_workflow(&workflow).await?)))
}
