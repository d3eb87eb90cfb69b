//! `/workflows` endpoint family (spec.md §6): run a registered workflow
//! synchronously and inspect the registry.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use spine_contracts::{DataResponse, RunWorkflowRequest, Workflow, WorkflowContext, WorkflowResult};

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows", get(list_workflows))
        .route("/workflows/:name", get(get_workflow))
        .route("/workflows/:name/run", post(run_workflow))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/workflows",
    responses((status = 200, description = "Registered workflow names")),
    tag = "workflows"
)]
pub async fn list_workflows(State(state): State<AppState>) -> Json<DataResponse<Vec<String>>> {
    Json(DataResponse::new(state.registry.workflow_names()))
}

#[utoipa::path(
    get,
    path = "/workflows/{name}",
    params(("name" = String, Path, description = "Workflow name")),
    responses(
        (status = 200, description = "Workflow definition with step breakdown", body = DataResponse<Workflow>),
        (status = 404, description = "Not found"),
    ),
    tag = "workflows"
)]
pub async fn get_workflow(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<DataResponse<Workflow>>> {
    Ok(Json(DataResponse::new(state.registry.get_workflow(&name)?)))
}

/// `POST /workflows/{name}/run` (spec.md §6). Runs synchronously through
/// the `WorkflowEngine` — there is no separate "submit, poll" flow for
/// workflow runs in this tier, matching spec.md §4.4's contract that
/// `WorkflowEngine::run` returns the full `WorkflowResult`.
#[utoipa::path(
    post,
    path = "/workflows/{name}/run",
    params(("name" = String, Path, description = "Workflow name")),
    request_body = RunWorkflowRequest,
    responses(
        (status = 200, description = "Workflow run result", body = DataResponse<WorkflowResult>),
        (status = 404, description = "Unknown workflow"),
    ),
    tag = "workflows"
)]
pub async fn run_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RunWorkflowRequest>,
) -> ApiResult<Json<DataResponse<WorkflowResult>>> {
    let workflow = state.registry.get_workflow(&name)?;
    let run_id = spine_contracts::Execution::new_id();
    let ctx = WorkflowContext::new(run_id, name, body.params).with_dry_run(body.dry_run);
    let result = state.workflow_engine.run(&workflow, ctx).await?;
    Ok(Json(DataResponse::new(result)))
}
