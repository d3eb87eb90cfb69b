//! `GET /database/health` (spec.md §6): a liveness probe a load balancer
//! or deploy hook can poll independently of any particular domain route.

use axum::{extract::State, routing::get, Json, Router};
use spine_contracts::DatabaseHealthResponse;

use crate::common::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new().route("/database/health", get(database_health)).with_state(state)
}

#[utoipa::path(
    get,
    path = "/database/health",
    responses((status = 200, description = "Database connectivity", body = DatabaseHealthResponse)),
    tag = "health"
)]
pub async fn database_health(State(state): State<AppState>) -> Json<DatabaseHealthResponse> {
    let connected = (state.health_check)().await;
    Json(DatabaseHealthResponse {
        connected,
        backend: state.backend_name.to_string(),
    })
}
