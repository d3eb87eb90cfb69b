//! `/anomalies` endpoint family (spec.md §6): detected data anomalies by
//! domain.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use spine_contracts::{AnomalyRow, ListResponse};
use spine_storage::PageSlice;

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/anomalies/:domain", get(list_anomalies))
        .with_state(state)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListAnomaliesParams {
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
    path = "/anomalies/{domain}",
    params(("domain" = String, Path, description = "Domain name"), ListAnomaliesParams),
    responses((status = 200, description = "Anomalies for the domain", body = ListResponse<AnomalyRow>)),
    tag = "anomalies"
)]
pub async fn list_anomalies(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(params): Query<ListAnomaliesParams>,
) -> ApiResult<Json<ListResponse<AnomalyRow>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state.anomalies.list_by_domain(&domain, page).await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}
