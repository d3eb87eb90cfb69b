//! `/sources` endpoint family (spec.md §6): registered input sources and
//! their fetch history.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use spine_contracts::{DataResponse, ListResponse, Source, SourceFetch};
use spine_storage::PageSlice;

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sources", get(list_sources))
        .route("/sources/:id", get(get_source))
        .route("/sources/:id/fetches", get(list_fetches))
        .with_state(state)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListFetchesParams {
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
    path = "/sources",
    responses((status = 200, description = "Registered sources", body = DataResponse<Vec<Source>>)),
    tag = "sources"
)]
pub async fn list_sources(State(state): State<AppState>) -> ApiResult<Json<DataResponse<Vec<Source>>>> {
    Ok(Json(DataResponse::new(state.sources.list_sources().await?)))
}

#[utoipa::path(
    get,
    path = "/sources/{id}",
    params(("id" = String, Path, description = "Source id")),
    responses(
        (status = 200, description = "Source", body = DataResponse<Source>),
        (status = 404, description = "Not found"),
    ),
    tag = "sources"
)]
pub async fn get_source(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<DataResponse<Source>>> {
    Ok(Json(DataResponse::new(state.sources.get_source(&id).await?)))
}

#[utoipa::path(
    get,
    path = "/sources/{id}/fetches",
    params(("id" = String, Path, description = "Source id"), ListFetchesParams),
    responses((status = 200, description = "Fetch history", body = ListResponse<SourceFetch>)),
    tag = "sources"
)]
pub async fn list_fetches(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListFetchesParams>,
) -> ApiResult<Json<ListResponse<SourceFetch>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state.sources.list_fetches(&id, page).await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}
