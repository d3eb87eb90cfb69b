//! `/manifest` and `/rejects` endpoint families (spec.md §6): the
//! per-partition readiness breadcrumbs and the append-only reject audit
//! trail. Read-only here — both tables are written exclusively by pipeline
//! operations through the repository layer, never through the REST facade
//! (spec.md §8 invariant 8 "rejects are never updated or deleted").

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use spine_contracts::{ListResponse, ManifestRow, RejectRow};
use spine_storage::PageSlice;

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/manifest/:domain", get(list_manifest))
        .route("/rejects/:domain", get(list_rejects))
        .with_state(state)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListByDomainParams {
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
    path = "/manifest/{domain}",
    params(("domain" = String, Path, description = "Domain name"), ListByDomainParams),
    responses((status = 200, description = "Manifest rows for the domain", body = ListResponse<ManifestRow>)),
    tag = "manifest"
)]
pub async fn list_manifest(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(params): Query<ListByDomainParams>,
) -> ApiResult<Json<ListResponse<ManifestRow>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state.manifest.list_by_domain(&domain, page).await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}

#[utoipa::path(
    get,
    path = "/rejects/{domain}",
    params(("domain" = String, Path, description = "Domain name"), ListByDomainParams),
    responses((status = 200, description = "Reject rows for the domain", body = ListResponse<RejectRow>)),
    tag = "rejects"
)]
pub async fn list_rejects(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(params): Query<ListByDomainParams>,
) -> ApiResult<Json<ListResponse<RejectRow>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state.rejects.list_by_domain(&domain, page).await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}
