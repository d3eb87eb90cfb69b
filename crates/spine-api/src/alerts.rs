//! `/alerts` endpoint family (spec.md §6): channel + alert list/create.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use spine_contracts::{Alert, AlertChannel, DataResponse, ListResponse};
use spine_storage::PageSlice;

use crate::common::{ApiResult, AppState};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/channels", get(list_channels).post(create_channel))
        .with_state(state)
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListAlertsParams {
    pub domain: Option<String>,
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
    path = "/alerts",
    params(ListAlertsParams),
    responses((status = 200, description = "Alerts", body = ListResponse<Alert>)),
    tag = "alerts"
)]
pub async fn list_alerts(State(state): State<AppState>, Query(params): Query<ListAlertsParams>) -> ApiResult<Json<ListResponse<Alert>>> {
    let page = PageSlice {
        limit: params.limit,
        offset: params.offset,
    };
    let (rows, total) = state.alerts.list_alerts(params.domain.as_deref(), page).await?;
    Ok(Json(ListResponse::new(rows, total, page.limit, page.offset)))
}

#[utoipa::path(
    get,
    path = "/alerts/channels",
    responses((status = 200, description = "Alert channels", body = DataResponse<Vec<AlertChannel>>)),
    tag = "alerts"
)]
pub async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<DataResponse<Vec<AlertChannel>>>> {
    Ok(Json(DataResponse::new(state.alerts.list_channels().await?)))
}

#[utoipa::path(
    post,
    path = "/alerts/channels",
    request_body = AlertChannel,
    responses((status = 201, description = "Channel created", body = DataResponse<AlertChannel>)),
    tag = "alerts"
)]
pub async fn create_channel(State(state): State<AppState>, Json(body): Json<AlertChannel>) -> ApiResult<Json<DataResponse<AlertChannel>>> {
    Ok(Json(DataResponse::new(state.alerts.create_channel(&body).await?)))
}
