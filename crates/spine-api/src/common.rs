//! Shared application state and the error-category → HTTP status mapping
//! every handler in this crate uses (spec.md §6, §7).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, Json};
use spine_contracts::{ErrorCategory, ErrorResponse};
use spine_core::{DlqManager, Registry, Scheduler, WorkQueue};
use spine_core::{Dispatcher, Ledger, WorkflowEngine};
use spine_storage::{AlertRepository, AnomalyRepository, ManifestRepository, QualityRepository, RejectRepository, ScheduleRepository, SourceRepository};

/// Pings the backing store; `main.rs` closes over the live pool so
/// `/database/health` does a real round-trip instead of reporting "started
/// successfully" forever (spec.md §6 `GET /database/health`).
pub type HealthCheckFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// Everything a route handler needs, wired once at startup in `main.rs`
/// and cloned (cheaply — every field is an `Arc`) into each axum router.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub dispatcher: Arc<Dispatcher>,
    pub queue: Arc<WorkQueue>,
    pub dlq: Arc<DlqManager>,
    pub registry: Arc<Registry>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub scheduler: Arc<Scheduler>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub sources: Arc<dyn SourceRepository>,
    pub quality: Arc<dyn QualityRepository>,
    pub anomalies: Arc<dyn AnomalyRepository>,
    pub manifest: Arc<dyn ManifestRepository>,
    pub rejects: Arc<dyn RejectRepository>,
    pub backend_name: &'static str,
    pub health_check: HealthCheckFn,
}

/// A handler error that already carries the taxonomy category it maps
/// from (spec.md §7 "REST layer maps categories to HTTP status"). Every
/// per-layer error type in `spine-core`/`spine-storage` implements
/// `category()`; this wraps that plus a human message into one type that
/// `impl IntoResponse` can turn into `{error:{code, message}}`.
pub struct ApiError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ApiError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.category.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::new(self.category.code(), self.message))).into_response()
    }
}

/// Blanket conversion from any of `spine-core`'s `category()`-bearing
/// error enums into `ApiError`, so handlers can just use `?`.
macro_rules! impl_api_error_from {
    ($err:ty) => {
        impl From<$err> for ApiError {
            fn from(e: $err) -> Self {
                ApiError::new(e.category(), e.to_string())
            }
        }
    };
}

impl_api_error_from!(spine_core::LedgerError);
impl_api_error_from!(spine_core::DispatchError);
impl_api_error_from!(spine_core::RegistryError);
impl_api_error_from!(spine_core::WorkflowError);
impl_api_error_from!(spine_core::QueueError);
impl_api_error_from!(spine_core::SchedulerError);

impl From<spine_storage::StorageError> for ApiError {
    fn from(e: spine_storage::StorageError) -> Self {
        ApiError::new(e.category(), e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
