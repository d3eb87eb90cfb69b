//! Process entry point for the REST facade (spec.md §6). Loads layered
//! env config, connects to the configured backend (SQLite for local/dev,
//! PostgreSQL for multi-worker deployments — spec.md §4.1), bootstraps the
//! schema, wires every `spine-core` component, and serves the router.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use spine_api::{config, AppState, HealthCheckFn};
use spine_contracts::{Alert, AlertChannel, AlertDelivery, AlertDeliveryStatus};
use spine_contracts::{AnomalyRow, CreateScheduleRequest, DatabaseHealthResponse, ErrorBody, ErrorResponse};
use spine_contracts::{DeadLetter, Execution, EventType, ExecutionEvent, ExecutionStatus, TriggerSource};
use spine_contracts::{ManifestRow, QualityResultSummary, RejectRow, RunWorkflowRequest, Schedule};
use spine_contracts::{ScheduleTargetType, Source, SourceFetch, SubmitRunRequest, SubmitRunResponse, Workflow, WorkflowResult};
use spine_contracts::{RetryFailedWorkItemsRequest, RetryFailedWorkItemsResponse};
use spine_core::{ConcurrencyGuard, Dispatcher, DlqManager, Ledger, Registry, Scheduler, SystemClock, WorkQueue, WorkflowEngine};
use spine_storage::{
    schema, AlertRepository, AnomalyRepository, DeadLetterRepository, ExecutionRepository, LockRepository, ManifestRepository,
    PostgresStore, QualityRepository, RejectRepository, ScheduleRepository, SourceRepository, SqliteStore, WorkItemRepository,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        spine_api::runs::create_run,
        spine_api::runs::list_runs,
        spine_api::runs::get_run,
        spine_api::runs::list_run_events,
        spine_api::runs::cancel_run,
        spine_api::runs::retry_run,
        spine_api::runs::retry_failed_work_items,
        spine_api::workflows::list_workflows,
        spine_api::workflows::get_workflow,
        spine_api::workflows::run_workflow,
        spine_api::schedules::create_schedule,
        spine_api::schedules::list_schedules,
        spine_api::schedules::get_schedule,
        spine_api::schedules::update_schedule,
        spine_api::schedules::delete_schedule,
        spine_api::dlq::list_dead_letters,
        spine_api::dlq::get_dead_letter,
        spine_api::dlq::replay_dead_letter,
        spine_api::dlq::resolve_dead_letter,
        spine_api::alerts::list_alerts,
        spine_api::alerts::list_channels,
        spine_api::alerts::create_channel,
        spine_api::sources::list_sources,
        spine_api::sources::get_source,
        spine_api::sources::list_fetches,
        spine_api::quality::get_quality,
        spine_api::anomalies::list_anomalies,
        spine_api::manifest::list_manifest,
        spine_api::manifest::list_rejects,
        spine_api::health::database_health,
    ),
    components(schemas(
        Execution, ExecutionStatus, ExecutionEvent, EventType, TriggerSource,
        SubmitRunRequest, SubmitRunResponse, RetryFailedWorkItemsRequest, RetryFailedWorkItemsResponse,
        Workflow, WorkflowResult, RunWorkflowRequest,
        Schedule, ScheduleTargetType, CreateScheduleRequest,
        DeadLetter, spine_api::dlq::ResolveDlqRequest,
        Alert, AlertChannel, AlertDelivery, AlertDeliveryStatus,
        Source, SourceFetch,
        QualityResultSummary, AnomalyRow, ManifestRow, RejectRow,
        DatabaseHealthResponse,
        ErrorResponse, ErrorBody,
    )),
    tags(
        (name = "runs", description = "Execution ledger: submit, inspect, cancel, retry"),
        (name = "workflows", description = "Registered workflow definitions and synchronous runs"),
        (name = "schedules", description = "Cron/interval-driven triggers"),
        (name = "dlq", description = "Exhausted-retry dead letters"),
        (name = "alerts", description = "Alert channels and delivered alerts"),
        (name = "sources", description = "Registered input sources and fetch history"),
        (name = "quality", description = "Per-workflow data quality aggregates"),
        (name = "anomalies", description = "Detected data anomalies"),
        (name = "manifest", description = "Partition readiness breadcrumbs"),
        (name = "rejects", description = "Append-only reject audit trail"),
        (name = "health", description = "Liveness probes"),
    ),
    info(
        title = "Spine Core API",
        version = "0.1.0",
        description = "Data-pipeline orchestration: execution ledger, workflow engine, dispatcher, scheduler, and DLQ (spec.md §6)",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    let tier = config::load_layered_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "spine_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(tier = %tier, "spine-api starting");

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let instance_id = std::env::var("SPINE_INSTANCE_ID").unwrap_or_else(|_| format!("spine-api-{}", uuid::Uuid::now_v7()));
    let clock = Arc::new(SystemClock);

    let state = if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(&database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        schema::bootstrap_postgres(&pool).await.context("failed to bootstrap postgres schema")?;
        let store = Arc::new(PostgresStore::new(pool.clone()));
        let health_pool = pool.clone();
        let health_check: HealthCheckFn = Arc::new(move || {
            let pool = health_pool.clone();
            Box::pin(async move { sqlx::query("SELECT 1").execute(&pool).await.is_ok() })
        });
        build_state(store, clock, &instance_id, "postgres", health_check)
    } else {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await
            .context("failed to connect to SQLite")?;
        schema::bootstrap_sqlite(&pool).await.context("failed to bootstrap sqlite schema")?;
        let store = Arc::new(SqliteStore::new(pool.clone()));
        let health_pool = pool.clone();
        let health_check: HealthCheckFn = Arc::new(move || {
            let pool = health_pool.clone();
            Box::pin(async move { sqlx::query("SELECT 1").execute(&pool).await.is_ok() })
        });
        build_state(store, clock, &instance_id, "sqlite", health_check)
    };
    tracing::info!(backend = state.backend_name, "connected to database");

    let app = Router::new()
        .merge(spine_api::runs::routes(state.clone()))
        .merge(spine_api::workflows::routes(state.clone()))
        .merge(spine_api::schedules::routes(state.clone()))
        .merge(spine_api::dlq::routes(state.clone()))
        .merge(spine_api::alerts::routes(state.clone()))
        .merge(spine_api::sources::routes(state.clone()))
        .merge(spine_api::quality::routes(state.clone()))
        .merge(spine_api::anomalies::routes(state.clone()))
        .merge(spine_api::manifest::routes(state.clone()))
        .merge(spine_api::health::routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("SPINE_API_ADDR").unwrap_or_else(|_| "0.0.0.0:9100".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind address")?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Wires every repository-backed `spine-core` component against one
/// store. Generic over `S` so the SQLite and PostgreSQL startup paths
/// share this wiring instead of duplicating it — both stores implement
/// every repository trait used below (spec.md §4.2).
fn build_state<S>(store: Arc<S>, clock: Arc<SystemClock>, instance_id: &str, backend_name: &'static str, health_check: HealthCheckFn) -> AppState
where
    S: ExecutionRepository
        + WorkItemRepository
        + DeadLetterRepository
        + LockRepository
        + ScheduleRepository
        + AlertRepository
        + SourceRepository
        + QualityRepository
        + AnomalyRepository
        + ManifestRepository
        + RejectRepository
        + 'static,
{
    let ledger = Arc::new(Ledger::new(store.clone(), clock.clone()));
    let concurrency = Arc::new(ConcurrencyGuard::new(store.clone()));
    let registry = Arc::new(Registry::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), ledger.clone(), concurrency));
    let dlq = Arc::new(DlqManager::new(store.clone(), ledger.clone()));
    let queue = Arc::new(WorkQueue::new(store.clone(), clock.clone(), dlq.clone()));
    let workflow_engine = Arc::new(WorkflowEngine::new(registry.clone(), dispatcher.clone(), clock));
    let schedules: Arc<dyn ScheduleRepository> = store.clone();
    let scheduler = Arc::new(Scheduler::new(schedules.clone(), dispatcher.clone(), Arc::new(SystemClock), instance_id));

    AppState {
        ledger,
        dispatcher,
        queue,
        dlq,
        registry,
        workflow_engine,
        scheduler,
        schedules,
        alerts: store.clone(),
        sources: store.clone(),
        quality: store.clone(),
        anomalies: store.clone(),
        manifest: store.clone(),
        rejects: store,
        backend_name,
        health_check,
    }
}
