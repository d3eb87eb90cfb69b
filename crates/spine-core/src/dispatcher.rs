//! Dispatcher (spec.md §4.5): executes a single operation submission
//! synchronously end to end — registry lookup, idempotency, concurrency
//! locking, status transitions, and lineage — producing one `Execution`
//! row. Grounded in the teacher's `WorkflowExecutor::execute_activity`
//! (`durable/src/engine/executor.rs`), which runs the same
//! resolve-lock-invoke-record sequence around a single activity instead of
//! an operation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use spine_contracts::{Execution, ExecutionStatus, TriggerSource};
use tracing::{error, info, warn};

use crate::concurrency::ConcurrencyGuard;
use crate::error::DispatchError;
use crate::ledger::Ledger;
use crate::registry::{OperationContext, Registry};

const DEFAULT_LOCK_TTL_SECONDS: i64 = 300;

pub struct Dispatcher {
    registry: Arc<Registry>,
    ledger: Arc<Ledger>,
    concurrency: Arc<ConcurrencyGuard>,
    lock_ttl_seconds: i64,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, ledger: Arc<Ledger>, concurrency: Arc<ConcurrencyGuard>) -> Self {
        Self {
            registry,
            ledger,
            concurrency,
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
        }
    }

    pub fn with_lock_ttl(mut self, ttl_seconds: i64) -> Self {
        self.lock_ttl_seconds = ttl_seconds;
        self
    }

    /// Exposes the ledger so callers (e.g. the Scheduler's `max_instances`
    /// check) can read execution status without the dispatcher needing a
    /// dedicated pass-through method per query.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Exposes the registry so callers can hand the same instance to
    /// other components (e.g. the `WorkflowEngine`) instead of
    /// constructing a second, disconnected registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Runs the full algorithm in spec.md §4.5. Returns the final
    /// `Execution` row regardless of outcome — lock contention and handler
    /// failure are terminal states, not `Err`; `Err` is reserved for things
    /// that prevent recording an execution at all (unknown operation,
    /// storage failure).
    pub async fn submit(
        &self,
        operation: &str,
        params: Value,
        lane: &str,
        trigger_source: TriggerSource,
        parent_execution_id: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Execution, DispatchError> {
        let handler = self.registry.get_operation(operation)?;

        let execution = self
            .ledger
            .create_execution(
                operation,
                params.clone(),
                lane,
                trigger_source,
                parent_execution_id.clone(),
                idempotency_key,
            )
            .await?;

        // `create_execution` returns the prior row unchanged on an
        // idempotency hit; anything already past PENDING is a cached
        // result, not a fresh submission to run (spec.md §4.5 step 2).
        if execution.status != ExecutionStatus::Pending {
            info!(execution_id = %execution.id, status = %execution.status, "idempotent submit returned existing execution");
            return Ok(execution);
        }

        let lock_key = handler.concurrency_key(&params);
        let held = match &lock_key {
            Some(key) => {
                if self.concurrency.acquire(key, &execution.id, self.lock_ttl_seconds).await? {
                    Some(key.clone())
                } else {
                    warn!(execution_id = %execution.id, lock_key = %key, "concurrency lock contention");
                    return Ok(self
                        .ledger
                        .update_status(&execution.id, ExecutionStatus::Cancelled, None, Some("LOCK_CONTENTION".to_string()))
                        .await?);
                }
            }
            None => None,
        };

        let result = self.run_handler(&execution, &*handler, params).await;

        if let Some(key) = &held {
            self.concurrency.release(key, &execution.id).await?;
        }

        result
    }

    async fn run_handler(
        &self,
        execution: &Execution,
        handler: &dyn crate::registry::OperationHandler,
        params: Value,
    ) -> Result<Execution, DispatchError> {
        let running = self
            .ledger
            .update_status(&execution.id, ExecutionStatus::Running, None, None)
            .await?;

        let ctx = OperationContext {
            execution_id: running.id.clone(),
            parent_execution_id: running.parent_execution_id.clone(),
        };

        match handler.call(&ctx, params).await {
            Ok(value) => Ok(self
                .ledger
                .update_status(&running.id, ExecutionStatus::Completed, Some(value), None)
                .await?),
            Err(message) => {
                error!(execution_id = %running.id, error = %message, "operation handler failed");
                Ok(self
                    .ledger
                    .update_status(&running.id, ExecutionStatus::Failed, None, Some(message))
                    .await?)
            }
        }
    }
}

/// The contract a workflow's `Pipeline` step calls into (spec.md §4.5
/// "Contract to workflows"). `Dispatcher` is the sole implementer today;
/// the trait exists so the workflow engine depends on it rather than on
/// `Dispatcher` directly.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn submit_pipeline_sync(
        &self,
        name: &str,
        params: Value,
        parent_run_id: &str,
        correlation_id: &str,
    ) -> PipelineRunResult;
}

#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub run_id: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub output: Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl Runnable for Dispatcher {
    async fn submit_pipeline_sync(
        &self,
        name: &str,
        params: Value,
        parent_run_id: &str,
        correlation_id: &str,
    ) -> PipelineRunResult {
        let idempotency_key = Some(format!("{correlation_id}:{name}"));
        match self
            .submit(
                name,
                params,
                "default",
                TriggerSource::Workflow,
                Some(parent_run_id.to_string()),
                idempotency_key,
            )
            .await
        {
            Ok(execution) => PipelineRunResult {
                run_id: execution.id,
                status: execution.status,
                error: execution.error,
                output: execution.result.unwrap_or(serde_json::json!({})),
                started_at: execution.started_at,
                completed_at: execution.completed_at,
            },
            Err(e) => PipelineRunResult {
                run_id: String::new(),
                status: ExecutionStatus::Failed,
                error: Some(e.to_string()),
                output: serde_json::json!({}),
                started_at: None,
                completed_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::registry::OperationHandler;
    use spine_storage::SqliteStore;

    struct Echo;

    #[async_trait]
    impl OperationHandler for Echo {
        async fn call(&self, _ctx: &OperationContext, params: Value) -> Result<Value, String> {
            Ok(params)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl OperationHandler for AlwaysFails {
        async fn call(&self, _ctx: &OperationContext, _params: Value) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    struct LockedOp;

    #[async_trait]
    impl OperationHandler for LockedOp {
        async fn call(&self, _ctx: &OperationContext, params: Value) -> Result<Value, String> {
            Ok(params)
        }

        fn concurrency_key(&self, params: &Value) -> Option<String> {
            params.get("key").and_then(|v| v.as_str()).map(str::to_string)
        }
    }

    async fn dispatcher() -> Dispatcher {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        spine_storage::schema::bootstrap_sqlite(&pool).await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let ledger = Arc::new(Ledger::new(store.clone(), Arc::new(SystemClock)));
        let concurrency = Arc::new(ConcurrencyGuard::new(store));
        let registry = Arc::new(Registry::new());
        registry.register_operation("echo", Arc::new(Echo));
        registry.register_operation("boom", Arc::new(AlwaysFails));
        registry.register_operation("locked", Arc::new(LockedOp));
        Dispatcher::new(registry, ledger, concurrency)
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error_not_an_execution() {
        let d = dispatcher().await;
        let err = d
            .submit("nope", serde_json::json!({}), "default", TriggerSource::Api, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), spine_contracts::ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn successful_handler_completes_the_execution() {
        let d = dispatcher().await;
        let exec = d
            .submit("echo", serde_json::json!({"a": 1}), "default", TriggerSource::Api, None, None)
            .await
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.result, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn failing_handler_fails_the_execution_without_erroring_submit() {
        let d = dispatcher().await;
        let exec = d
            .submit("boom", serde_json::json!({}), "default", TriggerSource::Api, None, None)
            .await
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn second_submission_under_same_lock_is_cancelled_with_lock_contention() {
        let d = dispatcher().await;
        // Pre-acquire the lock under a third-party owner to force contention
        // deterministically rather than racing two concurrent submits.
        d.concurrency.acquire("shared-key", "someone-else", 300).await.unwrap();

        let exec = d
            .submit(
                "locked",
                serde_json::json!({"key": "shared-key"}),
                "default",
                TriggerSource::Api,
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert_eq!(exec.error.as_deref(), Some("LOCK_CONTENTION"));
    }

    #[tokio::test]
    async fn idempotent_resubmit_returns_cached_completed_execution() {
        let d = dispatcher().await;
        let first = d
            .submit(
                "echo",
                serde_json::json!({"a": 1}),
                "default",
                TriggerSource::Api,
                None,
                Some("k".to_string()),
            )
            .await
            .unwrap();
        let second = d
            .submit(
                "echo",
                serde_json::json!({"a": 2}),
                "default",
                TriggerSource::Api,
                None,
                Some("k".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.result, Some(serde_json::json!({"a": 1})));
    }
}
