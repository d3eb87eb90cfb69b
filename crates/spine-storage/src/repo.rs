//! Repository traits — the storage seam every component in spec.md §2 talks
//! to. `SqliteStore` and `PostgresStore` (see `sqlite.rs`/`postgres.rs`) each
//! implement the full set; callers depend on the traits, never the structs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spine_contracts::{
    Alert, AlertChannel, AlertDelivery, AnomalyRow, ConcurrencyLock, DeadLetter, Execution,
    ExecutionEvent, ExecutionStatus, ManifestRow, QualityResultSummary, RejectRow, Schedule,
    ScheduleLock, ScheduleRun, Source, SourceFetch, WorkItem, WorkItemState,
};

use crate::error::StorageResult;

/// Pagination params used by every `list_*` operation (spec.md §4.2).
#[derive(Debug, Clone, Copy)]
pub struct PageSlice {
    pub limit: i64,
    pub offset: i64,
}

impl Default for PageSlice {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn get_by_id(&self, id: &str) -> StorageResult<Execution>;

    /// Backs the Ledger's idempotency check (spec.md §4.3): a second
    /// `create_execution` call for the same `idempotency_key` returns the
    /// row this finds instead of inserting again.
    async fn get_by_idempotency_key(&self, key: &str) -> StorageResult<Option<Execution>>;

    async fn list_executions(
        &self,
        workflow: Option<&str>,
        status: Option<ExecutionStatus>,
        lane: Option<&str>,
        page: PageSlice,
    ) -> StorageResult<(Vec<Execution>, i64)>;

    async fn create_execution(&self, execution: &Execution) -> StorageResult<Execution>;

    /// Transitions `id` to `next`, stamping `started_at`/`completed_at` as
    /// appropriate and recording `result`/`error`. Callers check
    /// `ExecutionStatus::can_transition_to` before calling this — the store
    /// does not re-validate the FSM (spec.md §4.3 places that in the ledger
    /// component, not the persistence layer).
    async fn update_status(
        &self,
        id: &str,
        next: ExecutionStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> StorageResult<Execution>;

    async fn add_event(&self, event: &ExecutionEvent) -> StorageResult<()>;

    async fn list_events(
        &self,
        execution_id: &str,
        page: PageSlice,
    ) -> StorageResult<(Vec<ExecutionEvent>, i64)>;
}

#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> StorageResult<WorkItem>;

    async fn list_items(
        &self,
        domain: Option<&str>,
        state: Option<WorkItemState>,
        page: PageSlice,
    ) -> StorageResult<(Vec<WorkItem>, i64)>;

    async fn enqueue(&self, item: &WorkItem) -> StorageResult<WorkItem>;

    /// Atomically claims up to `max_items` items in `domain` that are
    /// PENDING, or RETRY_WAIT past `next_attempt_at`, transitioning them to
    /// RUNNING and stamping `locked_by`/`locked_at`. `now` is the caller's
    /// injectable clock reading (spec.md §9 "single injectable clock"), not
    /// a fresh `Utc::now()` taken inside the store, so tests can control
    /// which PENDING/RETRY_WAIT rows are due. Grounded in
    /// `durable/src/persistence/postgres.rs::claim_task`'s
    /// `FOR UPDATE SKIP LOCKED` pattern (spec.md §4.6 claim contract).
    async fn claim(&self, domain: &str, worker_id: &str, max_items: i64, now: DateTime<Utc>) -> StorageResult<Vec<WorkItem>>;

    async fn complete(&self, id: i64, execution_id: &str) -> StorageResult<WorkItem>;

    /// Records a failed attempt. `next_attempt_at` of `None` means the
    /// caller already determined `attempt_count >= max_attempts` and the
    /// item should move to FAILED outright (exhausted — spec.md §4.6).
    async fn fail(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> StorageResult<WorkItem>;

    async fn cancel(&self, id: i64) -> StorageResult<WorkItem>;

    /// Bulk-resets terminal FAILED rows matching the filter back to PENDING
    /// (spec.md §4.2 `retry_failed(filter) → count`), clearing
    /// `attempt_count`/`last_error`/`next_attempt_at` so each row gets a
    /// fresh attempt budget. Returns the number of rows reset.
    async fn retry_failed(&self, domain: Option<&str>, workflow: Option<&str>) -> StorageResult<i64>;
}

#[async_trait]
pub trait ManifestRepository: Send + Sync {
    async fn upsert(&self, row: &ManifestRow) -> StorageResult<ManifestRow>;

    async fn get(
        &self,
        domain: &str,
        partition_key: &serde_json::Value,
        stage: &str,
    ) -> StorageResult<Option<ManifestRow>>;

    async fn list_by_domain(&self, domain: &str, page: PageSlice) -> StorageResult<(Vec<ManifestRow>, i64)>;
}

#[async_trait]
pub trait RejectRepository: Send + Sync {
    /// Append-only — there is no update or delete (spec.md §8 invariant 8).
    async fn insert(&self, row: &RejectRow) -> StorageResult<RejectRow>;

    async fn list_by_domain(&self, domain: &str, page: PageSlice) -> StorageResult<(Vec<RejectRow>, i64)>;
}

#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    async fn list_dead_letters(
        &self,
        workflow: Option<&str>,
        resolved: Option<bool>,
        page: PageSlice,
    ) -> StorageResult<(Vec<DeadLetter>, i64)>;

    async fn get_by_id(&self, id: &str) -> StorageResult<DeadLetter>;

    async fn exists(&self, execution_id: &str) -> StorageResult<bool>;

    async fn insert(&self, dlq: &DeadLetter) -> StorageResult<DeadLetter>;

    /// Bumps `replay_count` only; `retry_count` is the original run's
    /// exhausted-attempt history and is never reset here (DESIGN.md Open
    /// Question resolution #1).
    async fn increment_replay(&self, id: &str) -> StorageResult<DeadLetter>;

    async fn resolve(&self, id: &str, resolved_by: &str) -> StorageResult<DeadLetter>;
}

#[async_trait]
pub trait QualityRepository: Send + Sync {
    async fn aggregate_by_workflow(&self, workflow: &str) -> StorageResult<Vec<QualityResultSummary>>;

    async fn record(&self, summary: &QualityResultSummary) -> StorageResult<()>;
}

#[async_trait]
pub trait AnomalyRepository: Send + Sync {
    async fn insert(&self, row: &AnomalyRow) -> StorageResult<AnomalyRow>;

    async fn list_by_domain(&self, domain: &str, page: PageSlice) -> StorageResult<(Vec<AnomalyRow>, i64)>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn list_channels(&self) -> StorageResult<Vec<AlertChannel>>;

    async fn create_channel(&self, channel: &AlertChannel) -> StorageResult<AlertChannel>;

    async fn insert_alert(&self, alert: &Alert) -> StorageResult<Alert>;

    async fn list_alerts(&self, domain: Option<&str>, page: PageSlice) -> StorageResult<(Vec<Alert>, i64)>;

    async fn record_delivery(&self, delivery: &AlertDelivery) -> StorageResult<AlertDelivery>;
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn list_sources(&self) -> StorageResult<Vec<Source>>;

    async fn get_source(&self, id: &str) -> StorageResult<Source>;

    async fn record_fetch(&self, fetch: &SourceFetch) -> StorageResult<SourceFetch>;

    async fn list_fetches(&self, source_id: &str, page: PageSlice) -> StorageResult<(Vec<SourceFetch>, i64)>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn list_enabled(&self) -> StorageResult<Vec<Schedule>>;

    async fn get_by_id(&self, id: &str) -> StorageResult<Schedule>;

    async fn create(&self, schedule: &Schedule) -> StorageResult<Schedule>;

    async fn update_next_run(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> StorageResult<Schedule>;

    async fn record_run(&self, run: &ScheduleRun) -> StorageResult<ScheduleRun>;

    async fn list_runs(&self, schedule_id: &str, page: PageSlice) -> StorageResult<(Vec<ScheduleRun>, i64)>;

    /// Acquires the scheduler-wide tick lock for `schedule_id`. Returns
    /// `None` if another tick already holds it (spec.md §4.7; §9 Open
    /// Question #2 — `max_instances` races are made moot by this lock, not
    /// a distributed per-schedule counter).
    async fn acquire_schedule_lock(
        &self,
        schedule_id: &str,
        locked_by: &str,
        ttl_seconds: i64,
    ) -> StorageResult<Option<ScheduleLock>>;

    async fn release_schedule_lock(&self, schedule_id: &str, locked_by: &str) -> StorageResult<()>;
}

#[async_trait]
pub trait LockRepository: Send + Sync {
    async fn list_locks(&self) -> StorageResult<Vec<ConcurrencyLock>>;

    /// Acquire-or-extend per the ConcurrencyGuard algorithm (spec.md §4.9).
    /// Returns `None` if `lock_key` is already held by a different
    /// execution and has not expired.
    async fn acquire(
        &self,
        lock_key: &str,
        execution_id: &str,
        ttl_seconds: i64,
    ) -> StorageResult<Option<ConcurrencyLock>>;

    async fn extend(&self, lock_key: &str, execution_id: &str, ttl_seconds: i64) -> StorageResult<ConcurrencyLock>;

    async fn release(&self, lock_key: &str, execution_id: &str) -> StorageResult<()>;
}
