//! Work-item Queue (spec.md §4.6): enqueue/claim/complete/fail over
//! `WorkItemRepository`, with exponential backoff on failure and
//! retry-budget exhaustion feeding the DLQ. Grounded in the teacher's
//! worker pool claim loop (`durable/src/worker/pool.rs`'s poller +
//! `Semaphore`-bounded concurrency), generalized from activity tasks onto
//! `WorkItem` rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use spine_contracts::{Execution, WorkItem, WorkItemState};
use spine_storage::{PageSlice, WorkItemRepository};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::dlq::DlqManager;
use crate::error::QueueError;

const DEFAULT_BACKOFF_BASE_SECONDS: i64 = 60;
const DEFAULT_BACKOFF_CEILING_SECONDS: i64 = 3600;

pub struct WorkQueue {
    repo: Arc<dyn WorkItemRepository>,
    clock: Arc<dyn Clock>,
    dlq: Arc<DlqManager>,
    backoff_base_seconds: i64,
    backoff_ceiling_seconds: i64,
}

impl WorkQueue {
    pub fn new(repo: Arc<dyn WorkItemRepository>, clock: Arc<dyn Clock>, dlq: Arc<DlqManager>) -> Self {
        Self {
            repo,
            clock,
            dlq,
            backoff_base_seconds: DEFAULT_BACKOFF_BASE_SECONDS,
            backoff_ceiling_seconds: DEFAULT_BACKOFF_CEILING_SECONDS,
        }
    }

    pub fn with_backoff(mut self, base_seconds: i64, ceiling_seconds: i64) -> Self {
        self.backoff_base_seconds = base_seconds;
        self.backoff_ceiling_seconds = ceiling_seconds;
        self
    }

    pub async fn enqueue(
        &self,
        domain: &str,
        workflow: &str,
        partition_key: serde_json::Value,
        desired_at: DateTime<Utc>,
        priority: i32,
        max_attempts: i32,
    ) -> Result<WorkItem, QueueError> {
        let item = WorkItem {
            id: 0,
            domain: domain.to_string(),
            workflow: workflow.to_string(),
            partition_key,
            desired_at,
            priority,
            state: WorkItemState::Pending,
            attempt_count: 0,
            max_attempts,
            last_error: None,
            last_error_at: None,
            next_attempt_at: None,
            current_execution_id: None,
            latest_execution_id: None,
            locked_by: None,
            locked_at: None,
        };
        Ok(self.repo.enqueue(&item).await?)
    }

    /// Claims up to `max_items` PENDING (or due RETRY_WAIT) items in
    /// `domain` for `worker_id`. The SKIP LOCKED claim predicate itself
    /// lives in the repository implementation; this layer only forwards.
    pub async fn claim(&self, domain: &str, worker_id: &str, max_items: i64) -> Result<Vec<WorkItem>, QueueError> {
        let claimed = self.repo.claim(domain, worker_id, max_items, self.clock.now()).await?;
        if !claimed.is_empty() {
            info!(domain, worker_id, count = claimed.len(), "claimed work items");
        }
        Ok(claimed)
    }

    pub async fn complete(&self, id: i64, execution_id: &str) -> Result<WorkItem, QueueError> {
        Ok(self.repo.complete(id, execution_id).await?)
    }

    /// Records a failed attempt. `claim` already incremented `attempt_count`
    /// for the attempt that just ran, so `item.attempt_count` here is the
    /// number of attempts made so far. If that is still under
    /// `max_attempts`, schedules the next try at
    /// `now + backoff_delay_seconds(attempt_count)` and leaves the item in
    /// RETRY_WAIT; otherwise marks it FAILED outright and captures it into
    /// the DLQ (spec.md §8 scenario S4).
    pub async fn fail(&self, item: &WorkItem, error: &str, execution: &Execution) -> Result<WorkItem, QueueError> {
        if item.attempt_count < item.max_attempts {
            let delay = WorkItem::backoff_delay_seconds(item.attempt_count, self.backoff_base_seconds, self.backoff_ceiling_seconds);
            let next_attempt_at = self.clock.now() + chrono::Duration::seconds(delay);
            let updated = self.repo.fail(item.id, error, Some(next_attempt_at)).await?;
            warn!(item_id = item.id, attempt = item.attempt_count, delay_seconds = delay, "work item scheduled for retry");
            Ok(updated)
        } else {
            let updated = self.repo.fail(item.id, error, None).await?;
            warn!(item_id = item.id, attempts = item.attempt_count, "work item exhausted retry budget");
            self.dlq.capture(execution, item.max_attempts).await.map_err(|e| {
                warn!(item_id = item.id, error = %e, "failed to capture exhausted work item into DLQ");
                QueueError::Storage(spine_storage::StorageError::Unknown(e.to_string()))
            })?;
            Ok(updated)
        }
    }

    pub async fn cancel(&self, id: i64) -> Result<WorkItem, QueueError> {
        Ok(self.repo.cancel(id).await?)
    }

    pub async fn get(&self, id: i64) -> Result<WorkItem, QueueError> {
        self.repo.get_by_id(id).await.map_err(|e| match e {
            spine_storage::StorageError::NotFound => QueueError::NotFound(id),
            other => QueueError::Storage(other),
        })
    }

    pub async fn list(
        &self,
        domain: Option<&str>,
        state: Option<WorkItemState>,
        page: PageSlice,
    ) -> Result<(Vec<WorkItem>, i64), QueueError> {
        Ok(self.repo.list_items(domain, state, page).await?)
    }

    /// Bulk-resets terminal FAILED items matching the filter back to
    /// PENDING, giving each a fresh attempt budget (spec.md §4.2
    /// `retry_failed(filter) → count`). Returns the number of rows reset.
    pub async fn retry_failed(&self, domain: Option<&str>, workflow: Option<&str>) -> Result<i64, QueueError> {
        let count = self.repo.retry_failed(domain, workflow).await?;
        if count > 0 {
            info!(domain = ?domain, workflow = ?workflow, count, "reset failed work items to pending");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::ledger::Ledger;
    use spine_contracts::{ExecutionStatus, TriggerSource};
    use spine_storage::SqliteStore;

    async fn queue_with_clock() -> (WorkQueue, Arc<MockClock>, Arc<Ledger>) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        spine_storage::schema::bootstrap_sqlite(&pool).await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(MockClock::new(Utc::now()));
        let ledger = Arc::new(Ledger::new(store.clone(), clock.clone()));
        let dlq = Arc::new(DlqManager::new(store.clone(), ledger.clone()));
        let queue = WorkQueue::new(store, clock.clone(), dlq).with_backoff(60, 3600);
        (queue, clock, ledger)
    }

    #[tokio::test]
    async fn failed_attempt_under_budget_schedules_retry_with_backoff() {
        let (queue, clock, ledger) = queue_with_clock().await;
        queue
            .enqueue("ingest", "wf", serde_json::json!({}), clock.now(), 0, 3)
            .await
            .unwrap();
        let claimed = queue.claim("ingest", "worker-1", 1).await.unwrap();
        let item = claimed.into_iter().next().expect("one item claimed");
        assert_eq!(item.attempt_count, 1, "claim increments attempt_count");

        let exec = ledger
            .create_execution("wf", serde_json::json!({}), "default", TriggerSource::Internal, None, None)
            .await
            .unwrap();

        let retried = queue.fail(&item, "boom", &exec).await.unwrap();
        assert_eq!(retried.state, WorkItemState::RetryWait);
        let next = retried.next_attempt_at.expect("retry scheduled");
        assert_eq!((next - clock.now()).num_seconds(), 60);
    }

    #[tokio::test]
    async fn exhausted_attempts_go_failed_and_land_in_dlq() {
        let (queue, clock, ledger) = queue_with_clock().await;
        queue
            .enqueue("ingest", "wf", serde_json::json!({}), clock.now(), 0, 1)
            .await
            .unwrap();
        let claimed = queue.claim("ingest", "worker-1", 1).await.unwrap();
        let item = claimed.into_iter().next().expect("one item claimed");
        assert_eq!(item.attempt_count, 1);

        let exec = ledger
            .create_execution("wf", serde_json::json!({}), "default", TriggerSource::Internal, None, None)
            .await
            .unwrap();
        ledger
            .update_status(&exec.id, ExecutionStatus::Running, None, None)
            .await
            .unwrap();
        let failed_exec = ledger
            .update_status(&exec.id, ExecutionStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let failed = queue.fail(&item, "boom", &failed_exec).await.unwrap();
        assert_eq!(failed.state, WorkItemState::Failed);
        assert!(failed.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn retry_wait_item_is_reclaimed_by_claim_once_due() {
        let (queue, clock, ledger) = queue_with_clock().await;
        queue
            .enqueue("ingest", "wf", serde_json::json!({}), clock.now(), 0, 3)
            .await
            .unwrap();
        let claimed = queue.claim("ingest", "worker-1", 1).await.unwrap();
        let item = claimed.into_iter().next().expect("one item claimed");

        let exec = ledger
            .create_execution("wf", serde_json::json!({}), "default", TriggerSource::Internal, None, None)
            .await
            .unwrap();
        let retried = queue.fail(&item, "boom", &exec).await.unwrap();
        assert_eq!(retried.state, WorkItemState::RetryWait);

        // Not yet due: claim sees nothing.
        assert!(queue.claim("ingest", "worker-2", 1).await.unwrap().is_empty());

        // Past next_attempt_at: claim reclaims it and bumps attempt_count again.
        clock.advance(chrono::Duration::seconds(61));
        let reclaimed = queue.claim("ingest", "worker-2", 1).await.unwrap();
        let reclaimed = reclaimed.into_iter().next().expect("retry_wait item reclaimed once due");
        assert_eq!(reclaimed.state, WorkItemState::Running);
        assert_eq!(reclaimed.attempt_count, 2);
        assert_eq!(reclaimed.locked_by.as_deref(), Some("worker-2"));
    }

    #[tokio::test]
    async fn retry_failed_resets_terminal_failures_to_pending() {
        let (queue, clock, ledger) = queue_with_clock().await;
        queue
            .enqueue("ingest", "wf", serde_json::json!({}), clock.now(), 0, 1)
            .await
            .unwrap();
        let claimed = queue.claim("ingest", "worker-1", 1).await.unwrap();
        let item = claimed.into_iter().next().expect("one item claimed");

        let exec = ledger
            .create_execution("wf", serde_json::json!({}), "default", TriggerSource::Internal, None, None)
            .await
            .unwrap();
        let failed = queue.fail(&item, "boom", &exec).await.unwrap();
        assert_eq!(failed.state, WorkItemState::Failed);

        let reset_count = queue.retry_failed(Some("ingest"), None).await.unwrap();
        assert_eq!(reset_count, 1);

        let reset = queue.get(failed.id).await.unwrap();
        assert_eq!(reset.state, WorkItemState::Pending);
        assert_eq!(reset.attempt_count, 0, "fresh attempt budget");
        assert!(reset.last_error.is_none());

        // A domain filter that doesn't match finds nothing to reset.
        assert_eq!(queue.retry_failed(Some("other_domain"), None).await.unwrap(), 0);
    }
}
