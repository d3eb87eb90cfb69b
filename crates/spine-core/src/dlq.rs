//! DLQ Manager (spec.md §4.8): captures exhausted failures and exposes
//! list/replay/resolve. Grounded in the teacher's in-memory DLQ
//! bookkeeping (`durable/src/persistence/memory.rs`'s `DlqEntry` map),
//! generalized onto the `DeadLetter` repository spec.md §3 names.

use std::sync::Arc;

use chrono::Utc;
use spine_contracts::{DeadLetter, Execution, TriggerSource};
use spine_storage::{DeadLetterRepository, PageSlice};
use tracing::info;
use uuid::Uuid;

use crate::error::{DispatchError, LedgerError};
use crate::ledger::Ledger;

pub struct DlqManager {
    repo: Arc<dyn DeadLetterRepository>,
    ledger: Arc<Ledger>,
}

impl DlqManager {
    pub fn new(repo: Arc<dyn DeadLetterRepository>, ledger: Arc<Ledger>) -> Self {
        Self { repo, ledger }
    }

    /// Captures an exhausted failure. Called when a WorkItem transitions
    /// to terminal FAILED, or a direct Dispatcher call exhausts its retry
    /// budget (spec.md §4.8). A no-op if a dead letter already exists for
    /// this execution — exhaustion is only ever recorded once per run.
    pub async fn capture(&self, execution: &Execution, max_retries: i32) -> Result<DeadLetter, LedgerError> {
        if self.repo.exists(&execution.id).await? {
            return Ok(self.repo.get_by_id(&execution.id).await?);
        }
        let dlq = DeadLetter {
            id: Uuid::now_v7().to_string(),
            execution_id: execution.id.clone(),
            workflow: execution.workflow.clone(),
            params: execution.params.clone(),
            error: execution.error.clone().unwrap_or_default(),
            retry_count: execution.retry_count,
            max_retries,
            resolved_at: None,
            resolved_by: None,
            replay_count: 0,
            created_at: Utc::now(),
        };
        let inserted = self.repo.insert(&dlq).await?;
        info!(execution_id = %execution.id, workflow = %execution.workflow, "captured exhausted failure into DLQ");
        Ok(inserted)
    }

    pub async fn list_unresolved(
        &self,
        workflow: Option<&str>,
        page: PageSlice,
    ) -> Result<(Vec<DeadLetter>, i64), LedgerError> {
        Ok(self.repo.list_dead_letters(workflow, Some(false), page).await?)
    }

    pub async fn get(&self, id: &str) -> Result<DeadLetter, LedgerError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// Re-submits the original params under a new execution id, with the
    /// parent pointer preserved (spec.md §7 "DLQ replay re-submits with
    /// original params under a new execution_id"), then bumps
    /// `replay_count`. `retry_count` is left untouched — DESIGN.md's Open
    /// Question resolution #1: replay continues the historical count
    /// rather than resetting it.
    pub async fn replay(&self, id: &str) -> Result<Execution, DispatchError> {
        let dlq = self.repo.get_by_id(id).await.map_err(LedgerError::from)?;
        let replayed = self
            .ledger
            .create_execution(
                &dlq.workflow,
                dlq.params.clone(),
                "default",
                TriggerSource::Retry,
                Some(dlq.execution_id.clone()),
                None,
            )
            .await?;
        self.repo.increment_replay(id).await.map_err(LedgerError::from)?;
        info!(dlq_id = %id, new_execution_id = %replayed.id, "replayed dead letter");
        Ok(replayed)
    }

    pub async fn resolve(&self, id: &str, resolved_by: &str) -> Result<DeadLetter, LedgerError> {
        Ok(self.repo.resolve(id, resolved_by).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use spine_contracts::ExecutionStatus;
    use spine_storage::SqliteStore;

    async fn manager() -> (DlqManager, Arc<Ledger>) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        spine_storage::schema::bootstrap_sqlite(&pool).await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let ledger = Arc::new(Ledger::new(store.clone(), Arc::new(SystemClock)));
        (DlqManager::new(store, ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn capture_then_replay_preserves_params_and_bumps_replay_count() {
        let (dlq, ledger) = manager().await;
        let exec = ledger
            .create_execution(
                "wf",
                serde_json::json!({"a": 1}),
                "default",
                TriggerSource::Api,
                None,
                None,
            )
            .await
            .unwrap();
        ledger
            .update_status(&exec.id, ExecutionStatus::Running, None, None)
            .await
            .unwrap();
        let failed = ledger
            .update_status(&exec.id, ExecutionStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let row = dlq.capture(&failed, 3).await.unwrap();
        assert_eq!(row.retry_count, failed.retry_count);
        assert_eq!(row.replay_count, 0);

        let replayed = dlq.replay(&row.id).await.unwrap();
        assert_eq!(replayed.params, serde_json::json!({"a": 1}));
        assert_eq!(replayed.parent_execution_id, Some(exec.id));

        let reread = dlq.get(&row.id).await.unwrap();
        assert_eq!(reread.replay_count, 1);
        assert_eq!(reread.retry_count, failed.retry_count, "retry_count is never reset on replay");
    }
}
