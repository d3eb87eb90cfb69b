//! SQLite-backed `SqliteStore`. Intended for local development and the
//! single-node deployment spec.md §1 calls out — every repository trait is
//! implemented here against a `SqlitePool` with `WAL` mode and a single
//! writer connection (SQLite serializes writers regardless, so claiming
//! relies on `BEGIN IMMEDIATE` rather than `SKIP LOCKED`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row, SqlitePool};

use spine_contracts::{
    Alert, AlertChannel, AlertDelivery, AlertDeliveryStatus, AnomalyRow, ConcurrencyLock,
    DeadLetter, Execution, ExecutionEvent, ExecutionStatus, EventType, ManifestRow,
    QualityResultSummary, RejectRow, Schedule, ScheduleLock, ScheduleRun, ScheduleRunOutcome,
    ScheduleTargetType, Source, SourceFetch, TriggerSource, WorkItem, WorkItemState,
};

use crate::dialect::{Dialect, SqliteDialect};
use crate::error::{StorageError, StorageResult};
use crate::repo::*;
use crate::sql;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    dialect: SqliteDialect,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            dialect: SqliteDialect,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workflow: String,
    params: serde_json::Value,
    status: String,
    lane: String,
    trigger_source: String,
    parent_execution_id: Option<String>,
    idempotency_key: Option<String>,
    retry_count: i32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StorageError;

    fn try_from(r: ExecutionRow) -> StorageResult<Self> {
        Ok(Execution {
            id: r.id,
            workflow: r.workflow,
            params: r.params,
            status: r
                .status
                .parse()
                .map_err(StorageError::Unknown)?,
            lane: r.lane,
            trigger_source: parse_trigger_source(&r.trigger_source)?,
            parent_execution_id: r.parent_execution_id,
            idempotency_key: r.idempotency_key,
            retry_count: r.retry_count,
            started_at: r.started_at,
            completed_at: r.completed_at,
            result: r.result,
            error: r.error,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn parse_trigger_source(s: &str) -> StorageResult<TriggerSource> {
    Ok(match s {
        "API" => TriggerSource::Api,
        "CLI" => TriggerSource::Cli,
        "SCHEDULE" => TriggerSource::Schedule,
        "RETRY" => TriggerSource::Retry,
        "WORKFLOW" => TriggerSource::Workflow,
        "INTERNAL" => TriggerSource::Internal,
        other => return Err(StorageError::Unknown(format!("unknown trigger source: {other}"))),
    })
}

fn parse_event_type(s: &str) -> StorageResult<EventType> {
    Ok(match s {
        "CREATED" => EventType::Created,
        "STARTED" => EventType::Started,
        "PROGRESS" => EventType::Progress,
        "COMPLETED" => EventType::Completed,
        "FAILED" => EventType::Failed,
        "CANCELLED" => EventType::Cancelled,
        "CONTAINER_CREATED" => EventType::ContainerCreated,
        "CLEANUP_STARTED" => EventType::CleanupStarted,
        "CLEANUP_COMPLETED" => EventType::CleanupCompleted,
        other => return Err(StorageError::Unknown(format!("unknown event type: {other}"))),
    })
}

#[async_trait]
impl ExecutionRepository for SqliteStore {
    async fn get_by_id(&self, id: &str) -> StorageResult<Execution> {
        let row: ExecutionRow = sqlx::query_as(
            "SELECT id, workflow, params, status, lane, trigger_source, parent_execution_id, \
             idempotency_key, retry_count, started_at, completed_at, result, error, created_at, updated_at \
             FROM core_executions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;
        row.try_into()
    }

    async fn get_by_idempotency_key(&self, key: &str) -> StorageResult<Option<Execution>> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            "SELECT id, workflow, params, status, lane, trigger_source, parent_execution_id, \
             idempotency_key, retry_count, started_at, completed_at, result, error, created_at, updated_at \
             FROM core_executions WHERE idempotency_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Execution::try_from).transpose()
    }

    async fn list_executions(
        &self,
        workflow: Option<&str>,
        status: Option<ExecutionStatus>,
        lane: Option<&str>,
        page: PageSlice,
    ) -> StorageResult<(Vec<Execution>, i64)> {
        let (rows_sql, count_sql) =
            sql::list_executions(&self.dialect, workflow.is_some(), status.is_some(), lane.is_some());

        let mut rows_q = sqlx::query_as::<_, ExecutionRow>(&rows_sql);
        let mut count_q = sqlx::query(&count_sql);
        if let Some(w) = workflow {
            rows_q = rows_q.bind(w);
            count_q = count_q.bind(w);
        }
        if let Some(s) = status {
            rows_q = rows_q.bind(s.to_string());
            count_q = count_q.bind(s.to_string());
        }
        if let Some(l) = lane {
            rows_q = rows_q.bind(l);
            count_q = count_q.bind(l);
        }
        rows_q = rows_q.bind(page.limit).bind(page.offset);

        let rows = rows_q.fetch_all(&self.pool).await?;
        let total: i64 = count_q.fetch_one(&self.pool).await?.try_get(0)?;
        let executions = rows.into_iter().map(Execution::try_from).collect::<StorageResult<_>>()?;
        Ok((executions, total))
    }

    async fn create_execution(&self, execution: &Execution) -> StorageResult<Execution> {
        let row: ExecutionRow = sqlx::query_as(
            "INSERT INTO core_executions \
             (id, workflow, params, status, lane, trigger_source, parent_execution_id, idempotency_key, \
              retry_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id, workflow, params, status, lane, trigger_source, parent_execution_id, \
                       idempotency_key, retry_count, started_at, completed_at, result, error, created_at, updated_at",
        )
        .bind(&execution.id)
        .bind(&execution.workflow)
        .bind(&execution.params)
        .bind(execution.status.to_string())
        .bind(&execution.lane)
        .bind(execution.trigger_source.to_string())
        .bind(&execution.parent_execution_id)
        .bind(&execution.idempotency_key)
        .bind(execution.retry_count)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_status(
        &self,
        id: &str,
        next: ExecutionStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> StorageResult<Execution> {
        let started_at_expr = if next == ExecutionStatus::Running {
            "COALESCE(started_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))"
        } else {
            "started_at"
        };
        let completed_at_expr = if next.is_terminal() {
            "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
        } else {
            "completed_at"
        };
        let sql = format!(
            "UPDATE core_executions SET status = ?, result = COALESCE(?, result), error = COALESCE(?, error), \
             started_at = {started_at_expr}, completed_at = {completed_at_expr}, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
             WHERE id = ? \
             RETURNING id, workflow, params, status, lane, trigger_source, parent_execution_id, \
                       idempotency_key, retry_count, started_at, completed_at, result, error, created_at, updated_at"
        );
        let row: ExecutionRow = sqlx::query_as(&sql)
            .bind(next.to_string())
            .bind(result)
            .bind(error)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.try_into()
    }

    async fn add_event(&self, event: &ExecutionEvent) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO core_execution_events (execution_id, event_type, timestamp, data) VALUES (?, ?, ?, ?)",
        )
        .bind(&event.execution_id)
        .bind(event.event_type.to_string())
        .bind(event.timestamp)
        .bind(&event.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(&self, execution_id: &str, page: PageSlice) -> StorageResult<(Vec<ExecutionEvent>, i64)> {
        let (rows_sql, count_sql) = sql::list_events(&self.dialect);
        let rows = sqlx::query(&rows_sql)
            .bind(execution_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query(&count_sql)
            .bind(execution_id)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        let events = rows
            .into_iter()
            .map(|row| {
                Ok(ExecutionEvent {
                    execution_id: row.try_get("execution_id")?,
                    event_type: parse_event_type(row.try_get::<String, _>("event_type")?.as_str())?,
                    timestamp: row.try_get("timestamp")?,
                    data: row.try_get("data")?,
                })
            })
            .collect::<StorageResult<_>>()?;
        Ok((events, total))
    }
}

#[derive(FromRow)]
struct WorkItemRow {
    id: i64,
    domain: String,
    workflow: String,
    partition_key: serde_json::Value,
    desired_at: DateTime<Utc>,
    priority: i32,
    state: String,
    attempt_count: i32,
    max_attempts: i32,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    current_execution_id: Option<String>,
    latest_execution_id: Option<String>,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = StorageError;

    fn try_from(r: WorkItemRow) -> StorageResult<Self> {
        Ok(WorkItem {
            id: r.id,
            domain: r.domain,
            workflow: r.workflow,
            partition_key: r.partition_key,
            desired_at: r.desired_at,
            priority: r.priority,
            state: r.state.parse().map_err(StorageError::Unknown)?,
            attempt_count: r.attempt_count,
            max_attempts: r.max_attempts,
            last_error: r.last_error,
            last_error_at: r.last_error_at,
            next_attempt_at: r.next_attempt_at,
            current_execution_id: r.current_execution_id,
            latest_execution_id: r.latest_execution_id,
            locked_by: r.locked_by,
            locked_at: r.locked_at,
        })
    }
}

const WORK_ITEM_COLUMNS: &str = "id, domain, workflow, partition_key, desired_at, priority, state, \
     attempt_count, max_attempts, last_error, last_error_at, next_attempt_at, current_execution_id, \
     latest_execution_id, locked_by, locked_at";

#[async_trait]
impl WorkItemRepository for SqliteStore {
    async fn get_by_id(&self, id: i64) -> StorageResult<WorkItem> {
        let sql = format!("SELECT {WORK_ITEM_COLUMNS} FROM core_work_items WHERE id = ?");
        let row: WorkItemRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.try_into()
    }

    async fn list_items(
        &self,
        domain: Option<&str>,
        state: Option<WorkItemState>,
        page: PageSlice,
    ) -> StorageResult<(Vec<WorkItem>, i64)> {
        use crate::query::WhereBuilder;
        let where_clause = WhereBuilder::new()
            .eq_if(&self.dialect, "domain", domain.is_some())
            .eq_if(&self.dialect, "state", state.is_some())
            .build();
        let rows_sql =
            format!("SELECT {WORK_ITEM_COLUMNS} FROM core_work_items WHERE {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?");
        let count_sql = format!("SELECT COUNT(*) FROM core_work_items WHERE {where_clause}");

        let mut rows_q = sqlx::query_as::<_, WorkItemRow>(&rows_sql);
        let mut count_q = sqlx::query(&count_sql);
        if let Some(d) = domain {
            rows_q = rows_q.bind(d);
            count_q = count_q.bind(d);
        }
        if let Some(s) = state {
            rows_q = rows_q.bind(s.to_string());
            count_q = count_q.bind(s.to_string());
        }
        rows_q = rows_q.bind(page.limit).bind(page.offset);

        let rows = rows_q.fetch_all(&self.pool).await?;
        let total: i64 = count_q.fetch_one(&self.pool).await?.try_get(0)?;
        let items = rows.into_iter().map(WorkItem::try_from).collect::<StorageResult<_>>()?;
        Ok((items, total))
    }

    async fn enqueue(&self, item: &WorkItem) -> StorageResult<WorkItem> {
        let sql = format!(
            "INSERT INTO core_work_items (domain, workflow, partition_key, desired_at, priority, state, \
             attempt_count, max_attempts) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {WORK_ITEM_COLUMNS}"
        );
        let row: WorkItemRow = sqlx::query_as(&sql)
            .bind(&item.domain)
            .bind(&item.workflow)
            .bind(&item.partition_key)
            .bind(item.desired_at)
            .bind(item.priority)
            .bind(item.state.to_string())
            .bind(item.attempt_count)
            .bind(item.max_attempts)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn claim(&self, domain: &str, worker_id: &str, max_items: i64, now: DateTime<Utc>) -> StorageResult<Vec<WorkItem>> {
        // SQLite has no row-level locking; BEGIN IMMEDIATE takes the write
        // lock up front so the claim is still atomic under concurrent pollers.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT 1").execute(&mut *tx).await?;
        let claim_sql = sql::claim_work_items(&self.dialect, false);
        let rows: Vec<WorkItemRow> = sqlx::query_as(&claim_sql)
            .bind(domain)
            .bind(now)
            .bind(max_items)
            .bind(worker_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        rows.into_iter().map(WorkItem::try_from).collect()
    }

    async fn complete(&self, id: i64, execution_id: &str) -> StorageResult<WorkItem> {
        let sql = format!(
            "UPDATE core_work_items SET state = 'COMPLETE', current_execution_id = NULL, \
             latest_execution_id = ?, locked_by = NULL, locked_at = NULL WHERE id = ? \
             RETURNING {WORK_ITEM_COLUMNS}"
        );
        let row: WorkItemRow = sqlx::query_as(&sql)
            .bind(execution_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.try_into()
    }

    async fn fail(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> StorageResult<WorkItem> {
        let state = if next_attempt_at.is_some() { "RETRY_WAIT" } else { "FAILED" };
        let sql = format!(
            "UPDATE core_work_items SET state = ?, last_error = ?, \
             last_error_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), next_attempt_at = ?, \
             locked_by = NULL, locked_at = NULL WHERE id = ? \
             RETURNING {WORK_ITEM_COLUMNS}"
        );
        let row: WorkItemRow = sqlx::query_as(&sql)
            .bind(state)
            .bind(error)
            .bind(next_attempt_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.try_into()
    }

    async fn cancel(&self, id: i64) -> StorageResult<WorkItem> {
        let sql = format!(
            "UPDATE core_work_items SET state = 'CANCELLED', locked_by = NULL, locked_at = NULL \
             WHERE id = ? RETURNING {WORK_ITEM_COLUMNS}"
        );
        let row: WorkItemRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.try_into()
    }

    async fn retry_failed(&self, domain: Option<&str>, workflow: Option<&str>) -> StorageResult<i64> {
        let sql = sql::retry_failed_work_items(&self.dialect, domain.is_some(), workflow.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(d) = domain {
            query = query.bind(d);
        }
        if let Some(w) = workflow {
            query = query.bind(w);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() as i64)
    }
}

#[derive(FromRow)]
struct ManifestRowSql {
    domain: String,
    partition_key: serde_json::Value,
    stage: String,
    stage_rank: i32,
    row_count: i64,
    execution_id: String,
    batch_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<ManifestRowSql> for ManifestRow {
    fn from(r: ManifestRowSql) -> Self {
        ManifestRow {
            domain: r.domain,
            partition_key: r.partition_key,
            stage: r.stage,
            stage_rank: r.stage_rank,
            row_count: r.row_count,
            execution_id: r.execution_id,
            batch_id: r.batch_id,
            updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl ManifestRepository for SqliteStore {
    async fn upsert(&self, row: &ManifestRow) -> StorageResult<ManifestRow> {
        let upsert = self.dialect.upsert_clause(
            &["domain", "partition_key", "stage"],
            &[
                "stage_rank = excluded.stage_rank".to_string(),
                "row_count = excluded.row_count".to_string(),
                "execution_id = excluded.execution_id".to_string(),
                "batch_id = excluded.batch_id".to_string(),
                "updated_at = excluded.updated_at".to_string(),
            ],
        );
        let sql = format!(
            "INSERT INTO core_manifest (domain, partition_key, stage, stage_rank, row_count, execution_id, batch_id, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) {upsert} \
             RETURNING domain, partition_key, stage, stage_rank, row_count, execution_id, batch_id, updated_at"
        );
        let r: ManifestRowSql = sqlx::query_as(&sql)
            .bind(&row.domain)
            .bind(&row.partition_key)
            .bind(&row.stage)
            .bind(row.stage_rank)
            .bind(row.row_count)
            .bind(&row.execution_id)
            .bind(&row.batch_id)
            .bind(row.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(r.into())
    }

    async fn get(
        &self,
        domain: &str,
        partition_key: &serde_json::Value,
        stage: &str,
    ) -> StorageResult<Option<ManifestRow>> {
        let r: Option<ManifestRowSql> = sqlx::query_as(
            "SELECT domain, partition_key, stage, stage_rank, row_count, execution_id, batch_id, updated_at \
             FROM core_manifest WHERE domain = ? AND partition_key = ? AND stage = ?",
        )
        .bind(domain)
        .bind(partition_key)
        .bind(stage)
        .fetch_optional(&self.pool)
        .await?;
        Ok(r.map(Into::into))
    }

    async fn list_by_domain(&self, domain: &str, page: PageSlice) -> StorageResult<(Vec<ManifestRow>, i64)> {
        let (rows_sql, count_sql) = sql::list_by_domain(
            &self.dialect,
            "core_manifest",
            "domain, partition_key, stage, stage_rank, row_count, execution_id, batch_id, updated_at",
            "stage_rank ASC",
        );
        let rows: Vec<ManifestRowSql> = sqlx::query_as(&rows_sql)
            .bind(domain)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query(&count_sql).bind(domain).fetch_one(&self.pool).await?.try_get(0)?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

#[async_trait]
impl RejectRepository for SqliteStore {
    async fn insert(&self, row: &RejectRow) -> StorageResult<RejectRow> {
        let r: RejectRow = sqlx::query_as(
            "INSERT INTO core_rejects (domain, partition_key, stage, reason_code, reason_detail, raw_json, execution_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING domain, partition_key, stage, reason_code, reason_detail, raw_json, execution_id, created_at",
        )
        .bind(&row.domain)
        .bind(&row.partition_key)
        .bind(&row.stage)
        .bind(&row.reason_code)
        .bind(&row.reason_detail)
        .bind(&row.raw_json)
        .bind(&row.execution_id)
        .bind(row.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(r)
    }

    async fn list_by_domain(&self, domain: &str, page: PageSlice) -> StorageResult<(Vec<RejectRow>, i64)> {
        let (rows_sql, count_sql) = sql::list_by_domain(
            &self.dialect,
            "core_rejects",
            "domain, partition_key, stage, reason_code, reason_detail, raw_json, execution_id, created_at",
            "created_at DESC",
        );
        let rows: Vec<RejectRow> = sqlx::query_as(&rows_sql)
            .bind(domain)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query(&count_sql).bind(domain).fetch_one(&self.pool).await?.try_get(0)?;
        Ok((rows, total))
    }
}

#[derive(FromRow)]
struct DeadLetterRow {
    id: String,
    execution_id: String,
    workflow: String,
    params: serde_json::Value,
    error: String,
    retry_count: i32,
    max_retries: i32,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    replay_count: i32,
    created_at: DateTime<Utc>,
}

impl From<DeadLetterRow> for DeadLetter {
    fn from(r: DeadLetterRow) -> Self {
        DeadLetter {
            id: r.id,
            execution_id: r.execution_id,
            workflow: r.workflow,
            params: r.params,
            error: r.error,
            retry_count: r.retry_count,
            max_retries: r.max_retries,
            resolved_at: r.resolved_at,
            resolved_by: r.resolved_by,
            replay_count: r.replay_count,
            created_at: r.created_at,
        }
    }
}

const DLQ_COLUMNS: &str = "id, execution_id, workflow, params, error, retry_count, max_retries, \
     resolved_at, resolved_by, replay_count, created_at";

#[async_trait]
impl DeadLetterRepository for SqliteStore {
    async fn list_dead_letters(
        &self,
        workflow: Option<&str>,
        resolved: Option<bool>,
        page: PageSlice,
    ) -> StorageResult<(Vec<DeadLetter>, i64)> {
        use crate::query::WhereBuilder;
        let mut w = WhereBuilder::new().eq_if(&self.dialect, "workflow", workflow.is_some());
        let resolved_clause = resolved.map(|r| {
            if r {
                "resolved_at IS NOT NULL"
            } else {
                "resolved_at IS NULL"
            }
        });
        if let Some(clause) = resolved_clause {
            w = w.raw(clause);
        }
        let where_clause = w.build();
        let rows_sql = format!(
            "SELECT {DLQ_COLUMNS} FROM core_dead_letters WHERE {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let count_sql = format!("SELECT COUNT(*) FROM core_dead_letters WHERE {where_clause}");

        let mut rows_q = sqlx::query_as::<_, DeadLetterRow>(&rows_sql);
        let mut count_q = sqlx::query(&count_sql);
        if let Some(w) = workflow {
            rows_q = rows_q.bind(w);
            count_q = count_q.bind(w);
        }
        rows_q = rows_q.bind(page.limit).bind(page.offset);

        let rows = rows_q.fetch_all(&self.pool).await?;
        let total: i64 = count_q.fetch_one(&self.pool).await?.try_get(0)?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<DeadLetter> {
        let sql = format!("SELECT {DLQ_COLUMNS} FROM core_dead_letters WHERE id = ?");
        let row: DeadLetterRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.into())
    }

    async fn exists(&self, execution_id: &str) -> StorageResult<bool> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM core_dead_letters WHERE execution_id = ?")
            .bind(execution_id)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(count > 0)
    }

    async fn insert(&self, dlq: &DeadLetter) -> StorageResult<DeadLetter> {
        let sql = format!(
            "INSERT INTO core_dead_letters (id, execution_id, workflow, params, error, retry_count, max_retries, replay_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?) RETURNING {DLQ_COLUMNS}"
        );
        let row: DeadLetterRow = sqlx::query_as(&sql)
            .bind(&dlq.id)
            .bind(&dlq.execution_id)
            .bind(&dlq.workflow)
            .bind(&dlq.params)
            .bind(&dlq.error)
            .bind(dlq.retry_count)
            .bind(dlq.max_retries)
            .bind(dlq.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn increment_replay(&self, id: &str) -> StorageResult<DeadLetter> {
        let sql = format!(
            "UPDATE core_dead_letters SET replay_count = replay_count + 1 WHERE id = ? RETURNING {DLQ_COLUMNS}"
        );
        let row: DeadLetterRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.into())
    }

    async fn resolve(&self, id: &str, resolved_by: &str) -> StorageResult<DeadLetter> {
        let sql = format!(
            "UPDATE core_dead_letters SET resolved_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), resolved_by = ? \
             WHERE id = ? RETURNING {DLQ_COLUMNS}"
        );
        let row: DeadLetterRow = sqlx::query_as(&sql)
            .bind(resolved_by)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.into())
    }
}

#[async_trait]
impl QualityRepository for SqliteStore {
    async fn aggregate_by_workflow(&self, workflow: &str) -> StorageResult<Vec<QualityResultSummary>> {
        let rows: Vec<QualityResultSummary> = sqlx::query_as(
            "SELECT workflow, checks_passed, checks_failed, score, run_at FROM core_quality \
             WHERE workflow = ? ORDER BY run_at DESC",
        )
        .bind(workflow)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record(&self, summary: &QualityResultSummary) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO core_quality (workflow, checks_passed, checks_failed, score, run_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&summary.workflow)
        .bind(summary.checks_passed)
        .bind(summary.checks_failed)
        .bind(summary.score)
        .bind(summary.run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AnomalyRepository for SqliteStore {
    async fn insert(&self, row: &AnomalyRow) -> StorageResult<AnomalyRow> {
        let r: AnomalyRow = sqlx::query_as(
            "INSERT INTO core_anomalies (id, domain, anomaly_type, detail, severity, created_at) VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, domain, anomaly_type, detail, severity, created_at",
        )
        .bind(&row.id)
        .bind(&row.domain)
        .bind(&row.anomaly_type)
        .bind(&row.detail)
        .bind(&row.severity)
        .bind(row.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(r)
    }

    async fn list_by_domain(&self, domain: &str, page: PageSlice) -> StorageResult<(Vec<AnomalyRow>, i64)> {
        let (rows_sql, count_sql) = sql::list_by_domain(
            &self.dialect,
            "core_anomalies",
            "id, domain, anomaly_type, detail, severity, created_at",
            "created_at DESC",
        );
        let rows: Vec<AnomalyRow> = sqlx::query_as(&rows_sql)
            .bind(domain)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query(&count_sql).bind(domain).fetch_one(&self.pool).await?.try_get(0)?;
        Ok((rows, total))
    }
}

#[async_trait]
impl AlertRepository for SqliteStore {
    async fn list_channels(&self) -> StorageResult<Vec<AlertChannel>> {
        let rows: Vec<AlertChannel> = sqlx::query_as(
            "SELECT id, name, channel_type, config, enabled, created_at FROM core_alert_channels ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_channel(&self, channel: &AlertChannel) -> StorageResult<AlertChannel> {
        let r: AlertChannel = sqlx::query_as(
            "INSERT INTO core_alert_channels (id, name, channel_type, config, enabled, created_at) VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, name, channel_type, config, enabled, created_at",
        )
        .bind(&channel.id)
        .bind(&channel.name)
        .bind(&channel.channel_type)
        .bind(&channel.config)
        .bind(channel.enabled)
        .bind(channel.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(r)
    }

    async fn insert_alert(&self, alert: &Alert) -> StorageResult<Alert> {
        let r: Alert = sqlx::query_as(
            "INSERT INTO core_alerts (id, domain, severity, message, detail, created_at) VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, domain, severity, message, detail, created_at",
        )
        .bind(&alert.id)
        .bind(&alert.domain)
        .bind(&alert.severity)
        .bind(&alert.message)
        .bind(&alert.detail)
        .bind(alert.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(r)
    }

    async fn list_alerts(&self, domain: Option<&str>, page: PageSlice) -> StorageResult<(Vec<Alert>, i64)> {
        use crate::query::WhereBuilder;
        let where_clause = WhereBuilder::new().eq_if(&self.dialect, "domain", domain.is_some()).build();
        let rows_sql = format!(
            "SELECT id, domain, severity, message, detail, created_at FROM core_alerts WHERE {where_clause} \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let count_sql = format!("SELECT COUNT(*) FROM core_alerts WHERE {where_clause}");
        let mut rows_q = sqlx::query_as::<_, Alert>(&rows_sql);
        let mut count_q = sqlx::query(&count_sql);
        if let Some(d) = domain {
            rows_q = rows_q.bind(d);
            count_q = count_q.bind(d);
        }
        rows_q = rows_q.bind(page.limit).bind(page.offset);
        let rows = rows_q.fetch_all(&self.pool).await?;
        let total: i64 = count_q.fetch_one(&self.pool).await?.try_get(0)?;
        Ok((rows, total))
    }

    async fn record_delivery(&self, delivery: &AlertDelivery) -> StorageResult<AlertDelivery> {
        let r: AlertDeliveryRow = sqlx::query_as(
            "INSERT INTO core_alert_deliveries (id, alert_id, channel_id, status, attempted_at) VALUES (?, ?, ?, ?, ?) \
             RETURNING id, alert_id, channel_id, status, attempted_at",
        )
        .bind(&delivery.id)
        .bind(&delivery.alert_id)
        .bind(&delivery.channel_id)
        .bind(delivery_status_str(delivery.status))
        .bind(delivery.attempted_at)
        .fetch_one(&self.pool)
        .await?;
        r.try_into()
    }
}

#[derive(FromRow)]
struct AlertDeliveryRow {
    id: String,
    alert_id: String,
    channel_id: String,
    status: String,
    attempted_at: DateTime<Utc>,
}

impl TryFrom<AlertDeliveryRow> for AlertDelivery {
    type Error = StorageError;

    fn try_from(r: AlertDeliveryRow) -> StorageResult<Self> {
        Ok(AlertDelivery {
            id: r.id,
            alert_id: r.alert_id,
            channel_id: r.channel_id,
            status: parse_delivery_status(&r.status)?,
            attempted_at: r.attempted_at,
        })
    }
}

fn delivery_status_str(s: AlertDeliveryStatus) -> &'static str {
    match s {
        AlertDeliveryStatus::Pending => "PENDING",
        AlertDeliveryStatus::Sent => "SENT",
        AlertDeliveryStatus::Failed => "FAILED",
    }
}

fn parse_delivery_status(s: &str) -> StorageResult<AlertDeliveryStatus> {
    Ok(match s {
        "PENDING" => AlertDeliveryStatus::Pending,
        "SENT" => AlertDeliveryStatus::Sent,
        "FAILED" => AlertDeliveryStatus::Failed,
        other => return Err(StorageError::Unknown(format!("unknown alert delivery status: {other}"))),
    })
}

#[async_trait]
impl SourceRepository for SqliteStore {
    async fn list_sources(&self) -> StorageResult<Vec<Source>> {
        let rows: Vec<Source> =
            sqlx::query_as("SELECT id, name, source_type, config, enabled FROM core_sources ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn get_source(&self, id: &str) -> StorageResult<Source> {
        let r: Source = sqlx::query_as("SELECT id, name, source_type, config, enabled FROM core_sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(r)
    }

    async fn record_fetch(&self, fetch: &SourceFetch) -> StorageResult<SourceFetch> {
        let r: SourceFetch = sqlx::query_as(
            "INSERT INTO core_source_fetches (id, source_id, fetched_at, row_count, status) VALUES (?, ?, ?, ?, ?) \
             RETURNING id, source_id, fetched_at, row_count, status",
        )
        .bind(&fetch.id)
        .bind(&fetch.source_id)
        .bind(fetch.fetched_at)
        .bind(fetch.row_count)
        .bind(&fetch.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(r)
    }

    async fn list_fetches(&self, source_id: &str, page: PageSlice) -> StorageResult<(Vec<SourceFetch>, i64)> {
        let rows: Vec<SourceFetch> = sqlx::query_as(
            "SELECT id, source_id, fetched_at, row_count, status FROM core_source_fetches \
             WHERE source_id = ? ORDER BY fetched_at DESC LIMIT ? OFFSET ?",
        )
        .bind(source_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query("SELECT COUNT(*) FROM core_source_fetches WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok((rows, total))
    }
}

#[derive(FromRow)]
struct ScheduleRow {
    id: String,
    name: String,
    target_type: String,
    target_name: String,
    cron_expression: Option<String>,
    interval_seconds: Option<i64>,
    timezone: String,
    enabled: bool,
    max_instances: i32,
    misfire_grace_seconds: i64,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
}

impl From<ScheduleRow> for Schedule {
    fn from(r: ScheduleRow) -> Self {
        Schedule {
            id: r.id,
            name: r.name,
            target_type: if r.target_type == "workflow" {
                ScheduleTargetType::Workflow
            } else {
                ScheduleTargetType::Operation
            },
            target_name: r.target_name,
            cron_expression: r.cron_expression,
            interval_seconds: r.interval_seconds,
            timezone: r.timezone,
            enabled: r.enabled,
            max_instances: r.max_instances,
            misfire_grace_seconds: r.misfire_grace_seconds,
            last_run_at: r.last_run_at,
            next_run_at: r.next_run_at,
        }
    }
}

const SCHEDULE_COLUMNS: &str = "id, name, target_type, target_name, cron_expression, interval_seconds, \
     timezone, enabled, max_instances, misfire_grace_seconds, last_run_at, next_run_at";

#[async_trait]
impl ScheduleRepository for SqliteStore {
    async fn list_enabled(&self) -> StorageResult<Vec<Schedule>> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM core_schedules WHERE enabled = 1");
        let rows: Vec<ScheduleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<Schedule> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM core_schedules WHERE id = ?");
        let row: ScheduleRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.into())
    }

    async fn create(&self, schedule: &Schedule) -> StorageResult<Schedule> {
        let target_type = match schedule.target_type {
            ScheduleTargetType::Operation => "operation",
            ScheduleTargetType::Workflow => "workflow",
        };
        let sql = format!(
            "INSERT INTO core_schedules (id, name, target_type, target_name, cron_expression, interval_seconds, \
             timezone, enabled, max_instances, misfire_grace_seconds) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {SCHEDULE_COLUMNS}"
        );
        let row: ScheduleRow = sqlx::query_as(&sql)
            .bind(&schedule.id)
            .bind(&schedule.name)
            .bind(target_type)
            .bind(&schedule.target_name)
            .bind(&schedule.cron_expression)
            .bind(schedule.interval_seconds)
            .bind(&schedule.timezone)
            .bind(schedule.enabled)
            .bind(schedule.max_instances)
            .bind(schedule.misfire_grace_seconds)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_next_run(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> StorageResult<Schedule> {
        let sql = format!(
            "UPDATE core_schedules SET last_run_at = ?, next_run_at = ? WHERE id = ? RETURNING {SCHEDULE_COLUMNS}"
        );
        let row: ScheduleRow = sqlx::query_as(&sql)
            .bind(last_run_at)
            .bind(next_run_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.into())
    }

    async fn record_run(&self, run: &ScheduleRun) -> StorageResult<ScheduleRun> {
        let outcome = schedule_run_outcome_str(run.outcome);
        let r: ScheduleRunRow = sqlx::query_as(
            "INSERT INTO core_schedule_runs (id, schedule_id, occurrence_at, execution_id, outcome, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id, schedule_id, occurrence_at, execution_id, outcome, created_at",
        )
        .bind(&run.id)
        .bind(&run.schedule_id)
        .bind(run.occurrence_at)
        .bind(&run.execution_id)
        .bind(outcome)
        .bind(run.created_at)
        .fetch_one(&self.pool)
        .await?;
        r.try_into()
    }

    async fn list_runs(&self, schedule_id: &str, page: PageSlice) -> StorageResult<(Vec<ScheduleRun>, i64)> {
        let rows: Vec<ScheduleRunRow> = sqlx::query_as(
            "SELECT id, schedule_id, occurrence_at, execution_id, outcome, created_at FROM core_schedule_runs \
             WHERE schedule_id = ? ORDER BY occurrence_at DESC LIMIT ? OFFSET ?",
        )
        .bind(schedule_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query("SELECT COUNT(*) FROM core_schedule_runs WHERE schedule_id = ?")
            .bind(schedule_id)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        let rows = rows.into_iter().map(TryInto::try_into).collect::<StorageResult<Vec<_>>>()?;
        Ok((rows, total))
    }

    async fn acquire_schedule_lock(
        &self,
        schedule_id: &str,
        locked_by: &str,
        ttl_seconds: i64,
    ) -> StorageResult<Option<ScheduleLock>> {
        let sql = format!(
            "INSERT INTO core_schedule_locks (schedule_id, locked_by, locked_at, expires_at) \
             VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), datetime('now', '+{ttl_seconds} seconds')) \
             ON CONFLICT(schedule_id) DO UPDATE SET locked_by = excluded.locked_by, locked_at = excluded.locked_at, \
             expires_at = excluded.expires_at WHERE core_schedule_locks.expires_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
             RETURNING schedule_id, locked_by, locked_at, expires_at"
        );
        let row: Option<ScheduleLock> = sqlx::query_as(&sql)
            .bind(schedule_id)
            .bind(locked_by)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn release_schedule_lock(&self, schedule_id: &str, locked_by: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM core_schedule_locks WHERE schedule_id = ? AND locked_by = ?")
            .bind(schedule_id)
            .bind(locked_by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn schedule_run_outcome_str(o: ScheduleRunOutcome) -> &'static str {
    match o {
        ScheduleRunOutcome::Dispatched => "DISPATCHED",
        ScheduleRunOutcome::Missed => "MISSED",
        ScheduleRunOutcome::SkippedMaxInstances => "SKIPPED_MAX_INSTANCES",
    }
}

fn parse_schedule_run_outcome(s: &str) -> StorageResult<ScheduleRunOutcome> {
    Ok(match s {
        "DISPATCHED" => ScheduleRunOutcome::Dispatched,
        "MISSED" => ScheduleRunOutcome::Missed,
        "SKIPPED_MAX_INSTANCES" => ScheduleRunOutcome::SkippedMaxInstances,
        other => return Err(StorageError::Unknown(format!("unknown schedule run outcome: {other}"))),
    })
}

#[derive(FromRow)]
struct ScheduleRunRow {
    id: String,
    schedule_id: String,
    occurrence_at: DateTime<Utc>,
    execution_id: Option<String>,
    outcome: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRunRow> for ScheduleRun {
    type Error = StorageError;

    fn try_from(r: ScheduleRunRow) -> StorageResult<Self> {
        Ok(ScheduleRun {
            id: r.id,
            schedule_id: r.schedule_id,
            occurrence_at: r.occurrence_at,
            execution_id: r.execution_id,
            outcome: parse_schedule_run_outcome(&r.outcome)?,
            created_at: r.created_at,
        })
    }
}

#[async_trait]
impl LockRepository for SqliteStore {
    async fn list_locks(&self) -> StorageResult<Vec<ConcurrencyLock>> {
        let rows: Vec<ConcurrencyLock> =
            sqlx::query_as("SELECT lock_key, execution_id, acquired_at, expires_at FROM core_concurrency_locks")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn acquire(
        &self,
        lock_key: &str,
        execution_id: &str,
        ttl_seconds: i64,
    ) -> StorageResult<Option<ConcurrencyLock>> {
        let sql = format!(
            "INSERT INTO core_concurrency_locks (lock_key, execution_id, acquired_at, expires_at) \
             VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), datetime('now', '+{ttl_seconds} seconds')) \
             ON CONFLICT(lock_key) DO UPDATE SET execution_id = excluded.execution_id, acquired_at = excluded.acquired_at, \
             expires_at = excluded.expires_at \
             WHERE core_concurrency_locks.expires_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now') OR core_concurrency_locks.execution_id = excluded.execution_id \
             RETURNING lock_key, execution_id, acquired_at, expires_at"
        );
        let row: Option<ConcurrencyLock> = sqlx::query_as(&sql)
            .bind(lock_key)
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn extend(&self, lock_key: &str, execution_id: &str, ttl_seconds: i64) -> StorageResult<ConcurrencyLock> {
        let sql = format!(
            "UPDATE core_concurrency_locks SET expires_at = datetime('now', '+{ttl_seconds} seconds') \
             WHERE lock_key = ? AND execution_id = ? \
             RETURNING lock_key, execution_id, acquired_at, expires_at"
        );
        let row: ConcurrencyLock = sqlx::query_as(&sql)
            .bind(lock_key)
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row)
    }

    async fn release(&self, lock_key: &str, execution_id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM core_concurrency_locks WHERE lock_key = ? AND execution_id = ?")
            .bind(lock_key)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
