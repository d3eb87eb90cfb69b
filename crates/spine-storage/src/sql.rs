//! SQL text shared by `sqlite.rs` and `postgres.rs`. Every function here
//! takes `&dyn Dialect` and composes its placeholders through it — this is
//! what keeps the "never format placeholders literally" rule (spec.md §4.1)
//! honest even though two concrete stores exist.

use crate::dialect::Dialect;
use crate::query::WhereBuilder;

pub fn list_executions(dialect: &dyn Dialect, workflow: bool, status: bool, lane: bool) -> (String, String) {
    let mut w = WhereBuilder::new()
        .eq_if(dialect, "workflow", workflow)
        .eq_if(dialect, "status", status)
        .eq_if(dialect, "lane", lane);
    let limit_ph = w.next_placeholder(dialect);
    let offset_ph = w.next_placeholder(dialect);
    let where_clause = w.build();
    let rows = format!(
        "SELECT id, workflow, params, status, lane, trigger_source, parent_execution_id, \
         idempotency_key, retry_count, started_at, completed_at, result, error, created_at, updated_at \
         FROM core_executions WHERE {where_clause} ORDER BY id DESC LIMIT {limit_ph} OFFSET {offset_ph}"
    );
    let count = format!("SELECT COUNT(*) FROM core_executions WHERE {where_clause}");
    (rows, count)
}

pub fn list_events(dialect: &dyn Dialect) -> (String, String) {
    let p1 = dialect.ph(1);
    let p2 = dialect.ph(2);
    let p3 = dialect.ph(3);
    let rows = format!(
        "SELECT execution_id, event_type, timestamp, data FROM core_execution_events \
         WHERE execution_id = {p1} ORDER BY timestamp ASC LIMIT {p2} OFFSET {p3}"
    );
    let count = format!("SELECT COUNT(*) FROM core_execution_events WHERE execution_id = {p1}");
    (rows, count)
}

/// The claim query: `FOR UPDATE SKIP LOCKED` on Postgres, `BEGIN IMMEDIATE`
/// single-writer semantics on SQLite (see sqlite.rs's transaction wrapper).
/// Grounded in `durable/src/persistence/postgres.rs::claim_task`.
pub fn claim_work_items(dialect: &dyn Dialect, skip_locked: bool) -> String {
    let p_domain = dialect.ph(1);
    let p_now = dialect.ph(2);
    let p_limit = dialect.ph(3);
    let p_worker = dialect.ph(4);
    let lock_clause = if skip_locked { "FOR UPDATE SKIP LOCKED" } else { "" };
    format!(
        "WITH claimable AS (
            SELECT id FROM core_work_items
            WHERE domain = {p_domain}
              AND (
                (state = 'PENDING' AND desired_at <= {p_now})
                OR (state = 'RETRY_WAIT' AND next_attempt_at <= {p_now})
              )
            ORDER BY priority DESC, desired_at ASC
            LIMIT {p_limit}
            {lock_clause}
        )
        UPDATE core_work_items
        SET state = 'RUNNING', locked_by = {p_worker}, locked_at = {now}, attempt_count = attempt_count + 1
        WHERE id IN (SELECT id FROM claimable)
        RETURNING id, domain, workflow, partition_key, desired_at, priority, state, attempt_count, \
                  max_attempts, last_error, last_error_at, next_attempt_at, current_execution_id, \
                  latest_execution_id, locked_by, locked_at",
        now = dialect.now_expr(),
    )
}

/// Bulk-resets terminal FAILED work items back to PENDING (spec.md §4.2
/// `retry_failed(filter) → count`), clearing the failure bookkeeping so the
/// item gets a fresh attempt budget on its next claim.
pub fn retry_failed_work_items(dialect: &dyn Dialect, domain: bool, workflow: bool) -> String {
    let w = WhereBuilder::new()
        .raw("state = 'FAILED'")
        .eq_if(dialect, "domain", domain)
        .eq_if(dialect, "workflow", workflow);
    let where_clause = w.build();
    format!(
        "UPDATE core_work_items \
         SET state = 'PENDING', attempt_count = 0, last_error = NULL, last_error_at = NULL, \
             next_attempt_at = NULL, locked_by = NULL, locked_at = NULL \
         WHERE {where_clause}"
    )
}

pub fn list_by_domain(dialect: &dyn Dialect, table: &str, columns: &str, order_by: &str) -> (String, String) {
    let p_domain = dialect.ph(1);
    let p_limit = dialect.ph(2);
    let p_offset = dialect.ph(3);
    let rows = format!(
        "SELECT {columns} FROM {table} WHERE domain = {p_domain} ORDER BY {order_by} LIMIT {p_limit} OFFSET {p_offset}"
    );
    let count = format!("SELECT COUNT(*) FROM {table} WHERE domain = {p_domain}");
    (rows, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};

    #[test]
    fn list_executions_sqlite_uses_question_marks_throughout() {
        let d = SqliteDialect;
        let (rows, count) = list_executions(&d, true, false, true);
        assert!(rows.contains("workflow = ?"));
        assert!(rows.contains("lane = ?"));
        assert!(!rows.contains("status"));
        assert!(count.contains("WHERE workflow = ? AND lane = ?"));
    }

    #[test]
    fn list_executions_postgres_numbers_placeholders_in_call_order() {
        let d = PostgresDialect;
        let (rows, _count) = list_executions(&d, true, true, false);
        assert!(rows.contains("workflow = $1"));
        assert!(rows.contains("status = $2"));
        assert!(rows.contains("LIMIT $3 OFFSET $4"));
    }

    #[test]
    fn claim_work_items_matches_pending_and_due_retry_wait() {
        let d = SqliteDialect;
        let sql = claim_work_items(&d, false);
        assert!(sql.contains("state = 'PENDING' AND desired_at <= ?"));
        assert!(sql.contains("state = 'RETRY_WAIT' AND next_attempt_at <= ?"));
    }

    #[test]
    fn retry_failed_work_items_scopes_to_provided_filters_only() {
        let d = SqliteDialect;
        let no_filter = retry_failed_work_items(&d, false, false);
        assert!(no_filter.contains("WHERE state = 'FAILED'"));
        assert!(!no_filter.contains("domain ="));

        let both = retry_failed_work_items(&d, true, true);
        assert!(both.contains("domain = ?"));
        assert!(both.contains("workflow = ?"));
        assert!(both.contains("state = 'PENDING'"));
        assert!(both.contains("attempt_count = 0"));
    }
}
