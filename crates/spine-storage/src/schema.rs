//! Schema bootstrap (spec.md §2 component 12): canonical DDL for every
//! `core_*` table plus the `_migrations` ledger. Grounded in the teacher's
//! single-file bootstrap convention (`everruns-storage` applies its schema
//! as one ordered list of `CREATE TABLE IF NOT EXISTS` statements rather
//! than a migration-file directory) adapted to two dialects: each
//! statement is written twice, once per backend, because JSON columns and
//! autoincrement syntax diverge (spec.md §9 "SQL dialect differences").
//!
//! `_migrations(filename, applied_at)` records which of these statements
//! have already run, so `bootstrap` is idempotent and safe to call on
//! every process start.

use sqlx::{PgPool, SqlitePool};

use crate::error::StorageResult;

/// One entry per logical migration. `name` is the `_migrations.filename`
/// key; `sqlite`/`postgres` are the two dialect-specific statement bodies.
struct Migration {
    name: &'static str,
    sqlite: &'static str,
    postgres: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_core_executions",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_executions (
                id TEXT PRIMARY KEY,
                workflow TEXT NOT NULL,
                params TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL,
                lane TEXT NOT NULL DEFAULT 'default',
                trigger_source TEXT NOT NULL,
                parent_execution_id TEXT,
                idempotency_key TEXT UNIQUE,
                retry_count INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                completed_at TEXT,
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS ix_core_executions_workflow ON core_executions(workflow);
            CREATE INDEX IF NOT EXISTS ix_core_executions_status ON core_executions(status);
            CREATE INDEX IF NOT EXISTS ix_core_executions_lane ON core_executions(lane);
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_executions (
                id TEXT PRIMARY KEY,
                workflow TEXT NOT NULL,
                params JSONB NOT NULL DEFAULT '{}',
                status TEXT NOT NULL,
                lane TEXT NOT NULL DEFAULT 'default',
                trigger_source TEXT NOT NULL,
                parent_execution_id TEXT,
                idempotency_key TEXT UNIQUE,
                retry_count INTEGER NOT NULL DEFAULT 0,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                result JSONB,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ix_core_executions_workflow ON core_executions(workflow);
            CREATE INDEX IF NOT EXISTS ix_core_executions_status ON core_executions(status);
            CREATE INDEX IF NOT EXISTS ix_core_executions_lane ON core_executions(lane);
        "#,
    },
    Migration {
        name: "0002_core_execution_events",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_execution_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execution_id TEXT NOT NULL REFERENCES core_executions(id),
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS ix_core_execution_events_exec ON core_execution_events(execution_id, timestamp ASC);
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_execution_events (
                id BIGSERIAL PRIMARY KEY,
                execution_id TEXT NOT NULL REFERENCES core_executions(id),
                event_type TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS ix_core_execution_events_exec ON core_execution_events(execution_id, timestamp ASC);
        "#,
    },
    Migration {
        name: "0003_core_work_items",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_work_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                workflow TEXT NOT NULL,
                partition_key TEXT NOT NULL DEFAULT '{}',
                desired_at TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'PENDING',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                last_error TEXT,
                last_error_at TEXT,
                next_attempt_at TEXT,
                current_execution_id TEXT,
                latest_execution_id TEXT,
                locked_by TEXT,
                locked_at TEXT,
                UNIQUE(domain, workflow, partition_key)
            );
            CREATE INDEX IF NOT EXISTS ix_core_work_items_claim ON core_work_items(domain, state, priority DESC, desired_at ASC);
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_work_items (
                id BIGSERIAL PRIMARY KEY,
                domain TEXT NOT NULL,
                workflow TEXT NOT NULL,
                partition_key JSONB NOT NULL DEFAULT '{}',
                desired_at TIMESTAMPTZ NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'PENDING',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                last_error TEXT,
                last_error_at TIMESTAMPTZ,
                next_attempt_at TIMESTAMPTZ,
                current_execution_id TEXT,
                latest_execution_id TEXT,
                locked_by TEXT,
                locked_at TIMESTAMPTZ,
                UNIQUE(domain, workflow, partition_key)
            );
            CREATE INDEX IF NOT EXISTS ix_core_work_items_claim ON core_work_items(domain, state, priority DESC, desired_at ASC);
        "#,
    },
    Migration {
        name: "0004_core_concurrency_locks",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_concurrency_locks (
                lock_key TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_concurrency_locks (
                lock_key TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                acquired_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            );
        "#,
    },
    Migration {
        name: "0005_core_dead_letters",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_dead_letters (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                workflow TEXT NOT NULL,
                params TEXT NOT NULL DEFAULT '{}',
                error TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                max_retries INTEGER NOT NULL,
                resolved_at TEXT,
                resolved_by TEXT,
                replay_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS ix_core_dead_letters_workflow ON core_dead_letters(workflow, resolved_at);
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_dead_letters (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                workflow TEXT NOT NULL,
                params JSONB NOT NULL DEFAULT '{}',
                error TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                max_retries INTEGER NOT NULL,
                resolved_at TIMESTAMPTZ,
                resolved_by TEXT,
                replay_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ix_core_dead_letters_workflow ON core_dead_letters(workflow, resolved_at);
        "#,
    },
    Migration {
        name: "0006_core_manifest_and_rejects",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_manifest (
                domain TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                stage TEXT NOT NULL,
                stage_rank INTEGER NOT NULL,
                row_count INTEGER NOT NULL,
                execution_id TEXT NOT NULL,
                batch_id TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (domain, partition_key, stage)
            );
            CREATE TABLE IF NOT EXISTS core_rejects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                stage TEXT NOT NULL,
                reason_code TEXT NOT NULL,
                reason_detail TEXT,
                raw_json TEXT NOT NULL DEFAULT '{}',
                execution_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS ix_core_rejects_domain ON core_rejects(domain, created_at DESC);
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_manifest (
                domain TEXT NOT NULL,
                partition_key JSONB NOT NULL,
                stage TEXT NOT NULL,
                stage_rank INTEGER NOT NULL,
                row_count BIGINT NOT NULL,
                execution_id TEXT NOT NULL,
                batch_id TEXT,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (domain, partition_key, stage)
            );
            CREATE TABLE IF NOT EXISTS core_rejects (
                id BIGSERIAL PRIMARY KEY,
                domain TEXT NOT NULL,
                partition_key JSONB NOT NULL,
                stage TEXT NOT NULL,
                reason_code TEXT NOT NULL,
                reason_detail TEXT,
                raw_json JSONB NOT NULL DEFAULT '{}',
                execution_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ix_core_rejects_domain ON core_rejects(domain, created_at DESC);
        "#,
    },
    Migration {
        name: "0007_core_quality_and_anomalies",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_quality (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workflow TEXT NOT NULL,
                checks_passed INTEGER NOT NULL,
                checks_failed INTEGER NOT NULL,
                score REAL NOT NULL,
                run_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_core_quality_workflow ON core_quality(workflow, run_at DESC);
            CREATE TABLE IF NOT EXISTS core_anomalies (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                anomaly_type TEXT NOT NULL,
                detail TEXT NOT NULL DEFAULT '{}',
                severity TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS ix_core_anomalies_domain ON core_anomalies(domain, created_at DESC);
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_quality (
                id BIGSERIAL PRIMARY KEY,
                workflow TEXT NOT NULL,
                checks_passed BIGINT NOT NULL,
                checks_failed BIGINT NOT NULL,
                score DOUBLE PRECISION NOT NULL,
                run_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_core_quality_workflow ON core_quality(workflow, run_at DESC);
            CREATE TABLE IF NOT EXISTS core_anomalies (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                anomaly_type TEXT NOT NULL,
                detail JSONB NOT NULL DEFAULT '{}',
                severity TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ix_core_anomalies_domain ON core_anomalies(domain, created_at DESC);
        "#,
    },
    Migration {
        name: "0008_core_alerts",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_alert_channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                channel_type TEXT NOT NULL,
                config TEXT NOT NULL DEFAULT '{}',
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE TABLE IF NOT EXISTS core_alerts (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                detail TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS ix_core_alerts_domain ON core_alerts(domain, created_at DESC);
            CREATE TABLE IF NOT EXISTS core_alert_deliveries (
                id TEXT PRIMARY KEY,
                alert_id TEXT NOT NULL REFERENCES core_alerts(id),
                channel_id TEXT NOT NULL REFERENCES core_alert_channels(id),
                status TEXT NOT NULL,
                attempted_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS core_alert_throttle (
                alert_key TEXT PRIMARY KEY,
                last_sent_at TEXT NOT NULL,
                count_in_window INTEGER NOT NULL DEFAULT 1
            );
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_alert_channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                channel_type TEXT NOT NULL,
                config JSONB NOT NULL DEFAULT '{}',
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS core_alerts (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                detail JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ix_core_alerts_domain ON core_alerts(domain, created_at DESC);
            CREATE TABLE IF NOT EXISTS core_alert_deliveries (
                id TEXT PRIMARY KEY,
                alert_id TEXT NOT NULL REFERENCES core_alerts(id),
                channel_id TEXT NOT NULL REFERENCES core_alert_channels(id),
                status TEXT NOT NULL,
                attempted_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS core_alert_throttle (
                alert_key TEXT PRIMARY KEY,
                last_sent_at TIMESTAMPTZ NOT NULL,
                count_in_window INTEGER NOT NULL DEFAULT 1
            );
        "#,
    },
    Migration {
        name: "0009_core_sources",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                source_type TEXT NOT NULL,
                config TEXT NOT NULL DEFAULT '{}',
                enabled INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS core_source_fetches (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES core_sources(id),
                fetched_at TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_core_source_fetches_src ON core_source_fetches(source_id, fetched_at DESC);
            CREATE TABLE IF NOT EXISTS core_source_cache (
                source_id TEXT NOT NULL REFERENCES core_sources(id),
                cache_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (source_id, cache_key)
            );
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                source_type TEXT NOT NULL,
                config JSONB NOT NULL DEFAULT '{}',
                enabled BOOLEAN NOT NULL DEFAULT TRUE
            );
            CREATE TABLE IF NOT EXISTS core_source_fetches (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES core_sources(id),
                fetched_at TIMESTAMPTZ NOT NULL,
                row_count BIGINT NOT NULL,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_core_source_fetches_src ON core_source_fetches(source_id, fetched_at DESC);
            CREATE TABLE IF NOT EXISTS core_source_cache (
                source_id TEXT NOT NULL REFERENCES core_sources(id),
                cache_key TEXT NOT NULL,
                payload JSONB NOT NULL,
                cached_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (source_id, cache_key)
            );
        "#,
    },
    Migration {
        name: "0010_core_schedules",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_schedules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                target_type TEXT NOT NULL,
                target_name TEXT NOT NULL,
                cron_expression TEXT,
                interval_seconds INTEGER,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                enabled INTEGER NOT NULL DEFAULT 1,
                max_instances INTEGER NOT NULL DEFAULT 1,
                misfire_grace_seconds INTEGER NOT NULL DEFAULT 120,
                last_run_at TEXT,
                next_run_at TEXT
            );
            CREATE TABLE IF NOT EXISTS core_schedule_runs (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL REFERENCES core_schedules(id),
                occurrence_at TEXT NOT NULL,
                execution_id TEXT,
                outcome TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE INDEX IF NOT EXISTS ix_core_schedule_runs_sched ON core_schedule_runs(schedule_id, occurrence_at DESC);
            CREATE TABLE IF NOT EXISTS core_schedule_locks (
                schedule_id TEXT PRIMARY KEY,
                locked_by TEXT NOT NULL,
                locked_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_schedules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                target_type TEXT NOT NULL,
                target_name TEXT NOT NULL,
                cron_expression TEXT,
                interval_seconds BIGINT,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                max_instances INTEGER NOT NULL DEFAULT 1,
                misfire_grace_seconds BIGINT NOT NULL DEFAULT 120,
                last_run_at TIMESTAMPTZ,
                next_run_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS core_schedule_runs (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL REFERENCES core_schedules(id),
                occurrence_at TIMESTAMPTZ NOT NULL,
                execution_id TEXT,
                outcome TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS ix_core_schedule_runs_sched ON core_schedule_runs(schedule_id, occurrence_at DESC);
            CREATE TABLE IF NOT EXISTS core_schedule_locks (
                schedule_id TEXT PRIMARY KEY,
                locked_by TEXT NOT NULL,
                locked_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            );
        "#,
    },
    Migration {
        name: "0011_core_workflow_runs",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_workflow_runs (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL REFERENCES core_executions(id),
                workflow_name TEXT NOT NULL,
                status TEXT NOT NULL,
                error_step TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE TABLE IF NOT EXISTS core_workflow_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workflow_run_id TEXT NOT NULL REFERENCES core_workflow_runs(id),
                step_name TEXT NOT NULL,
                status TEXT NOT NULL,
                output TEXT,
                error TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_core_workflow_steps_run ON core_workflow_steps(workflow_run_id);
            CREATE TABLE IF NOT EXISTS core_workflow_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workflow_run_id TEXT NOT NULL REFERENCES core_workflow_runs(id),
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}'
            );
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_workflow_runs (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL REFERENCES core_executions(id),
                workflow_name TEXT NOT NULL,
                status TEXT NOT NULL,
                error_step TEXT,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS core_workflow_steps (
                id BIGSERIAL PRIMARY KEY,
                workflow_run_id TEXT NOT NULL REFERENCES core_workflow_runs(id),
                step_name TEXT NOT NULL,
                status TEXT NOT NULL,
                output JSONB,
                error TEXT,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_core_workflow_steps_run ON core_workflow_steps(workflow_run_id);
            CREATE TABLE IF NOT EXISTS core_workflow_events (
                id BIGSERIAL PRIMARY KEY,
                workflow_run_id TEXT NOT NULL REFERENCES core_workflow_runs(id),
                event_type TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL DEFAULT '{}'
            );
        "#,
    },
    Migration {
        name: "0012_core_database_connections_and_calc",
        sqlite: r#"
            CREATE TABLE IF NOT EXISTS core_database_connections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                dialect TEXT NOT NULL,
                dsn_ref TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            CREATE TABLE IF NOT EXISTS core_calc_dependencies (
                domain TEXT NOT NULL,
                depends_on_domain TEXT NOT NULL,
                PRIMARY KEY (domain, depends_on_domain)
            );
            CREATE TABLE IF NOT EXISTS core_expected_schedules (
                domain TEXT PRIMARY KEY,
                cron_expression TEXT NOT NULL,
                timezone TEXT NOT NULL DEFAULT 'UTC'
            );
            CREATE TABLE IF NOT EXISTS core_data_readiness (
                domain TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                ready INTEGER NOT NULL DEFAULT 0,
                checked_at TEXT NOT NULL,
                PRIMARY KEY (domain, partition_key)
            );
        "#,
        postgres: r#"
            CREATE TABLE IF NOT EXISTS core_database_connections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                dialect TEXT NOT NULL,
                dsn_ref TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS core_calc_dependencies (
                domain TEXT NOT NULL,
                depends_on_domain TEXT NOT NULL,
                PRIMARY KEY (domain, depends_on_domain)
            );
            CREATE TABLE IF NOT EXISTS core_expected_schedules (
                domain TEXT PRIMARY KEY,
                cron_expression TEXT NOT NULL,
                timezone TEXT NOT NULL DEFAULT 'UTC'
            );
            CREATE TABLE IF NOT EXISTS core_data_readiness (
                domain TEXT NOT NULL,
                partition_key JSONB NOT NULL,
                ready BOOLEAN NOT NULL DEFAULT FALSE,
                checked_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (domain, partition_key)
            );
        "#,
    },
];

async fn ensure_migrations_table_sqlite(pool: &SqlitePool) -> StorageResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (filename TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_migrations_table_postgres(pool: &PgPool) -> StorageResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (filename TEXT PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Applies every migration not already recorded in `_migrations`, in
/// declaration order, each inside its own transaction. Safe to call every
/// process start (spec.md §6 "A migrations ledger `_migrations(filename,
/// applied_at)` records DDL application").
pub async fn bootstrap_sqlite(pool: &SqlitePool) -> StorageResult<()> {
    ensure_migrations_table_sqlite(pool).await?;
    for m in MIGRATIONS {
        let already: Option<(String,)> = sqlx::query_as("SELECT filename FROM _migrations WHERE filename = ?")
            .bind(m.name)
            .fetch_optional(pool)
            .await?;
        if already.is_some() {
            continue;
        }
        let mut tx = pool.begin().await?;
        for stmt in m.sqlite.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO _migrations (filename, applied_at) VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))")
            .bind(m.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }
    Ok(())
}

pub async fn bootstrap_postgres(pool: &PgPool) -> StorageResult<()> {
    ensure_migrations_table_postgres(pool).await?;
    for m in MIGRATIONS {
        let already: Option<(String,)> = sqlx::query_as("SELECT filename FROM _migrations WHERE filename = $1")
            .bind(m.name)
            .fetch_optional(pool)
            .await?;
        if already.is_some() {
            continue;
        }
        let mut tx = pool.begin().await?;
        for stmt in m.postgres.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO _migrations (filename, applied_at) VALUES ($1, now())")
            .bind(m.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_migration_has_a_unique_name() {
        let mut names: Vec<&str> = MIGRATIONS.iter().map(|m| m.name).collect();
        names.sort();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
    }

    #[tokio::test]
    async fn bootstrap_sqlite_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        bootstrap_sqlite(&pool).await.unwrap();
        bootstrap_sqlite(&pool).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn bootstrap_sqlite_creates_every_core_table() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        bootstrap_sqlite(&pool).await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name LIKE 'core_%'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in [
            "core_executions",
            "core_execution_events",
            "core_work_items",
            "core_concurrency_locks",
            "core_dead_letters",
            "core_manifest",
            "core_rejects",
            "core_quality",
            "core_anomalies",
            "core_alert_channels",
            "core_alerts",
            "core_schedules",
            "core_schedule_runs",
            "core_schedule_locks",
            "core_sources",
        ] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }
}
