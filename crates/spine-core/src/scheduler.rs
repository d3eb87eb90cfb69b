//! Scheduler (spec.md §4.7): cron/interval evaluation of registered
//! schedules, enqueueing runs via the Dispatcher on a tick. Grounded in
//! the teacher's worker poller loop (`durable/src/worker/poller.rs`'s
//! `tokio::time::interval` tick + per-iteration work pass), generalized
//! from task polling onto schedule evaluation; the per-schedule advisory
//! lock reuses `ConcurrencyGuard`'s acquire-or-steal-expired semantics
//! through `ScheduleRepository::acquire_schedule_lock` instead of
//! `core_concurrency_locks` directly, since schedule locks key on
//! `schedule_id` rather than an arbitrary caller-supplied string.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use spine_contracts::{Schedule, ScheduleRun, ScheduleRunOutcome, TriggerSource};
use spine_storage::{PageSlice, ScheduleRepository};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::error::SchedulerError;

const DEFAULT_LOCK_TTL_SECONDS: i64 = 50;

/// Evaluates active schedules on a tick and enqueues runs when due
/// (spec.md §4.7). One `Scheduler` instance is one "scheduler instance" in
/// the spec's sense; `instance_id` names the lock owner recorded in
/// `core_schedule_locks`.
pub struct Scheduler {
    repo: Arc<dyn ScheduleRepository>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    instance_id: String,
    lock_ttl_seconds: i64,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn ScheduleRepository>, dispatcher: Arc<Dispatcher>, clock: Arc<dyn Clock>, instance_id: impl Into<String>) -> Self {
        Self {
            repo,
            dispatcher,
            clock,
            instance_id: instance_id.into(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
        }
    }

    pub fn with_lock_ttl(mut self, ttl_seconds: i64) -> Self {
        self.lock_ttl_seconds = ttl_seconds;
        self
    }

    /// Computes the next occurrence strictly after `after`, interpreted in
    /// `schedule.timezone`. Cron expressions are evaluated via the `cron`
    /// crate against the schedule's own timezone and converted back to
    /// UTC; interval schedules simply add `interval_seconds`.
    pub fn next_occurrence(schedule: &Schedule, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        if let Some(expr) = &schedule.cron_expression {
            let tz: Tz = schedule
                .timezone
                .parse()
                .map_err(|_| SchedulerError::InvalidCron(expr.clone(), format!("unknown timezone '{}'", schedule.timezone)))?;
            let parsed = CronSchedule::from_str(expr).map_err(|e| SchedulerError::InvalidCron(expr.clone(), e.to_string()))?;
            let after_tz = after.with_timezone(&tz);
            Ok(parsed.after(&after_tz).next().map(|dt| dt.with_timezone(&Utc)))
        } else if let Some(interval) = schedule.interval_seconds {
            Ok(Some(after + chrono::Duration::seconds(interval)))
        } else {
            Err(SchedulerError::InvalidCron(String::new(), "schedule has neither cron_expression nor interval_seconds".to_string()))
        }
    }

    /// Runs one tick: evaluate every enabled schedule, dispatch (or skip as
    /// missed) any that are due, advance `next_run_at`. Per-schedule
    /// processing is serialised by `acquire_schedule_lock` so that two
    /// overlapping tick calls (or two scheduler instances) dispatch at
    /// most once per due occurrence (spec.md §4.7 "Determinism").
    pub async fn tick(&self) -> Result<Vec<TickOutcome>, SchedulerError> {
        let schedules = self.repo.list_enabled().await?;
        let mut outcomes = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            match self.tick_one(&schedule).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "scheduler tick failed for schedule");
                }
            }
        }
        Ok(outcomes)
    }

    async fn tick_one(&self, schedule: &Schedule) -> Result<TickOutcome, SchedulerError> {
        let now = self.clock.now();
        let next_run_at = match schedule.next_run_at {
            Some(t) => t,
            None => match Self::next_occurrence(schedule, now)? {
                Some(t) => t,
                None => return Ok(TickOutcome::NotDue),
            },
        };
        if next_run_at > now {
            return Ok(TickOutcome::NotDue);
        }

        let lock = self
            .repo
            .acquire_schedule_lock(&schedule.id, &self.instance_id, self.lock_ttl_seconds)
            .await?;
        if lock.is_none() {
            info!(schedule_id = %schedule.id, "schedule lock held by another tick, skipping");
            return Ok(TickOutcome::NotDue);
        }

        let result = self.evaluate_due_schedule(schedule, next_run_at, now).await;
        self.repo.release_schedule_lock(&schedule.id, &self.instance_id).await?;
        result
    }

    async fn evaluate_due_schedule(
        &self,
        schedule: &Schedule,
        occurrence_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, SchedulerError> {
        let lateness = (now - occurrence_at).num_seconds();
        let outcome = if lateness > schedule.misfire_grace_seconds {
            self.record_run(schedule, occurrence_at, None, ScheduleRunOutcome::Missed).await?;
            warn!(schedule_id = %schedule.id, %occurrence_at, lateness, "schedule occurrence missed (outside misfire grace)");
            TickOutcome::Missed
        } else if self.running_instance_count(&schedule.id).await? >= schedule.max_instances.max(0) as i64 {
            self.record_run(schedule, occurrence_at, None, ScheduleRunOutcome::SkippedMaxInstances).await?;
            info!(schedule_id = %schedule.id, max_instances = schedule.max_instances, "schedule occurrence skipped: max_instances reached");
            TickOutcome::SkippedMaxInstances
        } else {
            let execution = self
                .dispatcher
                .submit(
                    &schedule.target_name,
                    serde_json::json!({}),
                    "default",
                    TriggerSource::Schedule,
                    None,
                    Some(format!("schedule:{}:{}", schedule.id, occurrence_at.to_rfc3339())),
                )
                .await?;
            self.record_run(schedule, occurrence_at, Some(execution.id.clone()), ScheduleRunOutcome::Dispatched)
                .await?;
            info!(schedule_id = %schedule.id, execution_id = %execution.id, "schedule dispatched run");
            TickOutcome::Dispatched { execution_id: execution.id }
        };

        let next = Self::next_occurrence(schedule, occurrence_at)?;
        self.repo.update_next_run(&schedule.id, now, next).await?;
        Ok(outcome)
    }

    async fn record_run(
        &self,
        schedule: &Schedule,
        occurrence_at: DateTime<Utc>,
        execution_id: Option<String>,
        outcome: ScheduleRunOutcome,
    ) -> Result<ScheduleRun, SchedulerError> {
        let run = ScheduleRun {
            id: Uuid::now_v7().to_string(),
            schedule_id: schedule.id.clone(),
            occurrence_at,
            execution_id,
            outcome,
            created_at: self.clock.now(),
        };
        Ok(self.repo.record_run(&run).await?)
    }

    /// Counts executions already dispatched for this schedule that have
    /// not yet reached a terminal status, approximated here via the schedule
    /// run history rather than a join through `core_executions` (the
    /// per-schedule lock already makes cross-instance races moot — DESIGN.md
    /// Open Question resolution #2 — so this only needs to bound the single
    /// holder's own in-flight count).
    async fn running_instance_count(&self, schedule_id: &str) -> Result<i64, SchedulerError> {
        let (runs, _) = self
            .repo
            .list_runs(schedule_id, PageSlice { limit: 200, offset: 0 })
            .await?;
        let mut running = 0i64;
        for run in runs {
            if run.outcome != ScheduleRunOutcome::Dispatched {
                continue;
            }
            let Some(execution_id) = &run.execution_id else { continue };
            if let Ok(execution) = self.dispatcher.ledger().get(execution_id).await {
                if !execution.status.is_terminal() {
                    running += 1;
                }
            }
        }
        Ok(running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NotDue,
    Dispatched { execution_id: String },
    Missed,
    SkippedMaxInstances,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::concurrency::ConcurrencyGuard;
    use crate::ledger::Ledger;
    use crate::registry::{OperationContext, OperationHandler, Registry};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use spine_contracts::ScheduleTargetType;
    use spine_storage::SqliteStore;

    struct Echo;
    #[async_trait]
    impl OperationHandler for Echo {
        async fn call(&self, _ctx: &OperationContext, params: serde_json::Value) -> Result<serde_json::Value, String> {
            Ok(params)
        }
    }

    async fn harness() -> (Scheduler, Arc<MockClock>, Arc<dyn ScheduleRepository>) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        spine_storage::schema::bootstrap_sqlite(&pool).await.unwrap();
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(MockClock::new(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        let ledger = Arc::new(Ledger::new(store.clone(), clock.clone()));
        let concurrency = Arc::new(ConcurrencyGuard::new(store.clone()));
        let registry = Arc::new(Registry::new());
        registry.register_operation("echo", Arc::new(Echo));
        let dispatcher = Arc::new(Dispatcher::new(registry, ledger, concurrency));
        let scheduler = Scheduler::new(store.clone(), dispatcher, clock.clone(), "instance-1");
        (scheduler, clock, store as Arc<dyn ScheduleRepository>)
    }

    fn minute_schedule(id: &str) -> Schedule {
        Schedule {
            id: id.to_string(),
            name: format!("s-{id}"),
            target_type: ScheduleTargetType::Operation,
            target_name: "echo".to_string(),
            cron_expression: Some("0 * * * * *".to_string()),
            interval_seconds: None,
            timezone: "UTC".to_string(),
            enabled: true,
            max_instances: 10,
            misfire_grace_seconds: 120,
            last_run_at: None,
            next_run_at: None,
        }
    }

    #[tokio::test]
    async fn due_evaluation_dispatches_each_due_occurrence_exactly_once() {
        let (scheduler, clock, repo) = harness().await;
        let schedule = repo.create(&minute_schedule("s1")).await.unwrap();

        // Advance two minutes and tick twice per minute boundary; S7 expects
        // exactly two dispatched `core_schedule_runs` rows.
        clock.advance(chrono::Duration::minutes(1));
        scheduler.tick().await.unwrap();
        clock.advance(chrono::Duration::minutes(1));
        scheduler.tick().await.unwrap();

        let (runs, total) = repo.list_runs(&schedule.id, PageSlice { limit: 50, offset: 0 }).await.unwrap();
        let dispatched: Vec<_> = runs.iter().filter(|r| r.outcome == ScheduleRunOutcome::Dispatched).collect();
        assert_eq!(dispatched.len(), 2, "exactly two occurrences dispatched over two minutes");
        assert!(total >= 2);

        let reread = repo.get_by_id(&schedule.id).await.unwrap();
        assert!(reread.last_run_at.is_some());
    }

    #[tokio::test]
    async fn calling_tick_twice_for_the_same_instant_dispatches_at_most_once() {
        let (scheduler, clock, repo) = harness().await;
        repo.create(&minute_schedule("s1")).await.unwrap();
        clock.advance(chrono::Duration::minutes(1));

        let first = scheduler.tick().await.unwrap();
        let second = scheduler.tick().await.unwrap();

        let dispatched_first = matches!(first[0], TickOutcome::Dispatched { .. });
        let dispatched_second = matches!(second[0], TickOutcome::Dispatched { .. });
        assert!(dispatched_first);
        assert!(!dispatched_second, "next_run_at already advanced past now on the first tick");
    }

    #[tokio::test]
    async fn misfire_outside_grace_window_is_skipped_not_backfilled() {
        let (scheduler, clock, repo) = harness().await;
        let mut schedule = minute_schedule("s1");
        schedule.misfire_grace_seconds = 30;
        let schedule = repo.create(&schedule).await.unwrap();

        // Simulate the scheduler being down for 10 minutes before the first tick.
        clock.advance(chrono::Duration::minutes(10));
        scheduler.tick().await.unwrap();

        let (runs, _) = repo.list_runs(&schedule.id, PageSlice { limit: 50, offset: 0 }).await.unwrap();
        assert_eq!(runs.len(), 1, "only the single occurrence at the tick is evaluated, not backfilled");
        assert_eq!(runs[0].outcome, ScheduleRunOutcome::Missed);
    }

    #[tokio::test]
    async fn interval_schedule_advances_by_fixed_seconds() {
        let (scheduler, clock, repo) = harness().await;
        let schedule = Schedule {
            id: "s-interval".to_string(),
            name: "interval".to_string(),
            target_type: ScheduleTargetType::Operation,
            target_name: "echo".to_string(),
            cron_expression: None,
            interval_seconds: Some(30),
            timezone: "UTC".to_string(),
            enabled: true,
            max_instances: 5,
            misfire_grace_seconds: 60,
            last_run_at: None,
            next_run_at: Some(clock.now()),
        };
        let schedule = repo.create(&schedule).await.unwrap();
        scheduler.tick().await.unwrap();
        let reread = repo.get_by_id(&schedule.id).await.unwrap();
        let next = reread.next_run_at.expect("next occurrence scheduled");
        assert_eq!((next - clock.now()).num_seconds(), 30);
    }
}
