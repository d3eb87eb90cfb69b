//! `ConcurrencyLock` — a mutual-exclusion key (spec.md §3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ConcurrencyLock {
    pub lock_key: String,
    pub execution_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A row in `core_schedule_locks` — the scheduler-wide tick lock (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ScheduleLock {
    pub schedule_id: String,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
