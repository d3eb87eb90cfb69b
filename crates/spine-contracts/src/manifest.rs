//! `ManifestRow` and `RejectRow` — per-partition data-readiness breadcrumbs
//! and the append-only quality audit trail (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Append/upsert only: `(domain, partition_key, stage)` is the composite key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ManifestRow {
    pub domain: String,
    pub partition_key: serde_json::Value,
    pub stage: String,
    /// Ordering within a partition; monotonically non-decreasing as the
    /// partition advances (spec.md §8 invariant 9).
    pub stage_rank: i32,
    pub row_count: i64,
    pub execution_id: String,
    pub batch_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Never deleted or updated (spec.md §8 invariant 8).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct RejectRow {
    pub domain: String,
    pub partition_key: serde_json::Value,
    pub stage: String,
    pub reason_code: String,
    pub reason_detail: Option<String>,
    pub raw_json: serde_json::Value,
    pub execution_id: String,
    pub created_at: DateTime<Utc>,
}

/// `core_quality` aggregate row, grounded on
/// `original_source/.../core/repositories/system.py`'s
/// `QualityRepository.aggregate_by_workflow` (spec.md §2 component 11 names
/// the quality repository but leaves its row shape implicit).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct QualityResultSummary {
    pub workflow: String,
    pub checks_passed: i64,
    pub checks_failed: i64,
    pub score: f64,
    pub run_at: DateTime<Utc>,
}

/// Append-only anomaly record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AnomalyRow {
    pub id: String,
    pub domain: String,
    pub anomaly_type: String,
    pub detail: serde_json::Value,
    pub severity: String,
    pub created_at: DateTime<Utc>,
}
