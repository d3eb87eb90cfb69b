//! Alerts and sources — the remaining component-11 repositories from
//! spec.md §2 ("Repositories for alerts/sources/quality/anomalies").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AlertChannel {
    pub id: String,
    pub name: String,
    pub channel_type: String,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Alert {
    pub id: String,
    pub domain: String,
    pub severity: String,
    pub message: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertDeliveryStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AlertDelivery {
    pub id: String,
    pub alert_id: String,
    pub channel_id: String,
    pub status: AlertDeliveryStatus,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub source_type: String,
    pub config: serde_json::Value,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SourceFetch {
    pub id: String,
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    pub row_count: i64,
    pub status: String,
}
