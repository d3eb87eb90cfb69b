//! REST facade over spine-core (spec.md §6): routers per resource family,
//! each a thin translation from HTTP to the library calls in `spine-core`
//! and `spine-storage`. `main.rs` owns process bootstrap; this crate root
//! only re-exports the pieces a binary (or an integration test) needs to
//! assemble the app.

pub mod alerts;
pub mod anomalies;
pub mod common;
pub mod config;
pub mod dlq;
pub mod health;
pub mod manifest;
pub mod quality;
pub mod runs;
pub mod schedules;
pub mod sources;
pub mod workflows;

pub use common::{ApiError, ApiResult, AppState, HealthCheckFn};
