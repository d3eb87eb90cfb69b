//! Spine-core: the execution ledger, dispatcher, work-item queue,
//! workflow engine, scheduler, DLQ manager, and concurrency guard
//! (spec.md §2). Every component here depends on `spine-contracts` for
//! its data model and `spine-storage` for persistence; nothing in this
//! crate talks to a database driver directly.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         Dispatcher                             │
//! │  (registry lookup → idempotency → lock → invoke → record)      │
//! └────────────────────────────────────────────────────────────────┘
//!              │                              ▲
//!              ▼                              │
//! ┌────────────────────────┐      ┌────────────────────────────────┐
//! │     Execution Ledger   │      │         WorkflowEngine         │
//! │ (FSM + event log)      │      │ (sequential / parallel DAG)    │
//! └────────────────────────┘      └────────────────────────────────┘
//!              │                              │
//!              ▼                              ▼
//! ┌────────────────────────┐      ┌────────────────────────────────┐
//! │   ConcurrencyGuard      │      │          WorkQueue             │
//! │ (core_concurrency_locks)│      │ (claim/complete/fail + DLQ)    │
//! └────────────────────────┘      └────────────────────────────────┘
//!              ▲
//!              │
//! ┌────────────────────────┐
//! │        Scheduler        │
//! │ (cron/interval tick)    │
//! └────────────────────────┘
//! ```

pub mod clock;
pub mod concurrency;
pub mod dispatcher;
pub mod dlq;
pub mod error;
pub mod ledger;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod workflow;

pub use clock::{Clock, MockClock, SystemClock};
pub use concurrency::{ConcurrencyGuard, HeldLock};
pub use dispatcher::{Dispatcher, PipelineRunResult, Runnable};
pub use dlq::DlqManager;
pub use error::{DispatchError, LedgerError, QueueError, RegistryError, SchedulerError, WorkflowError};
pub use ledger::Ledger;
pub use queue::WorkQueue;
pub use registry::{LambdaHandler, OperationContext, OperationHandler, PredicateHandler, Registry};
pub use scheduler::{Scheduler, TickOutcome};
pub use workflow::WorkflowEngine;
