//! Workflow engine (spec.md §4.4): runs a `Workflow` against a starting
//! `WorkflowContext` and returns a `WorkflowResult`. `engine` holds the
//! sequential and parallel-DAG runners; this module only re-exports.

mod engine;

pub use engine::WorkflowEngine;
