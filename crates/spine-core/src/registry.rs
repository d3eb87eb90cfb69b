//! In-process catalogs for operations and workflows (spec.md §4.10).
//! Registration is explicit — no filesystem scanning, no import-time side
//! effects (spec.md §9 "Global registries"): callers call
//! `register_operation`/`register_workflow`/`register_lambda`/
//! `register_predicate` during application bootstrap. Grounded in the
//! teacher's type-erased `AnyWorkflow`/`WorkflowFactory` registry
//! (`durable/src/engine/registry.rs`), generalized here to plain
//! `Arc<dyn Trait>` maps since the declarative `Step` DAG (spec.md §4.4)
//! needs no per-instance factory, only a lookup.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use spine_contracts::Workflow;

use crate::error::RegistryError;

/// `(context, params) -> any`; exceptions become FAILED with
/// `error=str(e)` (spec.md §6 "Operation/Workflow handler contract").
/// `concurrency_key` names the lock the Dispatcher must hold while this
/// operation runs (spec.md §4.5 step 4); `None` means no locking.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn call(&self, ctx: &OperationContext, params: Value) -> Result<Value, String>;

    fn concurrency_key(&self, _params: &Value) -> Option<String> {
        None
    }
}

/// Context passed to an operation handler. Thin today — it exists so
/// operation handlers are not coupled to an `Execution` row, matching the
/// dispatcher's own decoupling from the ledger (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub execution_id: String,
    pub parent_execution_id: Option<String>,
}

/// A workflow `Lambda` step's inline handler:
/// `(ctx, config) -> StepResult | dict | primitive | None`. The coercion
/// from whatever the handler returns into a `StepResult` happens in
/// `crate::workflow::engine` (spec.md §4.4), not here — this trait only
/// carries the raw JSON value out.
#[async_trait]
pub trait LambdaHandler: Send + Sync {
    async fn call(
        &self,
        ctx: &spine_contracts::WorkflowContext,
        config: &Value,
    ) -> Result<Value, String>;
}

/// A `Choice` step's predicate: evaluated for control flow, not output.
#[async_trait]
pub trait PredicateHandler: Send + Sync {
    async fn call(
        &self,
        ctx: &spine_contracts::WorkflowContext,
        config: &Value,
    ) -> Result<bool, String>;
}

#[derive(Default, Clone)]
pub struct Registry {
    operations: Arc<DashMap<String, Arc<dyn OperationHandler>>>,
    workflows: Arc<DashMap<String, Workflow>>,
    lambdas: Arc<DashMap<String, Arc<dyn LambdaHandler>>>,
    predicates: Arc<DashMap<String, Arc<dyn PredicateHandler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_operation(&self, name: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.operations.insert(name.into(), handler);
    }

    pub fn get_operation(&self, name: &str) -> Result<Arc<dyn OperationHandler>, RegistryError> {
        self.operations
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| RegistryError::OperationNotFound(name.to_string()))
    }

    /// Validates the workflow (spec.md §3 "Map is declared but out of
    /// scope", unknown `depends_on` targets) before accepting it.
    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), RegistryError> {
        workflow
            .validate()
            .map_err(|reason| RegistryError::InvalidWorkflow {
                name: workflow.name.clone(),
                reason,
            })?;
        self.workflows.insert(workflow.name.clone(), workflow);
        Ok(())
    }

    pub fn get_workflow(&self, name: &str) -> Result<Workflow, RegistryError> {
        self.workflows
            .get(name)
            .map(|w| w.clone())
            .ok_or_else(|| RegistryError::WorkflowNotFound(name.to_string()))
    }

    pub fn workflow_names(&self) -> Vec<String> {
        self.workflows.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn register_lambda(&self, name: impl Into<String>, handler: Arc<dyn LambdaHandler>) {
        self.lambdas.insert(name.into(), handler);
    }

    pub fn get_lambda(&self, name: &str) -> Result<Arc<dyn LambdaHandler>, RegistryError> {
        self.lambdas
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| RegistryError::OperationNotFound(name.to_string()))
    }

    pub fn register_predicate(&self, name: impl Into<String>, handler: Arc<dyn PredicateHandler>) {
        self.predicates.insert(name.into(), handler);
    }

    pub fn get_predicate(&self, name: &str) -> Result<Arc<dyn PredicateHandler>, RegistryError> {
        self.predicates
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| RegistryError::OperationNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spine_contracts::{ExecutionPolicy, Step, StepKind};

    struct Echo;

    #[async_trait]
    impl OperationHandler for Echo {
        async fn call(&self, _ctx: &OperationContext, params: Value) -> Result<Value, String> {
            Ok(params)
        }
    }

    #[tokio::test]
    async fn unregistered_operation_is_not_found() {
        let registry = Registry::new();
        assert!(matches!(
            registry.get_operation("echo"),
            Err(RegistryError::OperationNotFound(_))
        ));
        registry.register_operation("echo", Arc::new(Echo));
        assert!(registry.get_operation("echo").is_ok());
    }

    #[test]
    fn workflow_with_map_step_is_rejected_at_registration() {
        let registry = Registry::new();
        let wf = Workflow {
            name: "wf".into(),
            steps: vec![Step {
                name: "m".into(),
                kind: StepKind::Map {
                    item_source: "x".into(),
                    step: "y".into(),
                },
                depends_on: vec![],
                on_error: spine_contracts::OnError::Stop,
                config: serde_json::json!({}),
            }],
            execution_policy: ExecutionPolicy::default(),
            defaults: serde_json::json!({}),
        };
        assert!(matches!(
            registry.register_workflow(wf),
            Err(RegistryError::InvalidWorkflow { .. })
        ));
    }
}
