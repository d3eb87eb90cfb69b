//! Sequential and parallel-DAG step runners (spec.md §4.4). Grounded in
//! the teacher's `WorkflowExecutor` replay loop for the sequential shape
//! (`durable/src/engine/executor.rs`) and its `WorkerPool` semaphore +
//! `JoinSet` concurrency model for the parallel shape
//! (`durable/src/worker/pool.rs`), both generalized from activity
//! scheduling onto `Step` execution.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use spine_contracts::{
    ErrorCategory, OnError, OnFailure, Step, StepExecution, StepKind, StepResult, StepStatus, Workflow, WorkflowContext,
    WorkflowResult, WorkflowRunStatus,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::dispatcher::Runnable;
use crate::error::WorkflowError;
use crate::registry::Registry;

#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<Registry>,
    runnable: Arc<dyn Runnable>,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<Registry>, runnable: Arc<dyn Runnable>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, runnable, clock }
    }

    /// Mode selection per spec.md §4.4: the parallel DAG algorithm only
    /// runs when the policy asks for it **and** some step actually
    /// declares a dependency; otherwise steps run in declared order.
    pub async fn run(&self, workflow: &Workflow, ctx: WorkflowContext) -> Result<WorkflowResult, WorkflowError> {
        workflow.validate().map_err(WorkflowError::Validation)?;
        if workflow.uses_parallel_runner() {
            Ok(self.run_parallel(workflow, ctx).await)
        } else {
            Ok(self.run_sequential(workflow, ctx).await)
        }
    }

    async fn execute_step(&self, step: &Step, ctx: &WorkflowContext) -> StepResult {
        match &step.kind {
            StepKind::Lambda { handler } => {
                let handler = match self.registry.get_lambda(handler) {
                    Ok(h) => h,
                    Err(e) => return StepResult::fail(e.to_string(), ErrorCategory::NotFound),
                };
                match handler.call(ctx, &step.config).await {
                    Ok(value) => StepResult::from_value(value),
                    Err(message) => StepResult::fail(message, ErrorCategory::Internal),
                }
            }
            StepKind::Pipeline { operation } => {
                if ctx.dry_run {
                    return StepResult::ok(serde_json::json!({"dry_run": true, "pipeline": operation}));
                }
                let params = merge_params(&ctx.params, &step.config);
                let result = self
                    .runnable
                    .submit_pipeline_sync(operation, params, &ctx.run_id, &ctx.run_id)
                    .await;
                if result.status == spine_contracts::ExecutionStatus::Completed {
                    StepResult::ok(result.output)
                } else {
                    StepResult::fail(result.error.unwrap_or_else(|| "pipeline run did not complete".to_string()), ErrorCategory::Internal)
                }
            }
            StepKind::Choice { predicate, then_step, else_step } => {
                let handler = match self.registry.get_predicate(predicate) {
                    Ok(h) => h,
                    Err(e) => return StepResult::fail(e.to_string(), ErrorCategory::NotFound),
                };
                match handler.call(ctx, &step.config).await {
                    Ok(taken) => {
                        let mut result = StepResult::ok(serde_json::json!({"branch": taken}));
                        result.next_step = Some(if taken { then_step.clone() } else { else_step.clone() });
                        result
                    }
                    Err(message) => StepResult::fail(message, ErrorCategory::Internal),
                }
            }
            StepKind::Wait { duration_seconds } => {
                if !ctx.dry_run {
                    tokio::time::sleep(std::time::Duration::from_secs(*duration_seconds)).await;
                }
                StepResult::ok(serde_json::json!({}))
            }
            StepKind::Map { .. } => StepResult::fail("Map steps are out of scope in this tier", ErrorCategory::Internal),
        }
    }

    /// Spec.md §4.4 "Sequential runner": declared order, gated by
    /// `depends_on`, `on_error` applied per step, `next_step` fast-forward
    /// from Choice steps.
    async fn run_sequential(&self, workflow: &Workflow, mut ctx: WorkflowContext) -> WorkflowResult {
        let started_at = self.clock.now();
        let mut steps_out = Vec::new();
        let mut completed_names: HashSet<String> = HashSet::new();
        let mut failed_names: HashSet<String> = HashSet::new();
        // Steps skipped by a Choice fast-forward (or transitively, by
        // depending on one). Kept apart from `failed_names`: a skip isn't a
        // failure, and must not turn a clean Choice-only run into PARTIAL.
        let mut skipped_names: HashSet<String> = HashSet::new();
        let mut fast_forward_target: Option<String> = None;
        let mut first_failure: Option<(String, String)> = None;

        for step in &workflow.steps {
            if let Some(target) = &fast_forward_target {
                if step.name != *target {
                    skipped_names.insert(step.name.clone());
                    steps_out.push(skipped_execution(step, self.clock.now()));
                    continue;
                }
                fast_forward_target = None;
            }

            if step.depends_on.iter().any(|d| failed_names.contains(d) || skipped_names.contains(d)) {
                skipped_names.insert(step.name.clone());
                steps_out.push(skipped_execution(step, self.clock.now()));
                continue;
            }

            let step_started = self.clock.now();
            let result = self.execute_step(step, &ctx).await;
            ctx = ctx.with_output(step.name.clone(), result.output.clone());
            ctx = ctx.with_params(&result.context_updates);
            let step_completed = self.clock.now();

            if result.success {
                completed_names.insert(step.name.clone());
                steps_out.push(StepExecution {
                    step_name: step.name.clone(),
                    status: StepStatus::Completed,
                    output: Some(result.output.clone()),
                    error: None,
                    started_at: step_started,
                    completed_at: step_completed,
                });
            } else {
                failed_names.insert(step.name.clone());
                if first_failure.is_none() {
                    first_failure = Some((step.name.clone(), result.error.clone().unwrap_or_default()));
                }
                steps_out.push(StepExecution {
                    step_name: step.name.clone(),
                    status: StepStatus::Failed,
                    output: None,
                    error: result.error.clone(),
                    started_at: step_started,
                    completed_at: step_completed,
                });
                if step.on_error == OnError::Stop {
                    warn!(workflow = %workflow.name, step = %step.name, "workflow stopped on step failure");
                    return WorkflowResult {
                        status: WorkflowRunStatus::Failed,
                        steps: steps_out,
                        context: ctx,
                        error_step: Some(step.name.clone()),
                        error: result.error,
                        started_at,
                        completed_at: step_completed,
                    };
                }
            }

            if let Some(next) = result.next_step {
                fast_forward_target = Some(next);
            }
        }

        let completed_at = self.clock.now();
        let status = if failed_names.is_empty() {
            WorkflowRunStatus::Completed
        } else if completed_names.is_empty() {
            WorkflowRunStatus::Failed
        } else {
            WorkflowRunStatus::Partial
        };
        info!(workflow = %workflow.name, ?status, "sequential workflow run finished");
        WorkflowResult {
            status,
            steps: steps_out,
            context: ctx,
            error_step: first_failure.as_ref().map(|(name, _)| name.clone()),
            error: first_failure.map(|(_, error)| error),
            started_at,
            completed_at,
        }
    }

    /// Spec.md §4.4 "Parallel DAG runner": `pending`/`completed_names`/
    /// `failed_names` sets, worker pool bounded by `max_concurrency`,
    /// shared context merged under a lock after each completion.
    async fn run_parallel(&self, workflow: &Workflow, ctx: WorkflowContext) -> WorkflowResult {
        let started_at = self.clock.now();
        let ctx = Arc::new(Mutex::new(ctx));
        let steps_out: Arc<Mutex<Vec<StepExecution>>> = Arc::new(Mutex::new(Vec::new()));
        let completed_names: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let failed_names: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let first_failure: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
        let mut pending: HashSet<String> = workflow.steps.iter().map(|s| s.name.clone()).collect();
        let semaphore = Arc::new(Semaphore::new(workflow.execution_policy.max_concurrency.max(1)));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut running: JoinSet<(String, DateTime<Utc>, StepResult)> = JoinSet::new();

        loop {
            // Propagate skips: anything depending on an already-failed/skipped step.
            let newly_skipped: Vec<String> = {
                let failed = failed_names.lock();
                pending
                    .iter()
                    .filter(|name| {
                        let step = workflow.step(name).expect("pending name is a real step");
                        step.depends_on.iter().any(|d| failed.contains(d))
                    })
                    .cloned()
                    .collect()
            };
            for name in &newly_skipped {
                pending.remove(name);
                failed_names.lock().insert(name.clone());
                let step = workflow.step(name).expect("pending name is a real step");
                steps_out.lock().push(skipped_execution(step, self.clock.now()));
            }

            if pending.is_empty() && running.is_empty() {
                break;
            }

            // Submit everything ready, bounded by available permits.
            loop {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                let ready_name = {
                    let completed = completed_names.lock();
                    pending
                        .iter()
                        .find(|name| {
                            let step = workflow.step(name).expect("pending name is a real step");
                            step.depends_on.iter().all(|d| completed.contains(d))
                        })
                        .cloned()
                };
                let Some(name) = ready_name else { break };
                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(p) => p,
                    Err(_) => break,
                };
                pending.remove(&name);
                let step = workflow.step(&name).expect("pending name is a real step").clone();
                let ctx_snapshot = ctx.lock().clone();
                let engine = self.clone();
                let step_started = self.clock.now();
                running.spawn(async move {
                    let _permit = permit;
                    let result = engine.execute_step(&step, &ctx_snapshot).await;
                    (step.name, step_started, result)
                });
            }

            if running.is_empty() {
                // No task in flight and nothing became ready: every
                // remaining pending step is blocked on a dependency that
                // will never complete (shouldn't happen once validation
                // rejects unknown depends_on targets, but stop rather than
                // spin).
                break;
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (name, step_started, result) = joined.expect("step task panicked");
            {
                let mut guard = ctx.lock();
                let updated = guard.with_output(name.clone(), result.output.clone()).with_params(&result.context_updates);
                *guard = updated;
            }
            let step = workflow.step(&name).expect("completed name is a real step");
            if result.success {
                completed_names.lock().insert(name.clone());
                steps_out.lock().push(StepExecution {
                    step_name: name,
                    status: StepStatus::Completed,
                    output: Some(result.output),
                    error: None,
                    started_at: step_started,
                    completed_at: self.clock.now(),
                });
            } else {
                failed_names.lock().insert(name.clone());
                {
                    let mut ff = first_failure.lock();
                    if ff.is_none() {
                        *ff = Some((name.clone(), result.error.clone().unwrap_or_default()));
                    }
                }
                steps_out.lock().push(StepExecution {
                    step_name: name,
                    status: StepStatus::Failed,
                    output: None,
                    error: result.error,
                    started_at: step_started,
                    completed_at: self.clock.now(),
                });
                if step.on_error == OnError::Stop || workflow.execution_policy.on_failure == OnFailure::Stop {
                    cancelled.store(true, Ordering::SeqCst);
                    let remaining: Vec<String> = pending.drain().collect();
                    for leftover in remaining {
                        failed_names.lock().insert(leftover.clone());
                        let leftover_step = workflow.step(&leftover).expect("pending name is a real step");
                        steps_out.lock().push(skipped_execution(leftover_step, self.clock.now()));
                    }
                    running.abort_all();
                    warn!(workflow = %workflow.name, "parallel workflow run cancelled on step failure");
                    break;
                }
            }
        }

        let completed_at = self.clock.now();
        let completed_names = Arc::try_unwrap(completed_names).map(Mutex::into_inner).unwrap_or_default();
        let failed_names = Arc::try_unwrap(failed_names).map(Mutex::into_inner).unwrap_or_default();
        let status = if failed_names.is_empty() {
            WorkflowRunStatus::Completed
        } else if workflow.execution_policy.on_failure == OnFailure::Stop {
            WorkflowRunStatus::Failed
        } else if completed_names.is_empty() {
            WorkflowRunStatus::Failed
        } else {
            WorkflowRunStatus::Partial
        };
        info!(workflow = %workflow.name, ?status, "parallel workflow run finished");

        let ctx = Arc::try_unwrap(ctx).map(Mutex::into_inner).unwrap_or_else(|arc| arc.lock().clone());
        let steps = Arc::try_unwrap(steps_out).map(Mutex::into_inner).unwrap_or_default();
        let first_failure = Arc::try_unwrap(first_failure).map(Mutex::into_inner).unwrap_or_default();

        WorkflowResult {
            status,
            steps,
            context: ctx,
            error_step: first_failure.as_ref().map(|(name, _)| name.clone()),
            error: first_failure.map(|(_, error)| error),
            started_at,
            completed_at,
        }
    }
}

fn merge_params(base: &serde_json::Value, overrides: &serde_json::Value) -> serde_json::Value {
    let mut merged = base.clone();
    if let (Some(target), Some(updates)) = (merged.as_object_mut(), overrides.as_object()) {
        for (k, v) in updates {
            target.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn skipped_execution(step: &Step, at: DateTime<Utc>) -> StepExecution {
    StepExecution {
        step_name: step.name.clone(),
        status: StepStatus::Skipped,
        output: None,
        error: None,
        started_at: at,
        completed_at: at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::dispatcher::PipelineRunResult;
    use crate::registry::{LambdaHandler, PredicateHandler};
    use async_trait::async_trait;
    use spine_contracts::{ExecutionPolicy, ExecutionMode};

    struct Noop;
    #[async_trait]
    impl LambdaHandler for Noop {
        async fn call(&self, _ctx: &WorkflowContext, _config: &serde_json::Value) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl LambdaHandler for AlwaysFails {
        async fn call(&self, _ctx: &WorkflowContext, _config: &serde_json::Value) -> Result<serde_json::Value, String> {
            Err("lambda exploded".to_string())
        }
    }

    struct AlwaysTrue;
    #[async_trait]
    impl PredicateHandler for AlwaysTrue {
        async fn call(&self, _ctx: &WorkflowContext, _config: &serde_json::Value) -> Result<bool, String> {
            Ok(true)
        }
    }

    struct NullRunnable;
    #[async_trait]
    impl Runnable for NullRunnable {
        async fn submit_pipeline_sync(&self, name: &str, _params: serde_json::Value, _parent: &str, _corr: &str) -> PipelineRunResult {
            PipelineRunResult {
                run_id: "unused".into(),
                status: spine_contracts::ExecutionStatus::Completed,
                error: None,
                output: serde_json::json!({"ran": name}),
                started_at: None,
                completed_at: None,
            }
        }
    }

    fn engine() -> WorkflowEngine {
        let registry = Arc::new(Registry::new());
        registry.register_lambda("noop", Arc::new(Noop));
        registry.register_lambda("boom", Arc::new(AlwaysFails));
        registry.register_predicate("always_true", Arc::new(AlwaysTrue));
        WorkflowEngine::new(registry, Arc::new(NullRunnable), Arc::new(SystemClock))
    }

    fn lambda_step(name: &str, handler: &str, on_error: OnError) -> Step {
        Step {
            name: name.into(),
            kind: StepKind::Lambda { handler: handler.into() },
            depends_on: vec![],
            on_error,
            config: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn sequential_stop_policy_ends_workflow_on_first_failure() {
        let wf = Workflow {
            name: "wf".into(),
            steps: vec![
                lambda_step("a", "noop", OnError::Stop),
                lambda_step("b", "boom", OnError::Stop),
                lambda_step("c", "noop", OnError::Stop),
            ],
            execution_policy: ExecutionPolicy::default(),
            defaults: serde_json::json!({}),
        };
        let ctx = WorkflowContext::new("run-1", "wf", serde_json::json!({}));
        let result = engine().run(&wf, ctx).await.unwrap();
        assert_eq!(result.status, WorkflowRunStatus::Failed);
        assert_eq!(result.error_step.as_deref(), Some("b"));
        assert_eq!(result.steps.len(), 2, "step c never runs after STOP");
    }

    #[tokio::test]
    async fn sequential_continue_policy_yields_partial() {
        let wf = Workflow {
            name: "wf".into(),
            steps: vec![
                lambda_step("a", "noop", OnError::Continue),
                lambda_step("b", "boom", OnError::Continue),
                lambda_step("c", "noop", OnError::Continue),
            ],
            execution_policy: ExecutionPolicy::default(),
            defaults: serde_json::json!({}),
        };
        let ctx = WorkflowContext::new("run-1", "wf", serde_json::json!({}));
        let result = engine().run(&wf, ctx).await.unwrap();
        assert_eq!(result.status, WorkflowRunStatus::Partial);
        assert_eq!(result.steps.len(), 3, "CONTINUE keeps running remaining steps");
    }

    #[tokio::test]
    async fn parallel_dag_skips_downstream_of_failed_dependency() {
        let wf = Workflow {
            name: "wf".into(),
            steps: vec![
                lambda_step("a", "boom", OnError::Continue),
                Step {
                    name: "b".into(),
                    kind: StepKind::Lambda { handler: "noop".into() },
                    depends_on: vec!["a".into()],
                    on_error: OnError::Continue,
                    config: serde_json::json!({}),
                },
                lambda_step("c", "noop", OnError::Continue),
            ],
            execution_policy: ExecutionPolicy {
                mode: ExecutionMode::Parallel,
                max_concurrency: 4,
                timeout_seconds: None,
                on_failure: OnFailure::Continue,
            },
            defaults: serde_json::json!({}),
        };
        let ctx = WorkflowContext::new("run-1", "wf", serde_json::json!({}));
        let result = engine().run(&wf, ctx).await.unwrap();
        assert_eq!(result.status, WorkflowRunStatus::Partial);
        let b = result.steps.iter().find(|s| s.step_name == "b").unwrap();
        assert_eq!(b.status, StepStatus::Skipped);
        let c = result.steps.iter().find(|s| s.step_name == "c").unwrap();
        assert_eq!(c.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn choice_step_fast_forwards_past_intervening_steps() {
        let wf = Workflow {
            name: "wf".into(),
            steps: vec![
                Step {
                    name: "branch".into(),
                    kind: StepKind::Choice {
                        predicate: "always_true".into(),
                        then_step: "target".into(),
                        else_step: "skip_me".into(),
                    },
                    depends_on: vec![],
                    on_error: OnError::Stop,
                    config: serde_json::json!({}),
                },
                lambda_step("skip_me", "noop", OnError::Stop),
                lambda_step("target", "noop", OnError::Stop),
            ],
            execution_policy: ExecutionPolicy::default(),
            defaults: serde_json::json!({}),
        };
        let ctx = WorkflowContext::new("run-1", "wf", serde_json::json!({}));
        let result = engine().run(&wf, ctx).await.unwrap();
        assert_eq!(result.status, WorkflowRunStatus::Completed);
        let skip_me = result.steps.iter().find(|s| s.step_name == "skip_me").unwrap();
        assert_eq!(skip_me.status, StepStatus::Skipped);
        let target = result.steps.iter().find(|s| s.step_name == "target").unwrap();
        assert_eq!(target.status, StepStatus::Completed);
    }
}
