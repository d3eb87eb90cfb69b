//! The `Workflow`/`Step`/`WorkflowContext`/`StepResult` data model
//! (spec.md §3, §4.4). `Step`'s variants are a textbook tagged union
//! (spec.md §9 "Sum types"), serialised with a `step_type` discriminator the
//! way the teacher tags `WorkflowEvent`/`WorkflowAction`
//! (`durable/src/workflow/{event,action}.rs`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnFailure {
    Stop,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnError {
    Stop,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionPolicy {
    pub mode: ExecutionMode,
    /// Bounded worker-pool width for the parallel DAG runner (spec.md §4.4).
    pub max_concurrency: usize,
    pub timeout_seconds: Option<u64>,
    pub on_failure: OnFailure,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_concurrency: 4,
            timeout_seconds: None,
            on_failure: OnFailure::Stop,
        }
    }
}

/// One node in a workflow DAG. Tagged union per spec.md §9's "Sum types"
/// design note: an interface (here, this enum) with an explicit
/// discriminator, rather than subclassing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum StepKind {
    /// Inline handler looked up by name in the operation-style handler
    /// registry and invoked as `(ctx, config) -> value`; the return value
    /// is coerced per spec.md §4.4's rules (see `StepResult::coerce`).
    Lambda { handler: String },
    /// References a registered operation, dispatched through the
    /// Dispatcher.
    Pipeline { operation: String },
    /// Predicate + branch names. `predicate` names a registered predicate
    /// handler (the same coercion-free boolean contract as a Lambda, but
    /// evaluated for control flow rather than output).
    Choice {
        predicate: String,
        then_step: String,
        else_step: String,
    },
    /// Pauses for `duration_seconds` unless the context is a dry run.
    Wait { duration_seconds: u64 },
    /// Declared but out of scope in this tier (spec.md §3): any workflow
    /// containing one fails validation at registration time.
    Map { item_source: String, step: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Step {
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    pub depends_on: Vec<String>,
    pub on_error: OnError,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<Step>,
    pub execution_policy: ExecutionPolicy,
    pub defaults: serde_json::Value,
}

impl Workflow {
    /// Mode selection per spec.md §4.4: PARALLEL only kicks in the DAG
    /// algorithm when at least one step actually declares a dependency.
    pub fn uses_parallel_runner(&self) -> bool {
        self.execution_policy.mode == ExecutionMode::Parallel
            && self.steps.iter().any(|s| !s.depends_on.is_empty())
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// `Map` is declared but unsupported in this tier (spec.md §3).
    pub fn validate(&self) -> Result<(), String> {
        for step in &self.steps {
            if matches!(step.kind, StepKind::Map { .. }) {
                return Err(format!(
                    "workflow '{}': step '{}' uses Map, which is out of scope in this tier",
                    self.name, step.name
                ));
            }
            for dep in &step.depends_on {
                if self.step(dep).is_none() {
                    return Err(format!(
                        "workflow '{}': step '{}' depends on unknown step '{}'",
                        self.name, step.name, dep
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Immutable-snapshot struct carrying the shared state a workflow run
/// evolves as steps complete (spec.md §3, §9 "Shared mutable context").
/// `with_output`/`with_params` return new snapshots; the "current" pointer
/// is what callers mutate under a lock, never the snapshot itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub run_id: String,
    pub workflow_name: String,
    pub params: serde_json::Value,
    pub partition: Option<serde_json::Value>,
    pub outputs: HashMap<String, serde_json::Value>,
    pub dry_run: bool,
}

impl WorkflowContext {
    pub fn new(run_id: impl Into<String>, workflow_name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_name: workflow_name.into(),
            params,
            partition: None,
            outputs: HashMap::new(),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_output(&self, step_name: impl Into<String>, output: serde_json::Value) -> Self {
        let mut next = self.clone();
        next.outputs.insert(step_name.into(), output);
        next
    }

    #[must_use]
    pub fn with_params(&self, updates: &serde_json::Value) -> Self {
        let mut next = self.clone();
        if let (Some(current), Some(incoming)) = (next.params.as_object_mut(), updates.as_object()) {
            for (k, v) in incoming {
                current.insert(k.clone(), v.clone());
            }
        }
        next
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// The outcome of running a single step (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepResult {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub context_updates: serde_json::Value,
    pub next_step: Option<String>,
    pub quality: Option<serde_json::Value>,
}

impl StepResult {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            error_category: None,
            context_updates: serde_json::json!({}),
            next_step: None,
            quality: None,
        }
    }

    pub fn fail(error: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            success: false,
            output: serde_json::json!({}),
            error: Some(error.into()),
            error_category: Some(category),
            context_updates: serde_json::json!({}),
            next_step: None,
            quality: None,
        }
    }

    /// Coerce an arbitrary JSON value returned by a Lambda handler into a
    /// `StepResult`, per the rules in spec.md §4.4:
    /// `None -> ok{}`, `true -> ok`, `false -> fail("False")`,
    /// `string -> ok{message:s}`, `number -> ok{value:n}`,
    /// `object -> ok{output:d}`, anything else -> `ok{result:v}`.
    ///
    /// If `value` is already a `StepResult`-shaped object (has a `success`
    /// boolean field), it is passed through unchanged rather than re-coerced
    /// — this is what makes coercion idempotent (spec.md §8's round-trip law
    /// `StepResult::from_value(v).from_value(self) == self`).
    pub fn from_value(value: serde_json::Value) -> Self {
        if let Some(existing) = Self::try_as_step_result(&value) {
            return existing;
        }
        match value {
            serde_json::Value::Null => Self::ok(serde_json::json!({})),
            serde_json::Value::Bool(true) => Self::ok(serde_json::json!({})),
            serde_json::Value::Bool(false) => Self::fail("False", ErrorCategory::Internal),
            serde_json::Value::String(s) => Self::ok(serde_json::json!({ "message": s })),
            serde_json::Value::Number(n) => Self::ok(serde_json::json!({ "value": n })),
            serde_json::Value::Object(map) => Self::ok(serde_json::json!({ "output": map })),
            other => Self::ok(serde_json::json!({ "result": other })),
        }
    }

    fn try_as_step_result(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        if !obj.contains_key("success") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Category/message-prefix convention for a non-`StepResult` exception,
    /// per DESIGN.md's Open Question resolution #3: standardise on
    /// `INTERNAL` with the exception type name folded into the message.
    pub fn from_exception(type_name: &str, message: &str) -> Self {
        Self::fail(format!("{type_name}: {message}"), ErrorCategory::Internal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepExecution {
    pub step_name: String,
    pub status: StepStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowRunStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowResult {
    pub status: WorkflowRunStatus,
    pub steps: Vec<StepExecution>,
    pub context: WorkflowContext,
    pub error_step: Option<String>,
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_rules_match_spec() {
        assert!(StepResult::from_value(serde_json::Value::Null).success);
        assert!(StepResult::from_value(serde_json::json!(true)).success);
        assert!(!StepResult::from_value(serde_json::json!(false)).success);
        assert_eq!(
            StepResult::from_value(serde_json::json!("hi")).output,
            serde_json::json!({"message": "hi"})
        );
        assert_eq!(
            StepResult::from_value(serde_json::json!(5)).output,
            serde_json::json!({"value": 5})
        );
    }

    #[test]
    fn coercion_is_idempotent() {
        let original = StepResult::ok(serde_json::json!({"a": 1}));
        let as_value = serde_json::to_value(&original).unwrap();
        let once = StepResult::from_value(as_value.clone());
        let twice_value = serde_json::to_value(&once).unwrap();
        let twice = StepResult::from_value(twice_value);
        assert_eq!(once.success, twice.success);
        assert_eq!(once.output, twice.output);
    }

    #[test]
    fn parallel_mode_requires_a_real_dependency() {
        let wf = Workflow {
            name: "wf".into(),
            steps: vec![Step {
                name: "a".into(),
                kind: StepKind::Lambda { handler: "noop".into() },
                depends_on: vec![],
                on_error: OnError::Stop,
                config: serde_json::json!({}),
            }],
            execution_policy: ExecutionPolicy {
                mode: ExecutionMode::Parallel,
                ..Default::default()
            },
            defaults: serde_json::json!({}),
        };
        assert!(!wf.uses_parallel_runner());
    }
}
