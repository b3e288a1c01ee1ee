//! Data model for the Workflow Execution Engine (spec §3, §4.5-4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{ExecutionId, StepId, WorkflowId};

/// Closed set of executor kinds (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Action,
    Condition,
    Parallel,
    Sequential,
    Loop,
    Wait,
    SubWorkflow,
}

/// What to do when a step fails (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OnErrorPolicy {
    #[default]
    Stop,
    Continue,
    Retry,
    Compensate,
}

/// Kind-specific configuration for a step. Modeled as a tagged enum
/// rather than an untyped `Value` bag so each executor's `validate()`
/// can check field presence at the type level; `action`/`condition`
/// still bottom out in `Value` since their payloads are caller-defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepConfig {
    Action {
        /// Built-in name (`log`, `set-variable`, `http-request`) or a
        /// caller-registered function name.
        function: String,
        #[serde(default)]
        args: Value,
    },
    Condition {
        expression: String,
        true_path: Option<StepId>,
        false_path: Option<StepId>,
    },
    Parallel {
        sub_steps: Vec<StepId>,
        max_concurrency: Option<usize>,
    },
    Sequential {
        sub_steps: Vec<StepId>,
    },
    Loop {
        /// Dotted context path to the collection being iterated.
        collection_path: String,
        item_var: String,
        index_var: String,
        body: StepId,
    },
    Wait {
        duration_ms: Option<u64>,
        until: Option<DateTime<Utc>>,
    },
    SubWorkflow {
        workflow: WorkflowId,
        /// context-path → sub-workflow-input-path.
        input_mapping: HashMap<String, String>,
        /// sub-workflow-output-path → context-path.
        output_mapping: HashMap<String, String>,
    },
}

impl StepConfig {
    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::Action { .. } => StepKind::Action,
            StepConfig::Condition { .. } => StepKind::Condition,
            StepConfig::Parallel { .. } => StepKind::Parallel,
            StepConfig::Sequential { .. } => StepKind::Sequential,
            StepConfig::Loop { .. } => StepKind::Loop,
            StepConfig::Wait { .. } => StepKind::Wait,
            StepConfig::SubWorkflow { .. } => StepKind::SubWorkflow,
        }
    }
}

/// One node of a workflow graph (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub config: StepConfig,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub on_error: OnErrorPolicy,
    pub compensation_step: Option<StepId>,
}

impl Step {
    pub fn kind(&self) -> StepKind {
        self.config.kind()
    }
}

/// A workflow definition: graph of steps plus variables and config
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub error_handling: OnErrorPolicy,
}

impl Workflow {
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Result of synchronous, pre-run validation (spec §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Lifecycle of a single step within an execution (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One entry in an execution's append-only history (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: StepId,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Top-level state machine status for a workflow execution (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

/// A snapshot of one run of a workflow (spec §3). Owned exclusively by
/// the interpreter task driving it; callers only ever see clones
/// returned by `status()`/`history()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow: WorkflowId,
    pub status: ExecutionStatus,
    pub current_step: Option<StepId>,
    pub history: Vec<HistoryEntry>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Variables merged with per-step results, keyed by step id for the
    /// latter (spec §3 "context (variables + per-step results)").
    pub context: HashMap<String, Value>,
}

impl WorkflowExecution {
    pub fn new(id: ExecutionId, workflow: WorkflowId, variables: HashMap<String, Value>) -> Self {
        Self {
            id,
            workflow,
            status: ExecutionStatus::Idle,
            current_step: None,
            history: Vec::new(),
            started_at: None,
            ended_at: None,
            context: variables,
        }
    }

    pub fn step_status(&self, step: StepId) -> Option<StepStatus> {
        self.history
            .iter()
            .rev()
            .find(|e| e.step == step)
            .map(|e| e.status)
    }
}
