//! Step Executors (spec §4.5): typed operators over a workflow's steps.
//!
//! `action`/`condition`/`wait` are pure, self-contained executors. The
//! structural kinds (`parallel`/`sequential`/`loop`/`sub-workflow`) need
//! to recurse into sibling steps, which only the interpreter can drive
//! (it alone owns execution history and status transitions) — they
//! depend on the [`StepRunner`] callback the interpreter implements
//! rather than recursing directly.

pub mod action;
pub mod condition;
pub mod loop_step;
pub mod parallel;
pub mod sequential;
pub mod sub_workflow;
pub mod wait;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::id::{StepId, WorkflowId};
use crate::Result;

pub use action::{ActionFn, ActionRegistry};
pub use condition::ConditionOutcome;

/// Callback the structural executors use to run one sub-step, merging
/// its result into a per-iteration/per-branch context copy. Implemented
/// by [`super::interpreter::Interpreter`] so it alone mutates execution
/// state (spec §5 "single logical writer per hot state").
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, step: StepId, context: HashMap<String, Value>) -> Result<Value>;
}

/// Callback `sub-workflow` steps use to run an entire referenced
/// workflow to completion and get back its final context.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run_workflow(&self, workflow: WorkflowId, context: HashMap<String, Value>) -> Result<HashMap<String, Value>>;
}
