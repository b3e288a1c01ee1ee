//! Workflow Execution Engine (spec §2, §3, §4.5-4.6): typed step graphs,
//! a restricted expression language for conditions, static validation,
//! pluggable step executors, and the interpreter that drives them.

pub mod executors;
pub mod expr;
pub mod interpreter;
pub mod types;
pub mod validate;

pub use executors::{ActionFn, ActionRegistry, ConditionOutcome, StepRunner, WorkflowRunner};
pub use expr::Expr;
pub use interpreter::{Interpreter, ValidationOutcome};
pub use types::{
    ExecutionStatus, HistoryEntry, OnErrorPolicy, Step, StepConfig, StepKind, StepStatus,
    ValidationResult, Workflow, WorkflowExecution,
};
pub use validate::validate;
