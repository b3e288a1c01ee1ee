//! Crate-wide error type.
//!
//! `CoreError` groups every failure behind the taxonomy that the rest of the
//! crate dispatches on (Validation / Contract / Transient / Terminal /
//! Partial / Deferred). Each variant carries a `miette` diagnostic code and
//! help text the way the rest of this codebase annotates its errors.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{DecisionId, ExecutionId, GroupId, PatternId, ScheduleId, StepId, VotingId, WorkflowId};

/// Configuration-specific errors, nested under `CoreError::ConfigurationError`.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// The taxonomy a `CoreError` belongs to.
///
/// Lets callers such as the workflow interpreter's retry policy dispatch on
/// failure class without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Static graph/config defects caught before execution; never retried.
    Validation,
    /// API misuse: unknown id, duplicate, ineligible voter, wrong state.
    Contract,
    /// Timeouts, unavailable collaborators; the retry policy may retry these.
    Transient,
    /// Unrecoverable executor failure after retries/compensation ran out.
    Terminal,
    /// Parallel sub-step failures reported together as one error.
    Partial,
    /// Awaiting human approval; pauses progression without being a failure.
    Deferred,
}

#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    // ---- Validation ----
    #[error("workflow '{workflow}' failed validation")]
    #[diagnostic(
        code(hive::workflow_invalid),
        help("Fix the listed issues before activating or scheduling this workflow: {errors:?}")
    )]
    WorkflowInvalid {
        workflow: WorkflowId,
        errors: Vec<String>,
    },

    #[error("step '{step}' is invalid: {reason}")]
    #[diagnostic(code(hive::step_invalid))]
    StepInvalid { step: StepId, reason: String },

    #[error("voting topic has no options")]
    #[diagnostic(
        code(hive::invalid_options),
        help("A voting topic needs at least two options to be meaningful")
    )]
    InvalidOptions,

    // ---- Contract ----
    #[error("voting round '{id}' not found")]
    #[diagnostic(code(hive::voting_not_found))]
    VotingNotFound { id: VotingId },

    #[error("voting round '{id}' is already closed")]
    #[diagnostic(code(hive::voting_already_closed))]
    VotingAlreadyClosed { id: VotingId },

    #[error("voting round '{id}' is closed; votes are no longer accepted")]
    #[diagnostic(code(hive::voting_closed))]
    VotingClosed { id: VotingId },

    #[error("voter '{voter}' is not eligible to vote in round '{id}'")]
    #[diagnostic(
        code(hive::voter_ineligible),
        help("Only agents registered to the voting group when the round opened may vote")
    )]
    VoterIneligible { id: VotingId, voter: String },

    #[error("voter '{voter}' has already voted in round '{id}'")]
    #[diagnostic(code(hive::already_voted))]
    AlreadyVoted { id: VotingId, voter: String },

    #[error("option '{option}' is not a member of voting round '{id}'")]
    #[diagnostic(code(hive::invalid_option))]
    InvalidOption { id: VotingId, option: String },

    #[error("voting round '{id}' already exists")]
    #[diagnostic(code(hive::duplicate_voting))]
    DuplicateVoting { id: VotingId },

    #[error("agent group '{0}' already exists")]
    #[diagnostic(code(hive::duplicate_group))]
    DuplicateGroup(GroupId),

    #[error("agent '{0}' not found")]
    #[diagnostic(code(hive::agent_not_found))]
    AgentNotFound(String),

    #[error("workflow '{0}' not found")]
    #[diagnostic(code(hive::workflow_not_found))]
    WorkflowNotFound(WorkflowId),

    #[error("workflow '{workflow}' is busy")]
    #[diagnostic(
        code(hive::workflow_busy),
        help("This workflow already has an execution in progress and does not support overlap")
    )]
    WorkflowBusy { workflow: WorkflowId },

    #[error("execution '{0}' not found")]
    #[diagnostic(code(hive::execution_not_found))]
    ExecutionNotFound(ExecutionId),

    #[error("execution '{0}' is not paused")]
    #[diagnostic(code(hive::execution_not_paused), help("Only a paused execution can be resumed"))]
    ExecutionNotPaused(ExecutionId),

    #[error("schedule '{0}' not found")]
    #[diagnostic(code(hive::schedule_not_found))]
    ScheduleNotFound(ScheduleId),

    #[error("invalid cron expression '{expression}'")]
    #[diagnostic(code(hive::invalid_cron), help("{cause}"))]
    InvalidCron { expression: String, cause: String },

    #[error("decision '{0}' is not pending approval")]
    #[diagnostic(code(hive::decision_not_found))]
    DecisionNotFound(DecisionId),

    #[error("pattern '{0}' not found")]
    #[diagnostic(code(hive::pattern_not_found))]
    PatternNotFound(PatternId),

    #[error("failed to parse condition expression")]
    #[diagnostic(code(hive::expression_parse_error), help("{0}"))]
    ExpressionParseError(String),

    #[error("unsupported built-in action '{0}'")]
    #[diagnostic(
        code(hive::unsupported),
        help("Register a handler for this action before using it in a step")
    )]
    Unsupported(String),

    #[error("configuration error for field '{field}'")]
    #[diagnostic(code(hive::configuration_error), help("{reason}"))]
    ConfigurationError { field: String, reason: String },

    #[error("serialization error")]
    #[diagnostic(code(hive::serialization_error))]
    SerializationError {
        #[source]
        cause: SerializationCause,
    },

    #[error("persistence error during '{operation}'")]
    #[diagnostic(code(hive::persistence_error), help("{cause}"))]
    PersistenceError { operation: String, cause: String },

    // ---- Transient ----
    #[error("operation timed out after {millis}ms")]
    #[diagnostic(
        code(hive::timeout),
        help("Raise the timeout or check why the collaborator is slow to respond")
    )]
    Timeout { millis: u64 },

    #[error("agent '{agent}' is unavailable")]
    #[diagnostic(code(hive::agent_unavailable), help("{reason}"))]
    AgentUnavailable { agent: String, reason: String },

    // ---- Terminal ----
    #[error("step '{step}' failed")]
    #[diagnostic(code(hive::step_failed), help("{cause}"))]
    StepFailed { step: StepId, cause: String },

    #[error("workflow '{workflow}' failed")]
    #[diagnostic(code(hive::workflow_failed), help("{cause}"))]
    WorkflowFailed { workflow: WorkflowId, cause: String },

    // ---- Partial ----
    #[error("{0} of {1} parallel sub-steps failed")]
    #[diagnostic(code(hive::aggregate_error))]
    AggregateError(usize, usize, Vec<(StepId, String)>),

    // ---- Deferred ----
    #[error("decision '{0}' is pending human approval")]
    #[diagnostic(
        code(hive::approval_pending),
        help("Call approve() or reject() on this decision to let the workflow continue")
    )]
    ApprovalPending(DecisionId),
}

/// Wraps `serde_json::Error` so `CoreError` stays `Clone`-free but `Diagnostic`-friendly.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SerializationCause(String);

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Which taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use CoreError::*;
        match self {
            WorkflowInvalid { .. } | StepInvalid { .. } | InvalidOptions => ErrorKind::Validation,

            VotingNotFound { .. }
            | VotingAlreadyClosed { .. }
            | VotingClosed { .. }
            | VoterIneligible { .. }
            | AlreadyVoted { .. }
            | InvalidOption { .. }
            | DuplicateVoting { .. }
            | DuplicateGroup(_)
            | AgentNotFound(_)
            | WorkflowNotFound(_)
            | WorkflowBusy { .. }
            | ExecutionNotFound(_)
            | ExecutionNotPaused(_)
            | ScheduleNotFound(_)
            | InvalidCron { .. }
            | DecisionNotFound(_)
            | PatternNotFound(_)
            | ExpressionParseError(_)
            | Unsupported(_)
            | ConfigurationError { .. }
            | SerializationError { .. }
            | PersistenceError { .. } => ErrorKind::Contract,

            Timeout { .. } | AgentUnavailable { .. } => ErrorKind::Transient,

            StepFailed { .. } | WorkflowFailed { .. } => ErrorKind::Terminal,

            AggregateError(..) => ErrorKind::Partial,

            ApprovalPending(_) => ErrorKind::Deferred,
        }
    }

    /// Whether the workflow interpreter's retry policy should consider retrying this.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    pub fn timeout(millis: u64) -> Self {
        Self::Timeout { millis }
    }

    pub fn agent_unavailable(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AgentUnavailable {
            agent: agent.into(),
            reason: reason.into(),
        }
    }

    pub fn step_failed(step: StepId, cause: impl Into<String>) -> Self {
        Self::StepFailed {
            step,
            cause: cause.into(),
        }
    }

    pub fn workflow_failed(workflow: WorkflowId, cause: impl Into<String>) -> Self {
        Self::WorkflowFailed {
            workflow,
            cause: cause.into(),
        }
    }

    pub fn configuration_error(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence_error(operation: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::PersistenceError {
            operation: operation.into(),
            cause: cause.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError {
            cause: SerializationCause(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    #[test]
    fn reports_contract_kind_and_help_text() {
        let id = VotingId::generate();
        let error = CoreError::VoterIneligible {
            id,
            voter: "agent_xyz".into(),
        };
        assert_eq!(error.kind(), ErrorKind::Contract);
        assert!(!error.is_retryable());

        let report = Report::new(error);
        let output = format!("{:?}", report);
        assert!(output.contains("not eligible"));
    }

    #[test]
    fn timeout_is_retryable_transient() {
        let error = CoreError::timeout(5_000);
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.is_retryable());
    }

    #[test]
    fn aggregate_error_is_partial() {
        let step = StepId::generate();
        let error = CoreError::AggregateError(1, 3, vec![(step, "boom".into())]);
        assert_eq!(error.kind(), ErrorKind::Partial);
        assert!(!error.is_retryable());
    }
}
