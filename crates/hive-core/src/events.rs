//! Observability events.
//!
//! Every component takes an `Arc<dyn EventSink>` at construction rather than
//! reaching for a process-wide emitter. `Event` is a closed enum; variant
//! names mirror the dotted event names in the external interface so a sink
//! implementation can match on `event.name()` for wire logging without
//! losing the structured payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{AgentId, DecisionId, ExecutionId, GroupId, PatternId, ScheduleId, StepId, VotingId, WorkflowId};

/// A structured event published by some component of the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    // workflow:*
    WorkflowCreated { workflow: WorkflowId },
    WorkflowStart { workflow: WorkflowId, execution: ExecutionId },
    WorkflowComplete { workflow: WorkflowId, execution: ExecutionId },
    WorkflowError { workflow: WorkflowId, execution: ExecutionId, message: String },
    WorkflowPause { workflow: WorkflowId, execution: ExecutionId },
    WorkflowResume { workflow: WorkflowId, execution: ExecutionId },
    WorkflowCancelled { workflow: WorkflowId, execution: ExecutionId },
    WorkflowCompensationStart { workflow: WorkflowId, execution: ExecutionId },
    WorkflowCompensationStep { workflow: WorkflowId, step: StepId },
    WorkflowCompensationComplete { workflow: WorkflowId, execution: ExecutionId },
    WorkflowCompensationError { workflow: WorkflowId, step: StepId, message: String },

    // step:*
    StepStart { execution: ExecutionId, step: StepId },
    StepComplete { execution: ExecutionId, step: StepId, duration_ms: u64 },
    StepError { execution: ExecutionId, step: StepId, message: String },
    StepRetry { execution: ExecutionId, step: StepId, attempt: u32 },
    StepSkipped { execution: ExecutionId, step: StepId },
    StepExecutionError { execution: ExecutionId, step: StepId, message: String },

    // majority:*
    MajorityInitialized { voting: VotingId },
    MajorityVotingStarted { voting: VotingId, eligible: usize },
    MajorityVoteCast { voting: VotingId, voter: AgentId },
    MajorityVotingClosed { voting: VotingId },
    MajorityTieBreakNeeded { voting: VotingId, options: Vec<String> },
    MajorityDecisionDeferred { voting: VotingId },

    // pattern:*
    PatternObserved { pattern: PatternId },
    PatternPredicted { pattern: PatternId, confidence: f64 },
    PatternPruned { pattern: PatternId },

    // agent:*
    AgentInitialized { agent: AgentId },
    AgentReportGenerated { agent: AgentId },
    AgentResponseReceived { agent: AgentId },
    AgentTasksAssigned { agent: AgentId, count: usize },
    AgentCollaborationRequested { agent: AgentId, from: AgentId },
    AgentCollaborationResponse { agent: AgentId, accepted: bool },
    AgentProcessingTask { agent: AgentId },
    AgentLearning { agent: AgentId },
    AgentFeedbackProcessed { agent: AgentId },
    AgentError { agent: AgentId, message: String },

    // schedule:*
    ScheduleRegistered { schedule: ScheduleId, workflow: WorkflowId },
    ScheduleUpdated { schedule: ScheduleId },
    SchedulePaused { schedule: ScheduleId },
    ScheduleResumed { schedule: ScheduleId },
    ScheduleFired { schedule: ScheduleId, execution: ExecutionId },
    ScheduleCompleted { schedule: ScheduleId },
    ScheduleFailed { schedule: ScheduleId, message: String },
    ScheduleCancelled { schedule: ScheduleId },

    // HITL contract
    ApprovalRequired { decision: DecisionId, deadline_secs: i64 },
    ApprovalGranted { decision: DecisionId },
    ApprovalRejected { decision: DecisionId, reason: String },

    /// Escape hatch for events not worth a dedicated variant, e.g. group lifecycle.
    Custom { name: String, group: Option<GroupId>, payload: Value },
}

impl Event {
    /// Stable dotted name matching the external interface's event catalog.
    pub fn name(&self) -> &'static str {
        use Event::*;
        match self {
            WorkflowCreated { .. } => "workflow:created",
            WorkflowStart { .. } => "workflow:start",
            WorkflowComplete { .. } => "workflow:complete",
            WorkflowError { .. } => "workflow:error",
            WorkflowPause { .. } => "workflow:pause",
            WorkflowResume { .. } => "workflow:resume",
            WorkflowCancelled { .. } => "workflow:cancelled",
            WorkflowCompensationStart { .. } => "workflow:compensation-start",
            WorkflowCompensationStep { .. } => "workflow:compensation-step",
            WorkflowCompensationComplete { .. } => "workflow:compensation-complete",
            WorkflowCompensationError { .. } => "workflow:compensation-error",
            StepStart { .. } => "step:start",
            StepComplete { .. } => "step:complete",
            StepError { .. } => "step:error",
            StepRetry { .. } => "step:retry",
            StepSkipped { .. } => "step:skipped",
            StepExecutionError { .. } => "step:execution-error",
            MajorityInitialized { .. } => "majority:initialized",
            MajorityVotingStarted { .. } => "majority:voting-started",
            MajorityVoteCast { .. } => "majority:vote-cast",
            MajorityVotingClosed { .. } => "majority:voting-closed",
            MajorityTieBreakNeeded { .. } => "majority:tie-break-needed",
            MajorityDecisionDeferred { .. } => "majority:decision-deferred",
            PatternObserved { .. } => "pattern:observed",
            PatternPredicted { .. } => "pattern:predicted",
            PatternPruned { .. } => "pattern:pruned",
            AgentInitialized { .. } => "agent:initialized",
            AgentReportGenerated { .. } => "agent:report-generated",
            AgentResponseReceived { .. } => "agent:response-received",
            AgentTasksAssigned { .. } => "agent:tasks-assigned",
            AgentCollaborationRequested { .. } => "agent:collaboration-requested",
            AgentCollaborationResponse { .. } => "agent:collaboration-response",
            AgentProcessingTask { .. } => "agent:processing-task",
            AgentLearning { .. } => "agent:learning",
            AgentFeedbackProcessed { .. } => "agent:feedback-processed",
            AgentError { .. } => "agent:error",
            ScheduleRegistered { .. } => "schedule:registered",
            ScheduleUpdated { .. } => "schedule:updated",
            SchedulePaused { .. } => "schedule:paused",
            ScheduleResumed { .. } => "schedule:resumed",
            ScheduleFired { .. } => "schedule:fired",
            ScheduleCompleted { .. } => "schedule:completed",
            ScheduleFailed { .. } => "schedule:failed",
            ScheduleCancelled { .. } => "schedule:cancelled",
            ApprovalRequired { .. } => "approval-required",
            ApprovalGranted { .. } => "approval-granted",
            ApprovalRejected { .. } => "approval-rejected",
            Custom { .. } => "custom",
        }
    }
}

/// Where components publish events. No process-wide emitter: every
/// stateful component is handed one of these at construction.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// A sink that drops every event; useful in tests that don't assert on them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: Event) {}
}

/// A sink that logs each event via `tracing` at debug level, following
/// the rest of this crate's structured-logging convention.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: Event) {
        tracing::debug!(event = event.name(), payload = ?event, "event published");
    }
}

/// An in-memory sink that records every event, for tests that need to
/// assert on emission order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: parking_lot::Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(Event::name).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingEventSink::new();
        sink.publish(Event::MajorityInitialized {
            voting: VotingId::generate(),
        });
        sink.publish(Event::MajorityVotingClosed {
            voting: VotingId::generate(),
        });
        assert_eq!(
            sink.names(),
            vec!["majority:initialized", "majority:voting-closed"]
        );
    }

    #[test]
    fn event_names_match_external_interface_catalog() {
        assert_eq!(
            Event::WorkflowCompensationStep {
                workflow: WorkflowId::generate(),
                step: StepId::generate(),
            }
            .name(),
            "workflow:compensation-step"
        );
    }
}
