//! Hive Core - Swarm Coordination & Workflow Execution Runtime
//!
//! This crate provides the Swarm Coordination Core (Voting Engine,
//! Pattern Store, Agent Runtime, Queen Coordinator) and the Workflow
//! Execution Engine (Step Executors, Workflow Interpreter, Scheduler)
//! described in the system's design notes. Persistence, the HTTP/API
//! gateway, UI, and integration adapters are neighboring systems this
//! crate exposes contracts to, not things it implements.

#![recursion_limit = "256"]

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod pattern_store;
pub mod persistence;
pub mod queen;
pub mod scheduler;
pub mod utils;
pub mod voting;
pub mod workflow;

pub use agent::{Agent, AgentBehavior, AgentKind, AgentState, BaseAgentRuntime, Capability, Task, TaskPriority};
pub use error::{CoreError, ErrorKind, Result};
pub use events::{Event, EventSink, NullEventSink, RecordingEventSink, TracingEventSink};
pub use id::{
    AgentId, DecisionId, ExecutionId, GroupId, IdType, PatternId, ScheduleId, StepId, TaskId,
    VotingId, WorkflowId,
};
pub use pattern_store::{OutcomePredictor, Pattern, PatternKind, PatternStore, Prediction};
pub use persistence::{AppendLog, KvStore};
pub use queen::{Decision, OutcomeRecorder, QueenCoordinator};
pub use scheduler::{Recurrence, Schedule, ScheduleStatus, Scheduler};
pub use voting::{TieBreaker, VotingEngine, VotingRules, VotingTopic};
pub use workflow::{ExecutionStatus, Interpreter, Step, StepConfig, Workflow, WorkflowExecution};

/// Re-export of the types most callers wiring up this crate need.
pub mod prelude {
    pub use crate::{
        Agent, AgentId, CoreError, Event, EventSink, ExecutionId, Interpreter, PatternStore,
        QueenCoordinator, Recurrence, Result, Scheduler, Step, StepConfig, VotingEngine, Workflow,
        WorkflowExecution, WorkflowId,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
