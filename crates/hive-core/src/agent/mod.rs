//! Agent Runtime (spec §4.3): per-worker lifecycle, capability
//! registration, report generation, task execution, and learning
//! feedback.

pub mod capability;
pub mod runtime;
pub mod types;

pub use capability::{capability_matches, fuzzy_match, relevance_score};
pub use runtime::BaseAgentRuntime;
pub use types::{
    Agent, AgentBehavior, AgentKind, AgentState, Capability, PerformanceRecord, Report, Task,
    TaskPriority,
};
