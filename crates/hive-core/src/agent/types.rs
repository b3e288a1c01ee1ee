//! Data model for the Agent Runtime (spec §3, §4.3).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{AgentId, TaskId};
use crate::Result;

/// Closed set of specialist roles a worker agent may play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    Crm,
    Marketing,
    Analytics,
    Process,
}

/// A named proficiency an agent declares. `keywords` drives both the
/// agent's own relevance scoring (§4.3) and the Queen's capability-based
/// selection (§4.2) — the two consult the same declared list rather than
/// a hardcoded per-domain table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub proficiency: f64,
    pub experience: u64,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, proficiency: f64) -> Self {
        let name = name.into();
        Self {
            keywords: vec![name.clone()],
            name,
            proficiency: proficiency.clamp(0.0, 1.0),
            experience: 0,
        }
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = String>) -> Self {
        self.keywords.extend(keywords);
        self
    }
}

/// Current lifecycle state of an agent. `state == Busy` iff a current
/// task exists (spec §3 invariant), enforced by `BaseAgentRuntime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentState {
    Idle,
    Active,
    Busy,
    Error,
    Offline,
}

/// Rolling performance bookkeeping (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub tasks_completed: u64,
    pub tasks_total: u64,
    pub success_rate: f64,
    pub mean_response_time_ms: f64,
    pub mean_confidence: f64,
}

impl Default for PerformanceRecord {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            tasks_total: 0,
            success_rate: 0.0,
            mean_response_time_ms: 0.0,
            mean_confidence: 0.0,
        }
    }
}

impl PerformanceRecord {
    /// Fold one completed task's outcome into the rolling averages.
    pub fn record_task(&mut self, succeeded: bool, response_time_ms: f64) {
        self.tasks_total += 1;
        if succeeded {
            self.tasks_completed += 1;
        }
        let n = self.tasks_total as f64;
        self.success_rate += (if succeeded { 1.0 } else { 0.0 } - self.success_rate) / n;
        self.mean_response_time_ms += (response_time_ms - self.mean_response_time_ms) / n;
    }

    /// Fold a newly generated report's confidence into the rolling mean,
    /// used by the next task's confidence formula (spec §4.3).
    pub fn record_confidence(&mut self, confidence: f64) {
        // Reuses tasks_total as the sample count so both rolling means
        // stay on the same denominator.
        let n = (self.tasks_total + 1) as f64;
        self.mean_confidence += (confidence - self.mean_confidence) / n;
    }

    /// Feedback messages adjust success rate directly (spec §4.3).
    pub fn apply_feedback(&mut self, success_signal: f64) {
        let n = (self.tasks_total + 1) as f64;
        self.success_rate += (success_signal.clamp(0.0, 1.0) - self.success_rate) / n;
    }
}

/// Priority used for task-queue insertion (spec §4.3: "critical" prepends, else appends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    Critical,
    Normal,
}

/// A unit of work handed to an agent's queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub priority: TaskPriority,
    pub payload: Value,
}

impl Task {
    pub fn new(payload: Value, priority: TaskPriority) -> Self {
        Self {
            id: TaskId::generate(),
            priority,
            payload,
        }
    }
}

/// Produced by an agent in response to a topic+context; consumed by the
/// Queen and discarded once tallied (spec §3: ephemeral).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub agent: AgentId,
    pub recommendation: Value,
    pub confidence: f64,
    pub reasoning: String,
    pub generated_at: DateTime<Utc>,
}

/// The three behaviors a specialist agent supplies; the base runtime
/// handles everything else (queue, performance, confidence, learning).
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    async fn analyze(&self, topic: &str, context: &HashMap<String, Value>) -> Result<Value>;

    /// Returns (recommendation, reasoning). Confidence is computed by the
    /// runtime from relevance and performance, not supplied here.
    async fn formulate_recommendation(
        &self,
        topic: &str,
        context: &HashMap<String, Value>,
        analysis: Value,
    ) -> Result<(Value, String)>;

    async fn execute_task(&self, task: &Task) -> Result<Value>;
}

/// The interface the rest of the core interacts with. Grounded in the
/// shape of the base `Agent` trait (`id`/`state`/message-or-task
/// processing) but re-specified around this domain's three behaviors.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;
    fn kind(&self) -> AgentKind;
    fn state(&self) -> AgentState;
    fn capabilities(&self) -> Vec<Capability>;
    fn performance(&self) -> PerformanceRecord;

    async fn analyze(&self, topic: &str, context: &HashMap<String, Value>) -> Result<Value>;
    async fn formulate_recommendation(
        &self,
        topic: &str,
        context: &HashMap<String, Value>,
    ) -> Result<Report>;
    async fn execute_task(&self, task: Task) -> Result<Value>;

    /// Whether this agent may accept a collaboration request right now:
    /// state is not busy and the queue has room (spec §4.3).
    fn accepts_collaboration(&self) -> bool;
}
