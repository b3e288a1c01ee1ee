//! Shared bookkeeping for worker agents (spec §4.3): queue, performance,
//! confidence, and learning. Concrete agent kinds (crm/marketing/
//! analytics/process) only need to supply an [`AgentBehavior`].
//!
//! Queue/state/current-task live behind a `tokio::sync::Mutex` rather
//! than `parking_lot` because executing a task (and generating a report)
//! may suspend on an external call — state mutated across an `.await`
//! needs a lock that survives it.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use crate::events::{Event, EventSink};
use crate::id::AgentId;
use crate::Result;

use super::types::{
    Agent, AgentBehavior, AgentKind, AgentState, Capability, PerformanceRecord, Report, Task,
    TaskPriority,
};
use super::capability::relevance_score;

struct RuntimeInner {
    state: AgentState,
    queue: VecDeque<Task>,
    current: Option<crate::id::TaskId>,
}

/// Concrete [`Agent`] implementation sharing queue/state/performance
/// machinery across all specialist kinds.
pub struct BaseAgentRuntime {
    id: AgentId,
    kind: AgentKind,
    capabilities: RwLock<Vec<Capability>>,
    performance: RwLock<PerformanceRecord>,
    inner: tokio::sync::Mutex<RuntimeInner>,
    behavior: Arc<dyn AgentBehavior>,
    sink: Arc<dyn EventSink>,
}

impl BaseAgentRuntime {
    pub fn new(
        id: AgentId,
        kind: AgentKind,
        capabilities: Vec<Capability>,
        behavior: Arc<dyn AgentBehavior>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        sink.publish(Event::AgentInitialized { agent: id });
        Self {
            id,
            kind,
            capabilities: RwLock::new(capabilities),
            performance: RwLock::new(PerformanceRecord::default()),
            inner: tokio::sync::Mutex::new(RuntimeInner {
                state: AgentState::Idle,
                queue: VecDeque::new(),
                current: None,
            }),
            behavior,
            sink,
        }
    }

    /// Confidence = 0.7·relevance + min(tasksCompleted/100, 0.2) + 0.1·successRate, clipped to [0,1].
    fn confidence(&self, relevance: f64) -> f64 {
        let perf = self.performance.read();
        let experience_term = (perf.tasks_completed as f64 / 100.0).min(0.2);
        (0.7 * relevance + experience_term + 0.1 * perf.success_rate).clamp(0.0, 1.0)
    }

    /// Feedback messages adjust the rolling success rate (spec §4.3).
    pub fn apply_feedback(&self, success_signal: f64) {
        self.performance.write().apply_feedback(success_signal);
        self.sink.publish(Event::AgentFeedbackProcessed { agent: self.id });
    }
}

#[async_trait]
impl Agent for BaseAgentRuntime {
    fn id(&self) -> AgentId {
        self.id
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn state(&self) -> AgentState {
        self.inner.try_lock().map(|g| g.state).unwrap_or(AgentState::Busy)
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.read().clone()
    }

    fn performance(&self) -> PerformanceRecord {
        self.performance.read().clone()
    }

    async fn analyze(&self, topic: &str, context: &HashMap<String, Value>) -> Result<Value> {
        self.behavior.analyze(topic, context).await
    }

    async fn formulate_recommendation(
        &self,
        topic: &str,
        context: &HashMap<String, Value>,
    ) -> Result<Report> {
        let relevance = relevance_score(&self.capabilities(), topic, context);
        let analysis = self.analyze(topic, context).await?;
        let (recommendation, reasoning) = self
            .behavior
            .formulate_recommendation(topic, context, analysis)
            .await?;
        let confidence = self.confidence(relevance);
        self.performance.write().record_confidence(confidence);
        self.sink.publish(Event::AgentReportGenerated { agent: self.id });

        Ok(Report {
            agent: self.id,
            recommendation,
            confidence,
            reasoning,
            generated_at: Utc::now(),
        })
    }

    /// Enqueues the task by priority (critical prepends, else appends)
    /// and drains the shared queue one task at a time until this one has
    /// been processed — preserving the exactly-one-current-task
    /// invariant even when multiple callers submit concurrently.
    async fn execute_task(&self, task: Task) -> Result<Value> {
        let wanted_id = task.id;
        {
            let mut inner = self.inner.lock().await;
            match task.priority {
                TaskPriority::Critical => inner.queue.push_front(task),
                TaskPriority::Normal => inner.queue.push_back(task),
            }
        }

        loop {
            let mut inner = self.inner.lock().await;
            if inner.current.is_some() {
                drop(inner);
                tokio::task::yield_now().await;
                continue;
            }
            let Some(next) = inner.queue.pop_front() else {
                drop(inner);
                tokio::task::yield_now().await;
                continue;
            };
            inner.current = Some(next.id);
            inner.state = AgentState::Busy;
            drop(inner);

            self.sink.publish(Event::AgentProcessingTask { agent: self.id });
            let started = Utc::now();
            let is_ours = next.id == wanted_id;
            let outcome = self.behavior.execute_task(&next).await;
            let elapsed_ms = (Utc::now() - started).num_milliseconds().max(0) as f64;

            {
                let mut inner = self.inner.lock().await;
                inner.current = None;
                inner.state = if outcome.is_ok() {
                    AgentState::Active
                } else {
                    AgentState::Error
                };
            }
            self.performance
                .write()
                .record_task(outcome.is_ok(), elapsed_ms);

            if is_ours {
                return outcome;
            }
        }
    }

    fn accepts_collaboration(&self) -> bool {
        match self.inner.try_lock() {
            Ok(inner) => inner.state != AgentState::Busy && inner.queue.len() < 5,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use serde_json::json;

    struct EchoBehavior;

    #[async_trait]
    impl AgentBehavior for EchoBehavior {
        async fn analyze(&self, _topic: &str, _context: &HashMap<String, Value>) -> Result<Value> {
            Ok(json!({"analyzed": true}))
        }

        async fn formulate_recommendation(
            &self,
            _topic: &str,
            _context: &HashMap<String, Value>,
            _analysis: Value,
        ) -> Result<(Value, String)> {
            Ok((json!("do-the-thing"), "because reasons".to_string()))
        }

        async fn execute_task(&self, task: &Task) -> Result<Value> {
            Ok(task.payload.clone())
        }
    }

    fn runtime() -> BaseAgentRuntime {
        BaseAgentRuntime::new(
            AgentId::generate(),
            AgentKind::Crm,
            vec![Capability::new("billing", 0.9).with_keywords(["invoice".to_string()])],
            Arc::new(EchoBehavior),
            Arc::new(NullEventSink),
        )
    }

    #[tokio::test]
    async fn executes_task_and_returns_to_idle() {
        let runtime = runtime();
        let task = Task::new(json!({"do": "bill-customer"}), TaskPriority::Normal);
        let result = runtime.execute_task(task).await.unwrap();
        assert_eq!(result, json!({"do": "bill-customer"}));
        assert_eq!(runtime.performance().tasks_completed, 1);
    }

    #[tokio::test]
    async fn formulate_recommendation_uses_relevance_and_performance() {
        let runtime = runtime();
        let mut ctx = HashMap::new();
        ctx.insert("note".to_string(), json!("please send an invoice"));
        let report = runtime
            .formulate_recommendation("overdue invoice", &ctx)
            .await
            .unwrap();
        assert!(report.confidence > 0.0);
        assert!(report.confidence <= 1.0);
    }

    #[tokio::test]
    async fn accepts_collaboration_when_idle_with_room() {
        let runtime = runtime();
        assert!(runtime.accepts_collaboration());
    }
}
