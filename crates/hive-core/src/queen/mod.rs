//! Queen Coordinator (spec §4.2): selects participating agents, fans out
//! report requests, synthesizes a decision via the Voting Engine, and
//! applies the auto-execution threshold / HITL escalation.

pub mod types;

pub use types::{Decision, DecisionRecord, NullOutcomeRecorder, OutcomeRecorder, PendingDecision};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;

use crate::agent::{capability_matches, relevance_score, Agent};
use crate::config::QueenConfig;
use crate::events::{Event, EventSink};
use crate::id::{AgentId, DecisionId};
use crate::voting::{Legitimacy, Vote, VoteOption, VotingEngine, VotingRules, VotingTopic};
use crate::{CoreError, Result};

pub struct QueenCoordinator {
    agents: DashMap<AgentId, Arc<dyn Agent>>,
    voting: Arc<VotingEngine>,
    pending: DashMap<DecisionId, PendingDecision>,
    sink: Arc<dyn EventSink>,
    recorder: Arc<dyn OutcomeRecorder>,
    auto_execution_threshold: f64,
    fan_out_timeout: Duration,
}

impl QueenCoordinator {
    pub fn new(
        voting: Arc<VotingEngine>,
        sink: Arc<dyn EventSink>,
        recorder: Arc<dyn OutcomeRecorder>,
        config: &QueenConfig,
    ) -> Self {
        Self {
            agents: DashMap::new(),
            voting,
            pending: DashMap::new(),
            sink,
            recorder,
            auto_execution_threshold: config.auto_execution_threshold,
            fan_out_timeout: config.fan_out_timeout,
        }
    }

    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id(), agent);
    }

    pub fn deregister_agent(&self, agent_id: &AgentId) {
        self.agents.remove(agent_id);
    }

    /// Agents whose declared capability keywords fuzzy-match the topic or
    /// context tokens (spec §4.2 step 1), case-insensitively.
    fn select_agents(&self, topic: &str, context: &HashMap<String, Value>) -> Vec<Arc<dyn Agent>> {
        let haystack = crate::agent::capability::tokenize_topic_and_context(topic, context);
        self.agents
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .capabilities()
                    .iter()
                    .any(|cap| capability_matches(cap, &haystack))
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Run a full decision round: select → fan out → vote → resolve.
    pub async fn decide(&self, topic: &str, context: HashMap<String, Value>) -> Result<Decision> {
        let participants = self.select_agents(topic, &context);
        if participants.is_empty() {
            return Err(CoreError::AgentUnavailable {
                agent: topic.to_string(),
                reason: "no registered agent's capabilities match this topic".to_string(),
            });
        }

        let mut reports = Vec::new();
        for agent in &participants {
            let outcome = tokio::time::timeout(
                self.fan_out_timeout,
                agent.formulate_recommendation(topic, &context),
            )
            .await;
            match outcome {
                Ok(Ok(report)) => reports.push((agent.clone(), report)),
                Ok(Err(_)) | Err(_) => {
                    // Non-responding or erroring agents simply don't get a vote.
                }
            }
        }

        if reports.is_empty() {
            return Err(CoreError::Timeout {
                millis: self.fan_out_timeout.as_millis() as u64,
            });
        }

        let options: Vec<VoteOption> = reports
            .iter()
            .enumerate()
            .map(|(i, (_, report))| VoteOption {
                id: format!("opt-{i}"),
                value: report.recommendation.clone(),
                description: report.reasoning.clone(),
            })
            .collect();

        let mut topic_ctx = HashMap::new();
        topic_ctx.insert("topic".to_string(), Value::String(topic.to_string()));
        let mut voting_topic = VotingTopic::new(options);
        voting_topic.context = topic_ctx;

        let eligible: Vec<AgentId> = reports.iter().map(|(agent, _)| agent.id()).collect();
        let mut rules = VotingRules::default();
        rules.weighted_voting = true;
        let voting_id = self.voting.open(voting_topic, eligible, Some(rules))?;

        let mean_confidence = {
            let total: f64 = reports.iter().map(|(_, r)| r.confidence).sum();
            total / reports.len() as f64
        };

        let mut auto_closed = None;
        for (i, (agent, report)) in reports.iter().enumerate() {
            let relevance = relevance_score(&agent.capabilities(), topic, &context);
            let weight = relevance * (0.5 + 0.5 * agent.performance().success_rate);
            self.voting
                .weights()
                .set(agent.id(), weight.max(f64::EPSILON));
            let vote = Vote::new(agent.id(), format!("opt-{i}"))
                .with_weight(weight.max(f64::EPSILON))
                .with_confidence(report.confidence);
            // Every participant is eligible and casts exactly one vote, so
            // the engine auto-closes on the last one; capture that result
            // rather than calling close() again on an already-removed round.
            if let Ok(Some(closed)) = self.voting.cast(voting_id, vote) {
                auto_closed = Some(closed);
            }
        }

        let result = match auto_closed {
            Some(result) => result,
            None => self.voting.close(voting_id)?,
        };
        let recommendation = result
            .winner
            .as_ref()
            .and_then(|winner_id| options_value(&reports, winner_id))
            .unwrap_or(Value::Null);

        if mean_confidence < self.auto_execution_threshold || result.legitimacy != Legitimacy::Valid
        {
            let decision_id = DecisionId::generate();
            let deadline = Utc::now() + chrono::Duration::seconds(300);
            self.pending.insert(
                decision_id,
                PendingDecision {
                    id: decision_id,
                    topic: topic.to_string(),
                    context: context.clone(),
                    reports: reports.iter().map(|(_, r)| r.clone()).collect(),
                    result: result.clone(),
                    mean_confidence,
                    deadline,
                },
            );
            self.sink.publish(Event::ApprovalRequired {
                decision: decision_id,
                deadline_secs: 300,
            });
            Ok(Decision::Pending(decision_id))
        } else {
            self.recorder.record(DecisionRecord {
                topic: topic.to_string(),
                context,
                recommendation: recommendation.clone(),
                confidence: mean_confidence,
                legitimacy: result.legitimacy,
                accepted: true,
            });
            Ok(Decision::Execute {
                decision: DecisionId::generate(),
                recommendation,
                confidence: mean_confidence,
            })
        }
    }

    pub fn approve(&self, decision_id: DecisionId) -> Result<Decision> {
        let (_, pending) = self
            .pending
            .remove(&decision_id)
            .ok_or(CoreError::DecisionNotFound(decision_id))?;

        let recommendation = pending
            .result
            .winner
            .as_ref()
            .and_then(|winner_id| {
                pending
                    .reports
                    .iter()
                    .enumerate()
                    .find(|(i, _)| format!("opt-{i}") == *winner_id)
                    .map(|(_, r)| r.recommendation.clone())
            })
            .unwrap_or(Value::Null);

        self.sink.publish(Event::ApprovalGranted { decision: decision_id });
        self.recorder.record(DecisionRecord {
            topic: pending.topic,
            context: pending.context,
            recommendation: recommendation.clone(),
            confidence: pending.mean_confidence,
            legitimacy: pending.result.legitimacy,
            accepted: true,
        });

        Ok(Decision::Execute {
            decision: decision_id,
            recommendation,
            confidence: pending.mean_confidence,
        })
    }

    pub fn reject(&self, decision_id: DecisionId, reason: impl Into<String>) -> Result<()> {
        let (_, pending) = self
            .pending
            .remove(&decision_id)
            .ok_or(CoreError::DecisionNotFound(decision_id))?;

        let reason = reason.into();
        self.sink.publish(Event::ApprovalRejected {
            decision: decision_id,
            reason,
        });
        self.recorder.record(DecisionRecord {
            topic: pending.topic,
            context: pending.context,
            recommendation: Value::Null,
            confidence: pending.mean_confidence,
            legitimacy: pending.result.legitimacy,
            accepted: false,
        });
        Ok(())
    }

    pub fn pending_decision(&self, decision_id: &DecisionId) -> Option<PendingDecision> {
        self.pending.get(decision_id).map(|d| d.clone())
    }
}

fn options_value(
    reports: &[(Arc<dyn Agent>, crate::agent::Report)],
    winner_option_id: &str,
) -> Option<Value> {
    let index: usize = winner_option_id.strip_prefix("opt-")?.parse().ok()?;
    reports.get(index).map(|(_, r)| r.recommendation.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentBehavior, AgentKind, BaseAgentRuntime, Capability, Task};
    use crate::events::NullEventSink;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubBehavior {
        recommendation: Value,
    }

    #[async_trait]
    impl AgentBehavior for StubBehavior {
        async fn analyze(
            &self,
            _topic: &str,
            _context: &HashMap<String, Value>,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn formulate_recommendation(
            &self,
            _topic: &str,
            _context: &HashMap<String, Value>,
            _analysis: Value,
        ) -> Result<(Value, String)> {
            Ok((self.recommendation.clone(), "stub".to_string()))
        }

        async fn execute_task(&self, _task: &Task) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn coordinator() -> QueenCoordinator {
        QueenCoordinator::new(
            Arc::new(VotingEngine::new(Arc::new(NullEventSink), VotingRules::default())),
            Arc::new(NullEventSink),
            Arc::new(NullOutcomeRecorder),
            &QueenConfig {
                auto_execution_threshold: 0.0,
                fan_out_timeout: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test]
    async fn decides_and_auto_executes_with_low_threshold() {
        let queen = coordinator();
        let agent = Arc::new(BaseAgentRuntime::new(
            AgentId::generate(),
            AgentKind::Crm,
            vec![Capability::new("billing", 0.9)],
            Arc::new(StubBehavior {
                recommendation: json!("send-invoice"),
            }),
            Arc::new(NullEventSink),
        ));
        queen.register_agent(agent);

        let decision = queen.decide("billing question", HashMap::new()).await.unwrap();
        match decision {
            Decision::Execute { recommendation, .. } => {
                assert_eq!(recommendation, json!("send-invoice"));
            }
            Decision::Pending(_) => panic!("expected immediate execution"),
        }
    }

    #[tokio::test]
    async fn no_matching_agent_is_unavailable_error() {
        let queen = coordinator();
        let err = queen
            .decide("completely unrelated topic", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AgentUnavailable { .. }));
    }
}
