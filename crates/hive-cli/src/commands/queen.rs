use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Result;
use serde::Deserialize;
use serde_json::Value;

use hive_core::agent::{Agent, AgentBehavior, AgentKind, BaseAgentRuntime, Capability, Task};
use hive_core::config::QueenConfig;
use hive_core::id::AgentId;
use hive_core::queen::{Decision, NullOutcomeRecorder, QueenCoordinator};
use hive_core::voting::{VotingEngine, VotingRules};

use crate::event_sink::StdoutEventSink;
use crate::output;

use super::read_json;

/// An agent whose recommendation and reasoning are supplied up front
/// rather than computed, since this CLI has no LLM or external analysis
/// step to call into for a scripted demo round.
struct ScriptedBehavior {
    recommendation: Value,
    reasoning: String,
}

#[async_trait]
impl AgentBehavior for ScriptedBehavior {
    async fn analyze(&self, _topic: &str, _context: &HashMap<String, Value>) -> hive_core::Result<Value> {
        Ok(Value::Null)
    }

    async fn formulate_recommendation(
        &self,
        _topic: &str,
        _context: &HashMap<String, Value>,
        _analysis: Value,
    ) -> hive_core::Result<(Value, String)> {
        Ok((self.recommendation.clone(), self.reasoning.clone()))
    }

    async fn execute_task(&self, _task: &Task) -> hive_core::Result<Value> {
        Ok(Value::Null)
    }
}

#[derive(Deserialize)]
struct AgentInput {
    name: String,
    kind: AgentKind,
    capabilities: Vec<Capability>,
    recommendation: Value,
    reasoning: String,
}

#[derive(Deserialize)]
struct DecisionInput {
    topic: String,
    #[serde(default)]
    context: HashMap<String, Value>,
    agents: Vec<AgentInput>,
}

pub async fn decide(file: PathBuf) -> Result<()> {
    let input: DecisionInput = read_json(&file)?;

    let sink = Arc::new(StdoutEventSink);
    let voting = Arc::new(VotingEngine::new(sink.clone(), VotingRules::default()));
    let queen = QueenCoordinator::new(voting, sink.clone(), Arc::new(NullOutcomeRecorder), &QueenConfig {
        auto_execution_threshold: 0.6,
        fan_out_timeout: Duration::from_secs(5),
    });

    output::section(&format!("queen decision: {}", input.topic));
    for agent in input.agents {
        let runtime = Arc::new(BaseAgentRuntime::new(
            AgentId::generate(),
            agent.kind,
            agent.capabilities,
            Arc::new(ScriptedBehavior { recommendation: agent.recommendation, reasoning: agent.reasoning }),
            sink.clone(),
        ));
        output::kv("registered agent", &format!("{} ({:?})", agent.name, runtime.kind()));
        queen.register_agent(runtime);
    }

    match queen.decide(&input.topic, input.context).await? {
        Decision::Execute { decision, recommendation, confidence } => {
            output::success("auto-executed");
            output::kv("decision", &decision.to_string());
            output::kv("recommendation", &recommendation.to_string());
            output::kv("confidence", &format!("{confidence:.3}"));
        }
        Decision::Pending(decision_id) => {
            output::warning("escalated to human approval");
            output::kv("decision", &decision_id.to_string());
            if let Some(pending) = queen.pending_decision(&decision_id) {
                output::kv("mean confidence", &format!("{:.3}", pending.mean_confidence));
                output::kv("legitimacy", &format!("{:?}", pending.result.legitimacy));
            }
        }
    }

    Ok(())
}
