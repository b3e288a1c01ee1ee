use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use miette::Result;
use serde::Deserialize;

use hive_core::id::AgentId;
use hive_core::voting::{Vote, VoteOption, VotingEngine, VotingRules, VotingTopic};

use crate::event_sink::StdoutEventSink;
use crate::output;

use super::read_json;

#[derive(Deserialize)]
struct Ballot {
    voter: String,
    option: String,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// A voting round described in full: options, the rules (or the
/// engine's defaults), and every ballot to cast — since this CLI has
/// no standing swarm of agents to poll, votes are supplied up front
/// rather than collected interactively.
#[derive(Deserialize)]
struct VotingInput {
    options: Vec<VoteOption>,
    ballots: Vec<Ballot>,
    #[serde(default)]
    eligible: Option<Vec<String>>,
    #[serde(default)]
    rules: Option<VotingRules>,
}

pub fn run(file: PathBuf) -> Result<()> {
    let input: VotingInput = read_json(&file)?;

    let mut names: HashMap<String, AgentId> = HashMap::new();
    let mut id_for = |name: &str| *names.entry(name.to_string()).or_insert_with(AgentId::generate);

    let eligible_names = input
        .eligible
        .clone()
        .unwrap_or_else(|| input.ballots.iter().map(|b| b.voter.clone()).collect());
    let eligible: Vec<AgentId> = eligible_names.iter().map(|n| id_for(n)).collect();

    let sink = Arc::new(StdoutEventSink);
    let engine = VotingEngine::new(sink, VotingRules::default());

    let topic = VotingTopic::new(input.options);
    let voting_id = engine.open(topic, eligible, input.rules)?;

    output::section("voting round");
    output::kv("voting", &voting_id.to_string());

    let mut closed = None;
    for ballot in &input.ballots {
        let voter = id_for(&ballot.voter);
        let mut vote = Vote::new(voter, ballot.option.clone());
        if let Some(w) = ballot.weight {
            vote = vote.with_weight(w);
        }
        if let Some(c) = ballot.confidence {
            vote = vote.with_confidence(c);
        }
        if let Some(result) = engine.cast(voting_id, vote)? {
            closed = Some(result);
        }
    }
    let result = match closed {
        Some(result) => result,
        None => engine.close(voting_id)?,
    };

    output::kv("legitimacy", &format!("{:?}", result.legitimacy));
    output::kv("winner", result.winner.as_deref().unwrap_or("<none>"));
    output::kv("tie-break used", &result.tie_break_used.to_string());

    let rows = result
        .stats
        .iter()
        .map(|(option, stats)| vec![option.clone(), stats.count.to_string(), format!("{:.1}%", stats.percentage * 100.0)])
        .collect();
    output::table(&["option", "votes", "share"], rows);

    Ok(())
}
