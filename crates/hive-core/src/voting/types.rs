//! Data model for the Voting Engine (spec §3, §4.1).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{AgentId, VotingId};

/// One choice within a [`VotingTopic`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VoteOption {
    pub id: String,
    pub value: Value,
    pub description: String,
}

/// The subject of a vote: a discrete option set plus a context bag.
///
/// The option set is immutable once the topic is opened — `Open` takes
/// ownership of it and no operation on `ActiveVoting` can add or remove
/// options afterward.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VotingTopic {
    pub id: VotingId,
    pub options: Vec<VoteOption>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl VotingTopic {
    pub fn new(options: Vec<VoteOption>) -> Self {
        Self {
            id: VotingId::generate(),
            options,
            context: HashMap::new(),
            deadline: None,
        }
    }

    pub fn option(&self, id: &str) -> Option<&VoteOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// A single ballot. A voter casts at most one per topic (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Vote {
    pub voter: AgentId,
    pub option_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Vote {
    pub fn new(voter: AgentId, option_id: impl Into<String>) -> Self {
        Self {
            voter,
            option_id: option_id.into(),
            weight: None,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Lifecycle status of a voting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VotingStatus {
    Open,
    Closed,
    Timeout,
}

/// Policy used to resolve a tie between leading options (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreaker {
    /// Emit `tie-break-needed` and deterministically return the first tied option (insertion order).
    #[default]
    Queen,
    /// Uniformly random selection among tied options.
    Random,
    /// Same determinism as `queen` without the event — first tied option wins.
    StatusQuo,
    /// Emit `decision-deferred`; downstream interprets the deferral. Also returns the first tied option.
    Defer,
}

/// Rules governing one voting round. Topics may override the configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VotingRules {
    pub majority_threshold: f64,
    pub quorum_fraction: f64,
    pub tie_breaker: TieBreaker,
    #[serde(with = "crate::utils::serde_duration")]
    #[schemars(with = "u64")]
    pub voting_timeout: Duration,
    pub weighted_voting: bool,
}

impl Default for VotingRules {
    fn default() -> Self {
        Self {
            majority_threshold: 0.5,
            quorum_fraction: 0.5,
            tie_breaker: TieBreaker::Queen,
            voting_timeout: Duration::from_secs(30),
            weighted_voting: false,
        }
    }
}

impl From<&crate::config::VotingConfig> for VotingRules {
    fn from(cfg: &crate::config::VotingConfig) -> Self {
        Self {
            majority_threshold: cfg.majority_threshold,
            quorum_fraction: cfg.quorum_fraction,
            tie_breaker: cfg.tie_breaker,
            voting_timeout: cfg.voting_timeout,
            weighted_voting: cfg.weighted_voting,
        }
    }
}

/// A voting round in progress or concluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveVoting {
    pub topic: VotingTopic,
    pub eligible: HashSet<AgentId>,
    pub votes: HashMap<AgentId, Vote>,
    pub start_time: DateTime<Utc>,
    pub status: VotingStatus,
    pub rules: VotingRules,
}

impl ActiveVoting {
    pub fn is_deadline_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.topic.deadline {
            Some(deadline) => now >= deadline,
            None => now >= self.start_time + chrono::Duration::from_std(self.rules.voting_timeout).unwrap_or_default(),
        }
    }
}

/// Legitimacy label summarizing a concluded voting round (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Legitimacy {
    Valid,
    NoQuorum,
    Tied,
    Timeout,
}

/// Per-option tallies.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OptionStats {
    pub count: usize,
    pub percentage: f64,
    pub weighted_total: Option<f64>,
}

/// Turnout summary for a concluded round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participation {
    pub eligible: usize,
    pub actual: usize,
    pub rate: f64,
    pub quorum_met: bool,
    pub abstentions: usize,
}

/// The outcome of closing a voting round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MajorityResult {
    pub topic_id: VotingId,
    pub winner: Option<String>,
    pub stats: HashMap<String, OptionStats>,
    pub participation: Participation,
    pub legitimacy: Legitimacy,
    pub tie_break_used: bool,
    pub timestamp: DateTime<Utc>,
}
