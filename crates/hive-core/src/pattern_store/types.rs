//! Data model for the Pattern Store (spec §3, §4.4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::PatternId;

/// What kind of memory a [`Pattern`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    Decision,
    Performance,
    Failure,
    Success,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Decision => "decision",
            PatternKind::Performance => "performance",
            PatternKind::Failure => "failure",
            PatternKind::Success => "success",
        }
    }
}

/// One recorded result folded into a pattern's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub succeeded: bool,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    pub recorded_at: DateTime<Utc>,
}

/// A generalized memory of a past context → decision → outcome mapping,
/// addressed by a deterministic signature (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub signature: String,
    pub kind: PatternKind,
    pub confidence: f64,
    pub occurrences: u64,
    pub last_seen: DateTime<Utc>,
    pub outcomes: Vec<Outcome>,
    /// Normalized, lowercased, sorted context tokens — retained so later
    /// `Predict` calls can compare a new context against this pattern.
    pub context_tokens: Vec<String>,
    pub actions: Vec<String>,
    pub conditions: Vec<String>,
}

/// Result of a `Predict` call (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: Value,
    pub confidence: f64,
    pub alternatives: Vec<Value>,
    pub reasoning: Vec<String>,
}

/// Read-only aggregate projections (spec §4.4 `Insights`/`Progress`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insights {
    pub total_patterns: usize,
    pub by_kind: HashMap<String, usize>,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub total_observations: u64,
    pub success_rate: f64,
    pub pruned_count: u64,
}
