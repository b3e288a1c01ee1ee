//! Data model for the Queen Coordinator (spec §4.2).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::Report;
use crate::id::DecisionId;
use crate::voting::{Legitimacy, MajorityResult};

/// Outcome of `decide()`: either the decision executes immediately, or it
/// is held pending human review (spec §4.2 step 4).
#[derive(Debug, Clone)]
pub enum Decision {
    Execute {
        decision: DecisionId,
        recommendation: Value,
        confidence: f64,
    },
    Pending(DecisionId),
}

/// A decision awaiting an external `approve`/`reject` call.
#[derive(Debug, Clone)]
pub struct PendingDecision {
    pub id: DecisionId,
    pub topic: String,
    pub context: HashMap<String, Value>,
    pub reports: Vec<Report>,
    pub result: MajorityResult,
    pub mean_confidence: f64,
    pub deadline: DateTime<Utc>,
}

/// What the Pattern Store (or any other observer) is told about a
/// concluded decision, whether auto-executed, approved, or rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub topic: String,
    pub context: HashMap<String, Value>,
    pub recommendation: Value,
    pub confidence: f64,
    pub legitimacy: Legitimacy,
    pub accepted: bool,
}

/// Observer notified once a decision concludes. The Pattern Store
/// implements this so the Queen never depends on it directly — avoiding
/// the cyclic reference the source's Queen/Pattern Store coupling would
/// otherwise create (spec §9 Design Notes).
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, record: DecisionRecord);
}

/// An observer that discards every record; useful for a Queen run
/// without a Pattern Store attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutcomeRecorder;

impl OutcomeRecorder for NullOutcomeRecorder {
    fn record(&self, _record: DecisionRecord) {}
}
