//! The Pattern Store (spec §4.4): a signature-keyed memory of past
//! decisions that predicts outcomes for new contexts.
//!
//! Like the Voting Engine, state lives behind a `DashMap` keyed by
//! [`PatternId`] plus a secondary signature→id index, since signature
//! lookups are the hot path for both `Observe` and `Predict`. Spec §5
//! requires "Observe calls for the same signature are serialized" — the
//! `DashMap` entry API gives that per-key serialization without a
//! crate-wide lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;

use crate::events::{Event, EventSink};
use crate::id::PatternId;
use crate::queen::{DecisionRecord, OutcomeRecorder};

use super::signature::{compute_signature, cosine_similarity, normalize_context};
use super::types::{Insights, Outcome, Pattern, PatternKind, Prediction, Progress};

/// Confidence formula weighting coefficients (spec §9 open question:
/// "the specific weighting coefficients are left to the implementer
/// within the bounds of §8 invariants"). Chosen so the formula stays in
/// [0,1] for any input combination without the `min(1.0, ..)` clamp ever
/// needing to trigger except at the boundary.
const SUCCESS_WEIGHT: f64 = 0.5;
const OCCURRENCE_WEIGHT: f64 = 0.2;
const RECENCY_WEIGHT: f64 = 0.3;

/// Pluggable outcome predictor backing `Predict` (spec §4.4, Non-goals:
/// "concrete ML models... treated as a pluggable predictor").
pub trait OutcomePredictor: Send + Sync {
    fn predict(
        &self,
        patterns: &[Pattern],
        kind: PatternKind,
        context_tokens: &[String],
        candidates: &[Value],
        similarity_threshold: f64,
    ) -> Prediction;
}

/// Default predictor: aggregates matching patterns' outcomes weighted by
/// `confidence × recencyWeight`, scoring each candidate option.
pub struct CosineOutcomePredictor {
    recency_half_life_days: i64,
}

impl CosineOutcomePredictor {
    pub fn new(recency_half_life_days: i64) -> Self {
        Self { recency_half_life_days }
    }
}

impl OutcomePredictor for CosineOutcomePredictor {
    fn predict(
        &self,
        patterns: &[Pattern],
        kind: PatternKind,
        context_tokens: &[String],
        candidates: &[Value],
        similarity_threshold: f64,
    ) -> Prediction {
        let now = Utc::now();
        let matching: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.kind == kind)
            .filter(|p| cosine_similarity(&p.context_tokens, context_tokens) >= similarity_threshold)
            .collect();

        if matching.is_empty() || candidates.is_empty() {
            return Prediction {
                prediction: Value::Null,
                confidence: 0.0,
                alternatives: Vec::new(),
                reasoning: vec!["no matching pattern history".to_string()],
            };
        }

        let mut scores: Vec<f64> = vec![0.0; candidates.len()];
        let mut reasoning = Vec::new();
        for pattern in &matching {
            let recency = recency_weight(now, pattern.last_seen, self.recency_half_life_days);
            let weight = pattern.confidence * recency;
            // Without an explicit action→candidate mapping in the pattern
            // record, attribute the weight to every action the pattern
            // recorded that textually matches a candidate's rendering.
            for (i, candidate) in candidates.iter().enumerate() {
                let candidate_str = candidate.to_string().to_lowercase();
                if pattern
                    .actions
                    .iter()
                    .any(|a| candidate_str.contains(&a.to_lowercase()))
                {
                    scores[i] += weight;
                }
            }
            reasoning.push(format!(
                "pattern {} (confidence {:.2}, {} occurrences) contributed",
                pattern.signature, pattern.confidence, pattern.occurrences
            ));
        }

        let total: f64 = scores.iter().sum();
        let (best_idx, best_score) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, s)| (i, *s))
            .unwrap_or((0, 0.0));

        let confidence = if total > 0.0 { (best_score / total).min(1.0) } else { 0.0 };
        let alternatives = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best_idx)
            .map(|(_, c)| c.clone())
            .collect();

        Prediction {
            prediction: candidates.get(best_idx).cloned().unwrap_or(Value::Null),
            confidence,
            alternatives,
            reasoning,
        }
    }
}

fn recency_weight(now: chrono::DateTime<Utc>, last_seen: chrono::DateTime<Utc>, half_life_days: i64) -> f64 {
    let delta_days = (now - last_seen).num_seconds() as f64 / 86_400.0;
    let tau = half_life_days.max(1) as f64;
    (-delta_days.max(0.0) / tau).exp()
}

pub struct PatternStore {
    patterns: DashMap<PatternId, Pattern>,
    index: DashMap<String, PatternId>,
    sink: Arc<dyn EventSink>,
    predictor: Arc<dyn OutcomePredictor>,
    ttl_days: i64,
    similarity_threshold: f64,
    recency_half_life_days: i64,
    pruned_count: AtomicU64,
}

impl PatternStore {
    pub fn new(
        sink: Arc<dyn EventSink>,
        predictor: Arc<dyn OutcomePredictor>,
        ttl_days: i64,
        similarity_threshold: f64,
        recency_half_life_days: i64,
    ) -> Self {
        Self {
            patterns: DashMap::new(),
            index: DashMap::new(),
            sink,
            predictor,
            ttl_days,
            similarity_threshold,
            recency_half_life_days,
            pruned_count: AtomicU64::new(0),
        }
    }

    /// Locate or create the pattern for this signature, increment its
    /// occurrence count, append the outcome, and recompute confidence.
    pub fn observe(
        &self,
        kind: PatternKind,
        context: &HashMap<String, Value>,
        actions: &[String],
        conditions: &[String],
        succeeded: bool,
        metrics: HashMap<String, f64>,
    ) -> PatternId {
        let context_tokens = normalize_context(context);
        let signature = compute_signature(&context_tokens, actions, conditions);

        let id = *self
            .index
            .entry(signature.clone())
            .or_insert_with(PatternId::generate);

        let now = Utc::now();
        self.patterns
            .entry(id)
            .and_modify(|p| {
                p.occurrences += 1;
                p.outcomes.push(Outcome {
                    succeeded,
                    metrics: metrics.clone(),
                    recorded_at: now,
                });
                p.last_seen = now;
                p.confidence = Self::recompute_confidence(p, self.recency_half_life_days, now);
            })
            .or_insert_with(|| {
                let mut pattern = Pattern {
                    id,
                    signature,
                    kind,
                    confidence: 0.0,
                    occurrences: 1,
                    last_seen: now,
                    outcomes: vec![Outcome {
                        succeeded,
                        metrics,
                        recorded_at: now,
                    }],
                    context_tokens,
                    actions: {
                        let mut a = actions.to_vec();
                        a.sort();
                        a
                    },
                    conditions: {
                        let mut c = conditions.to_vec();
                        c.sort();
                        c
                    },
                };
                pattern.confidence = Self::recompute_confidence(&pattern, self.recency_half_life_days, now);
                pattern
            });

        self.sink.publish(Event::PatternObserved { pattern: id });
        id
    }

    /// Confidence immediately after an observation — `last_seen` is `now`,
    /// so the recency term is always 1.0 here; it decays on later reads
    /// via [`Self::confidence_as_of`].
    fn recompute_confidence(pattern: &Pattern, _half_life_days: i64, _now: chrono::DateTime<Utc>) -> f64 {
        let successes = pattern.outcomes.iter().filter(|o| o.succeeded).count() as f64;
        let success_ratio = successes / pattern.occurrences.max(1) as f64;
        let occurrence_pressure = (pattern.occurrences as f64 / 10.0).min(1.0);

        (SUCCESS_WEIGHT * success_ratio + OCCURRENCE_WEIGHT * occurrence_pressure + RECENCY_WEIGHT * 1.0)
            .min(1.0)
    }

    /// Re-derives confidence purely from elapsed time since `last_seen`,
    /// used by reads (`Predict`/`Insights`) rather than at observe-time.
    fn confidence_as_of(&self, pattern: &Pattern, now: chrono::DateTime<Utc>) -> f64 {
        let successes = pattern.outcomes.iter().filter(|o| o.succeeded).count() as f64;
        let success_ratio = successes / pattern.occurrences.max(1) as f64;
        let occurrence_pressure = (pattern.occurrences as f64 / 10.0).min(1.0);
        let recency = recency_weight(now, pattern.last_seen, self.recency_half_life_days);
        (SUCCESS_WEIGHT * success_ratio + OCCURRENCE_WEIGHT * occurrence_pressure + RECENCY_WEIGHT * recency)
            .min(1.0)
    }

    pub fn predict(
        &self,
        kind: PatternKind,
        context: &HashMap<String, Value>,
        candidates: &[Value],
    ) -> Prediction {
        let now = Utc::now();
        let context_tokens = normalize_context(context);
        let patterns: Vec<Pattern> = self
            .patterns
            .iter()
            .map(|e| {
                let mut p = e.value().clone();
                p.confidence = self.confidence_as_of(&p, now);
                p
            })
            .collect();

        let prediction = self.predictor.predict(
            &patterns,
            kind,
            &context_tokens,
            candidates,
            self.similarity_threshold,
        );
        self.sink.publish(Event::PatternPredicted {
            pattern: PatternId::generate(),
            confidence: prediction.confidence,
        });
        prediction
    }

    pub fn recommendations(&self, kind: PatternKind, context: &HashMap<String, Value>) -> Vec<Pattern> {
        let context_tokens = normalize_context(context);
        let now = Utc::now();
        let mut matches: Vec<Pattern> = self
            .patterns
            .iter()
            .map(|e| e.value().clone())
            .filter(|p| p.kind == kind)
            .filter(|p| cosine_similarity(&p.context_tokens, &context_tokens) >= self.similarity_threshold)
            .map(|mut p| {
                p.confidence = self.confidence_as_of(&p, now);
                p
            })
            .collect();
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        matches
    }

    pub fn insights(&self) -> Insights {
        let now = Utc::now();
        let mut by_kind: HashMap<String, usize> = HashMap::new();
        let mut total_confidence = 0.0;
        let mut count = 0usize;
        for entry in self.patterns.iter() {
            let pattern = entry.value();
            *by_kind.entry(pattern.kind.as_str().to_string()).or_insert(0) += 1;
            total_confidence += self.confidence_as_of(pattern, now);
            count += 1;
        }
        Insights {
            total_patterns: count,
            by_kind,
            mean_confidence: if count > 0 { total_confidence / count as f64 } else { 0.0 },
        }
    }

    pub fn progress(&self) -> Progress {
        let mut total_observations = 0u64;
        let mut successes = 0u64;
        for entry in self.patterns.iter() {
            total_observations += entry.value().occurrences;
            successes += entry.value().outcomes.iter().filter(|o| o.succeeded).count() as u64;
        }
        Progress {
            total_observations,
            success_rate: if total_observations > 0 {
                successes as f64 / total_observations as f64
            } else {
                0.0
            },
            pruned_count: self.pruned_count.load(Ordering::Relaxed),
        }
    }

    /// Removes patterns with confidence < 0.1 and `last_seen` older than
    /// the configured TTL (spec §4.4 background pruner). Returns how many
    /// were removed.
    pub fn prune(&self) -> usize {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::days(self.ttl_days);
        let stale: Vec<PatternId> = self
            .patterns
            .iter()
            .filter(|e| {
                let p = e.value();
                self.confidence_as_of(p, now) < 0.1 && p.last_seen < cutoff
            })
            .map(|e| *e.key())
            .collect();

        for id in &stale {
            if let Some((_, pattern)) = self.patterns.remove(id) {
                self.index.remove(&pattern.signature);
                self.sink.publish(Event::PatternPruned { pattern: *id });
            }
        }
        self.pruned_count.fetch_add(stale.len() as u64, Ordering::Relaxed);
        stale.len()
    }
}

/// Lets the Queen record decision outcomes without depending on the
/// Pattern Store's concrete type (spec §9: avoid cyclic references).
impl OutcomeRecorder for PatternStore {
    fn record(&self, record: DecisionRecord) {
        let actions = vec![record.recommendation.to_string()];
        self.observe(
            PatternKind::Decision,
            &record.context,
            &actions,
            &[],
            record.accepted,
            HashMap::from([("confidence".to_string(), record.confidence)]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use serde_json::json;

    fn store() -> PatternStore {
        PatternStore::new(
            Arc::new(NullEventSink),
            Arc::new(CosineOutcomePredictor::new(30)),
            90,
            0.7,
            30,
        )
    }

    #[test]
    fn observe_twice_increments_occurrences_and_keeps_confidence_bounded() {
        let store = store();
        let mut ctx = HashMap::new();
        ctx.insert("region".to_string(), json!("us-east"));

        let id1 = store.observe(
            PatternKind::Decision,
            &ctx,
            &["send-invoice".to_string()],
            &[],
            true,
            HashMap::new(),
        );
        let id2 = store.observe(
            PatternKind::Decision,
            &ctx,
            &["send-invoice".to_string()],
            &[],
            true,
            HashMap::new(),
        );
        assert_eq!(id1, id2);

        let pattern = store.patterns.get(&id1).unwrap();
        assert_eq!(pattern.occurrences, 2);
        assert!(pattern.confidence >= 0.0 && pattern.confidence <= 1.0);
    }

    #[test]
    fn predict_with_no_history_returns_zero_confidence() {
        let store = store();
        let ctx = HashMap::new();
        let prediction = store.predict(PatternKind::Decision, &ctx, &[json!("a"), json!("b")]);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.prediction, Value::Null);
    }

    #[test]
    fn prune_removes_low_confidence_stale_patterns() {
        let store = store();
        let mut ctx = HashMap::new();
        ctx.insert("x".to_string(), json!("y"));
        let id = store.observe(PatternKind::Failure, &ctx, &["noop".to_string()], &[], false, HashMap::new());

        // Force staleness directly since we can't manipulate the clock.
        if let Some(mut pattern) = store.patterns.get_mut(&id) {
            pattern.last_seen = Utc::now() - chrono::Duration::days(200);
            pattern.confidence = 0.0;
        }

        let removed = store.prune();
        assert_eq!(removed, 1);
        assert!(store.patterns.get(&id).is_none());
    }
}
