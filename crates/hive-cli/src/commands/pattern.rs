use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use miette::Result;
use serde::Deserialize;
use serde_json::Value;

use hive_core::config::PatternStoreConfig;
use hive_core::pattern_store::{CosineOutcomePredictor, PatternKind, PatternStore};

use crate::event_sink::StdoutEventSink;
use crate::output;

use super::read_json;

#[derive(Deserialize)]
struct ObservationInput {
    kind: PatternKind,
    #[serde(default)]
    context: HashMap<String, Value>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    conditions: Vec<String>,
    succeeded: bool,
    #[serde(default)]
    metrics: HashMap<String, f64>,
}

#[derive(Deserialize)]
struct PredictInput {
    kind: PatternKind,
    #[serde(default)]
    context: HashMap<String, Value>,
    candidates: Vec<Value>,
}

/// A full replay: every past observation to fold in, followed by an
/// optional prediction to run against the resulting store — since the
/// store has no standing process to accumulate observations across CLI
/// invocations, a single run replays whatever history matters for the
/// question being asked.
#[derive(Deserialize)]
struct PatternInput {
    #[serde(default)]
    observations: Vec<ObservationInput>,
    #[serde(default)]
    predict: Option<PredictInput>,
}

pub fn replay(file: PathBuf) -> Result<()> {
    let input: PatternInput = read_json(&file)?;
    let config = PatternStoreConfig::default();

    let sink = Arc::new(StdoutEventSink);
    let predictor = Arc::new(CosineOutcomePredictor::new(config.recency_half_life_days));
    let store = PatternStore::new(sink, predictor, config.pattern_ttl_days, config.similarity_threshold, config.recency_half_life_days);

    output::section("pattern store replay");
    for obs in &input.observations {
        let id = store.observe(obs.kind, &obs.context, &obs.actions, &obs.conditions, obs.succeeded, obs.metrics.clone());
        output::kv("observed", &id.to_string());
    }

    let insights = store.insights();
    output::kv("total patterns", &insights.total_patterns.to_string());
    output::kv("mean confidence", &format!("{:.3}", insights.mean_confidence));
    let rows = insights.by_kind.iter().map(|(k, v)| vec![k.clone(), v.to_string()]).collect();
    output::table(&["kind", "count"], rows);

    if let Some(predict) = input.predict {
        let prediction = store.predict(predict.kind, &predict.context, &predict.candidates);
        output::section("prediction");
        output::kv("prediction", &prediction.prediction.to_string());
        output::kv("confidence", &format!("{:.3}", prediction.confidence));
        for reason in &prediction.reasoning {
            println!("    - {reason}");
        }
    }

    Ok(())
}
