//! `parallel` step executor (spec §4.5): runs sub-steps concurrently in
//! fixed-size chunks bounded by `maxConcurrency`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::id::StepId;
use crate::{CoreError, Result};

use super::StepRunner;

pub async fn run(
    sub_steps: &[StepId],
    max_concurrency: Option<usize>,
    context: &HashMap<String, Value>,
    runner: &Arc<dyn StepRunner>,
) -> Result<Value> {
    let chunk_size = max_concurrency.unwrap_or(sub_steps.len()).max(1);
    let mut results: HashMap<String, Value> = HashMap::new();
    let mut failures: Vec<(StepId, String)> = Vec::new();

    for chunk in sub_steps.chunks(chunk_size) {
        let handles: Vec<_> = chunk
            .iter()
            .map(|&sub| {
                let runner = runner.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    let outcome = runner.run_step(sub, context).await;
                    (sub, outcome)
                })
            })
            .collect();

        for handle in handles {
            match handle.await {
                Ok((sub, Ok(value))) => {
                    results.insert(sub.to_string(), value);
                }
                Ok((sub, Err(e))) => failures.push((sub, e.to_string())),
                Err(join_err) => failures.push((StepId::generate(), join_err.to_string())),
            }
        }
    }

    if !failures.is_empty() {
        return Err(CoreError::AggregateError(failures.len(), sub_steps.len(), failures));
    }

    Ok(Value::Object(results.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoRunner;

    #[async_trait]
    impl StepRunner for EchoRunner {
        async fn run_step(&self, step: StepId, _context: HashMap<String, Value>) -> Result<Value> {
            Ok(Value::String(step.to_string()))
        }
    }

    #[tokio::test]
    async fn runs_all_sub_steps_and_collects_results() {
        let sub1 = StepId::generate();
        let sub2 = StepId::generate();
        let runner: Arc<dyn StepRunner> = Arc::new(EchoRunner);
        let result = run(&[sub1, sub2], None, &HashMap::new(), &runner).await.unwrap();
        let obj = result.as_object().unwrap();
        assert_eq!(obj.len(), 2);
    }

    struct FailingRunner;

    #[async_trait]
    impl StepRunner for FailingRunner {
        async fn run_step(&self, step: StepId, _context: HashMap<String, Value>) -> Result<Value> {
            Err(CoreError::step_failed(step, "boom"))
        }
    }

    #[tokio::test]
    async fn aggregates_child_failures() {
        let sub1 = StepId::generate();
        let runner: Arc<dyn StepRunner> = Arc::new(FailingRunner);
        let err = run(&[sub1], None, &HashMap::new(), &runner).await.unwrap_err();
        assert!(matches!(err, CoreError::AggregateError(1, 1, _)));
    }
}
