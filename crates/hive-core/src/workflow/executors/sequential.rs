//! `sequential` step executor (spec §4.5): runs sub-steps in order,
//! merging each result into the next sub-step's context.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::id::StepId;
use crate::Result;

use super::StepRunner;

pub async fn run(
    sub_steps: &[StepId],
    context: &HashMap<String, Value>,
    runner: &Arc<dyn StepRunner>,
) -> Result<Value> {
    let mut running_context = context.clone();
    let mut results: HashMap<String, Value> = HashMap::new();

    for &sub in sub_steps {
        let value = runner.run_step(sub, running_context.clone()).await?;
        running_context.insert(sub.to_string(), value.clone());
        results.insert(sub.to_string(), value);
    }

    Ok(Value::Object(results.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct CountingRunner;

    #[async_trait]
    impl StepRunner for CountingRunner {
        async fn run_step(&self, step: StepId, context: HashMap<String, Value>) -> Result<Value> {
            let prior = context.len();
            let _ = step;
            Ok(json!(prior))
        }
    }

    #[tokio::test]
    async fn each_sub_step_sees_prior_results() {
        let s1 = StepId::generate();
        let s2 = StepId::generate();
        let runner: Arc<dyn StepRunner> = Arc::new(CountingRunner);
        let result = run(&[s1, s2], &HashMap::new(), &runner).await.unwrap();
        let obj = result.as_object().unwrap();
        assert_eq!(obj[&s1.to_string()], json!(0));
        assert_eq!(obj[&s2.to_string()], json!(1));
    }
}
