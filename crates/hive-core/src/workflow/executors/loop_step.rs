//! `loop` step executor (spec §4.5): iterates a finite collection,
//! binding item/index variables in a per-iteration context copy.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::id::StepId;
use crate::{CoreError, Result};

use super::StepRunner;

fn lookup_collection(path: &str, context: &HashMap<String, Value>) -> Result<Vec<Value>> {
    let mut parts = path.split('.');
    let root = parts
        .next()
        .ok_or_else(|| CoreError::ExpressionParseError("empty collection path".into()))?;
    let mut current = context
        .get(root)
        .cloned()
        .ok_or_else(|| CoreError::ExpressionParseError(format!("collection path '{path}' not found in context")))?;
    for part in parts {
        current = match current {
            Value::Object(map) => map
                .get(part)
                .cloned()
                .ok_or_else(|| CoreError::ExpressionParseError(format!("collection path '{path}' not found in context")))?,
            _ => return Err(CoreError::ExpressionParseError(format!("'{path}' does not resolve to an object"))),
        };
    }
    match current {
        Value::Array(items) => Ok(items),
        other => Err(CoreError::ExpressionParseError(format!(
            "collection path '{path}' does not resolve to an array (got {other})"
        ))),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    collection_path: &str,
    item_var: &str,
    index_var: &str,
    body: StepId,
    context: &HashMap<String, Value>,
    runner: &Arc<dyn StepRunner>,
) -> Result<Value> {
    let items = lookup_collection(collection_path, context)?;
    let mut results = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let mut iteration_context = context.clone();
        iteration_context.insert(item_var.to_string(), item);
        iteration_context.insert(index_var.to_string(), Value::from(index));
        let value = runner.run_step(body, iteration_context).await?;
        results.push(value);
    }

    Ok(Value::Array(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct DoubleRunner;

    #[async_trait]
    impl StepRunner for DoubleRunner {
        async fn run_step(&self, _step: StepId, context: HashMap<String, Value>) -> Result<Value> {
            let item = context.get("item").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(item * 2))
        }
    }

    #[tokio::test]
    async fn iterates_collection_binding_item_and_index() {
        let mut ctx = HashMap::new();
        ctx.insert("items".to_string(), json!([1, 2, 3]));
        let body = StepId::generate();
        let runner: Arc<dyn StepRunner> = Arc::new(DoubleRunner);
        let result = run("items", "item", "index", body, &ctx, &runner).await.unwrap();
        assert_eq!(result, json!([2, 4, 6]));
    }

    #[tokio::test]
    async fn missing_collection_path_errors() {
        let runner: Arc<dyn StepRunner> = Arc::new(DoubleRunner);
        let err = run("missing", "item", "index", StepId::generate(), &HashMap::new(), &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExpressionParseError(_)));
    }
}
