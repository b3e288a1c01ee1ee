//! `sub-workflow` step executor (spec §4.5): maps inputs by dotted
//! path, runs the referenced workflow, maps outputs back.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::id::WorkflowId;
use crate::Result;

use super::WorkflowRunner;

fn extract_path(path: &str, context: &HashMap<String, Value>) -> Value {
    let mut parts = path.split('.');
    let Some(root) = parts.next() else {
        return Value::Null;
    };
    let mut current = context.get(root).cloned().unwrap_or(Value::Null);
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

pub async fn run(
    workflow: WorkflowId,
    input_mapping: &HashMap<String, String>,
    output_mapping: &HashMap<String, String>,
    context: &HashMap<String, Value>,
    runner: &Arc<dyn WorkflowRunner>,
) -> Result<Value> {
    let mut sub_context = HashMap::new();
    for (context_path, sub_input_path) in input_mapping {
        sub_context.insert(sub_input_path.clone(), extract_path(context_path, context));
    }

    let sub_result = runner.run_workflow(workflow, sub_context).await?;

    let mut outputs = HashMap::new();
    for (sub_output_path, context_path) in output_mapping {
        outputs.insert(context_path.clone(), extract_path(sub_output_path, &sub_result));
    }

    Ok(Value::Object(outputs.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubRunner;

    #[async_trait]
    impl WorkflowRunner for StubRunner {
        async fn run_workflow(&self, _workflow: WorkflowId, context: HashMap<String, Value>) -> Result<HashMap<String, Value>> {
            let mut result = context;
            result.insert("status".to_string(), json!("done"));
            Ok(result)
        }
    }

    #[tokio::test]
    async fn maps_inputs_and_outputs_by_dotted_path() {
        let mut ctx = HashMap::new();
        ctx.insert("order".to_string(), json!({"id": 42}));

        let mut input_mapping = HashMap::new();
        input_mapping.insert("order.id".to_string(), "order_id".to_string());
        let mut output_mapping = HashMap::new();
        output_mapping.insert("status".to_string(), "order.status".to_string());

        let runner: Arc<dyn WorkflowRunner> = Arc::new(StubRunner);
        let result = run(WorkflowId::generate(), &input_mapping, &output_mapping, &ctx, &runner)
            .await
            .unwrap();
        assert_eq!(result, json!({"order.status": "done"}));
    }
}
