//! `action` step executor (spec §4.5): runs a caller-provided function
//! or a built-in (`log`, `set-variable`, `http-request`).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::{CoreError, Result};

/// A caller-registered action function: receives the step's `args` and
/// the execution's current context, returns the value recorded as the
/// step's result.
pub type ActionFn = Arc<dyn Fn(&Value, &HashMap<String, Value>) -> Result<Value> + Send + Sync>;

/// Holds built-ins plus whatever functions the host registers. Built
/// into every `Interpreter` so action steps resolve `function` names
/// against it.
pub struct ActionRegistry {
    functions: DashMap<String, ActionFn>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            functions: DashMap::new(),
        }
    }

    pub fn register(&self, name: impl Into<String>, f: ActionFn) {
        self.functions.insert(name.into(), f);
    }

    /// Runs `function` against `args`/`context`, dispatching to a
    /// registered override first, then the three spec built-ins.
    pub fn invoke(&self, function: &str, args: &Value, context: &HashMap<String, Value>) -> Result<Value> {
        if let Some(f) = self.functions.get(function) {
            return f(args, context);
        }

        match function {
            "log" => {
                tracing::info!(target: "hive::workflow::action", message = %args, "log action");
                Ok(Value::Null)
            }
            "set-variable" => {
                // args: {"name": "...", "value": <any>} — the interpreter
                // merges the returned value into context under that name.
                let name = args
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::ExpressionParseError("set-variable requires a 'name' field".into()))?;
                let value = args.get("value").cloned().unwrap_or(Value::Null);
                Ok(serde_json::json!({ name: value }))
            }
            "http-request" => Err(CoreError::Unsupported(
                "http-request (register a handler via ActionRegistry::register to use it)".into(),
            )),
            other => Err(CoreError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_builtin_returns_null() {
        let registry = ActionRegistry::new();
        let result = registry.invoke("log", &json!("hello"), &HashMap::new()).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn set_variable_builtin_echoes_name_value() {
        let registry = ActionRegistry::new();
        let result = registry
            .invoke("set-variable", &json!({"name": "x", "value": 5}), &HashMap::new())
            .unwrap();
        assert_eq!(result, json!({"x": 5}));
    }

    #[test]
    fn http_request_is_unsupported_without_registration() {
        let registry = ActionRegistry::new();
        let err = registry.invoke("http-request", &Value::Null, &HashMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported(_)));
    }

    #[test]
    fn registered_function_overrides_builtin() {
        let registry = ActionRegistry::new();
        registry.register("log", Arc::new(|args, _ctx| Ok(args.clone())));
        let result = registry.invoke("log", &json!("echoed"), &HashMap::new()).unwrap();
        assert_eq!(result, json!("echoed"));
    }
}
