pub mod config;
pub mod pattern;
pub mod queen;
pub mod schedule;
pub mod voting;
pub mod workflow;

use std::collections::HashMap;

use miette::{IntoDiagnostic, Result, miette};
use serde_json::Value;

/// Parses `key=value` CLI arguments into a variable map. The value is
/// parsed as JSON when possible (`42`, `true`, `"str"`, `{"a":1}`) and
/// falls back to a bare string otherwise, so `--var retries=3` and
/// `--var name=ops` both do what you'd expect without quoting.
pub fn parse_vars(pairs: &[String]) -> Result<HashMap<String, Value>> {
    let mut vars = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| miette!("expected KEY=VALUE, got '{pair}'"))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&content).into_diagnostic()
}
