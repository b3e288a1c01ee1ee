//! Deterministic pattern signatures (spec §4.4: "context features
//! lowercased, tokenized, sorted; actions list sorted; conditions list
//! sorted. Signature hash is deterministic.").

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use serde_json::Value;

/// Flattens a context bag into a sorted, de-duplicated list of lowercase
/// tokens (keys plus any string-valued tokens, whitespace-split).
pub fn normalize_context(context: &HashMap<String, Value>) -> Vec<String> {
    let mut tokens: HashSet<String> = HashSet::new();
    for (key, value) in context {
        tokens.insert(key.to_lowercase());
        collect_value_tokens(value, &mut tokens);
    }
    let mut sorted: Vec<String> = tokens.into_iter().collect();
    sorted.sort();
    sorted
}

fn collect_value_tokens(value: &Value, tokens: &mut HashSet<String>) {
    match value {
        Value::String(s) => {
            for word in s.split_whitespace() {
                tokens.insert(word.to_lowercase());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_value_tokens(item, tokens);
            }
        }
        Value::Bool(b) => {
            tokens.insert(b.to_string());
        }
        Value::Number(n) => {
            tokens.insert(n.to_string());
        }
        _ => {}
    }
}

/// Sha256 hex digest over the normalized, sorted feature/action/condition
/// token lists — the signature that uniquely identifies a pattern.
pub fn compute_signature(
    context_tokens: &[String],
    actions: &[String],
    conditions: &[String],
) -> String {
    let mut sorted_actions = actions.to_vec();
    sorted_actions.sort();
    let mut sorted_conditions = conditions.to_vec();
    sorted_conditions.sort();

    let mut hasher = Sha256::new();
    hasher.update(context_tokens.join("\u{1}").as_bytes());
    hasher.update([0u8]);
    hasher.update(sorted_actions.join("\u{1}").as_bytes());
    hasher.update([0u8]);
    hasher.update(sorted_conditions.join("\u{1}").as_bytes());

    hex::encode(hasher.finalize())
}

/// Cosine similarity between two token sets, treated as 0/1 term vectors.
pub fn cosine_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count() as f64;
    let norm_a = (set_a.len() as f64).sqrt();
    let norm_b = (set_b.len() as f64).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        intersection / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_context_is_sorted_lowercase_and_deduped() {
        let mut ctx = HashMap::new();
        ctx.insert("Region".to_string(), json!("US East"));
        ctx.insert("tier".to_string(), json!("Gold"));
        let tokens = normalize_context(&ctx);
        let mut expected = vec!["east", "gold", "region", "tier", "us"];
        expected.sort();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn signature_is_deterministic_and_order_independent() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let s1 = compute_signature(&tokens, &["y".to_string(), "x".to_string()], &["c1".to_string()]);
        let s2 = compute_signature(&tokens, &["x".to_string(), "y".to_string()], &["c1".to_string()]);
        assert_eq!(s1, s2);
    }

    #[test]
    fn cosine_similarity_of_identical_sets_is_one() {
        let a = vec!["x".to_string(), "y".to_string()];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }
}
