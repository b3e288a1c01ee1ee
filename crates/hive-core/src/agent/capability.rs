//! Fuzzy capability/keyword matching shared by the Agent Runtime's own
//! relevance scoring (§4.3) and the Queen's agent selection (§4.2).
//!
//! Ported from a capability selector that matched a hardcoded per-domain
//! keyword table; generalized here so each [`Capability`](super::types::Capability)
//! declares its own keyword synonyms instead.

use std::collections::HashMap;

use serde_json::Value;

use super::types::Capability;

/// Checks if `needle` appears in `haystack` with some flexibility:
/// substring, word-boundary prefix, and common suffix variations
/// (plural, gerund, past tense, comparative, noun form).
pub fn fuzzy_match(haystack: &str, needle: &str) -> bool {
    if haystack.contains(needle) {
        return true;
    }

    let words: Vec<&str> = haystack.split_whitespace().collect();

    if words.iter().any(|word| word.starts_with(needle)) {
        return true;
    }

    if needle.len() >= 4 {
        let needle_root = &needle[..needle.len() - 1];
        if words.iter().any(|word| word.starts_with(needle_root)) {
            return true;
        }
    }

    let variations = [
        format!("{}s", needle),
        format!("{}ing", needle),
        format!("{}ed", needle),
        format!("{}er", needle),
        format!("{}ment", needle),
    ];

    variations.iter().any(|var| haystack.contains(var))
}

/// Flattens a topic string and a context bag into one lowercase token
/// haystack for keyword matching.
pub fn tokenize_topic_and_context(topic: &str, context: &HashMap<String, Value>) -> String {
    let mut haystack = topic.to_lowercase();
    for (key, value) in context {
        haystack.push(' ');
        haystack.push_str(&key.to_lowercase());
        if let Value::String(s) = value {
            haystack.push(' ');
            haystack.push_str(&s.to_lowercase());
        }
    }
    haystack
}

/// Whether any of a capability's keywords fuzzy-match the haystack.
pub fn capability_matches(capability: &Capability, haystack: &str) -> bool {
    capability
        .keywords
        .iter()
        .any(|kw| fuzzy_match(haystack, &kw.to_lowercase()))
}

/// Average proficiency over capabilities whose keywords appear in the
/// topic or context (spec §4.3 "Capability relevance scoring"). Zero if
/// no capability matches.
pub fn relevance_score(
    capabilities: &[Capability],
    topic: &str,
    context: &HashMap<String, Value>,
) -> f64 {
    let haystack = tokenize_topic_and_context(topic, context);
    let matching: Vec<f64> = capabilities
        .iter()
        .filter(|cap| capability_matches(cap, &haystack))
        .map(|cap| cap.proficiency)
        .collect();

    if matching.is_empty() {
        0.0
    } else {
        matching.iter().sum::<f64>() / matching.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_plural_and_gerund_variations() {
        assert!(fuzzy_match("needs scheduling help", "schedule"));
        assert!(fuzzy_match("two reports", "report"));
    }

    #[test]
    fn relevance_is_zero_when_nothing_matches() {
        let caps = vec![Capability::new("billing", 0.9)];
        let ctx = HashMap::new();
        assert_eq!(relevance_score(&caps, "weather forecast", &ctx), 0.0);
    }

    #[test]
    fn relevance_averages_matching_capabilities() {
        let caps = vec![
            Capability::new("billing", 0.8),
            Capability::new("billing_disputes", 0.4).with_keywords(["dispute".to_string()]),
        ];
        let ctx = HashMap::new();
        let score = relevance_score(&caps, "open billing dispute", &ctx);
        assert!((score - 0.6).abs() < 1e-9);
    }
}
