//! Stateless Operation Validation
//!
//! Heuristic, advisory checks. Nothing here blocks an operation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter names that identify the subject of an operation
const IDENTIFYING_KEYS: &[&str] = &[
    "id",
    "key",
    "fingerprint",
    "group_key",
    "groupkey",
    "operation_id",
    "request_id",
    "idempotency_key",
];

/// Name fragments that suggest hidden process-local state
const STATEFUL_HINTS: &[&str] = &["session", "cache", "global", "local", "singleton", "counter"];

/// Nested objects larger than this look like captured in-memory state
const MAX_NESTED_ENTRIES: usize = 32;

/// Result of a stateless-operation check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatelessValidation {
    pub stateless: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

fn is_identifying(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    IDENTIFYING_KEYS.contains(&name.as_str())
        || name.ends_with("_id")
        || name.ends_with("_key")
}

fn nested_size(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 0,
    }
}

/// Check whether an operation's parameters look safe to run on any instance
pub fn validate_stateless_operation(name: &str, params: &Map<String, Value>) -> StatelessValidation {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if !params.keys().any(|k| is_identifying(k)) {
        issues.push(format!(
            "Operation '{}' has no identifying parameter; repeated calls cannot be deduplicated",
            name
        ));
        recommendations
            .push("Pass an explicit id or idempotency key derived from the request".to_string());
    }

    for (param, value) in params {
        let lowered = param.to_ascii_lowercase();
        if let Some(hint) = STATEFUL_HINTS.iter().find(|h| lowered.contains(*h)) {
            issues.push(format!(
                "Parameter '{}' looks like process-local state ({})",
                param, hint
            ));
            recommendations.push(format!(
                "Move '{}' into the shared cache and pass its key instead",
                param
            ));
        }

        let size = nested_size(value);
        if size > MAX_NESTED_ENTRIES {
            issues.push(format!(
                "Parameter '{}' carries {} nested entries",
                param, size
            ));
            recommendations.push(format!(
                "Pass a reference to '{}' rather than its in-memory contents",
                param
            ));
        }
    }

    let lowered_name = name.to_ascii_lowercase();
    if STATEFUL_HINTS.iter().any(|h| lowered_name.contains(h)) {
        issues.push(format!("Operation name '{}' suggests local state", name));
    }

    StatelessValidation {
        stateless: issues.is_empty(),
        issues,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_keyed_operation_is_stateless() {
        let result = validate_stateless_operation(
            "publish_alert",
            &params(json!({"fingerprint": "abc", "target_id": "rootly"})),
        );
        assert!(result.stateless);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_missing_key_is_flagged() {
        let result = validate_stateless_operation("publish_alert", &params(json!({"severity": "warning"})));
        assert!(!result.stateless);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.recommendations.len(), 1);
    }

    #[test]
    fn test_stateful_parameter_is_flagged() {
        let result = validate_stateless_operation(
            "process_batch",
            &params(json!({"request_id": "r1", "session_counter": 3})),
        );
        assert!(!result.stateless);
        assert!(result.issues[0].contains("session_counter"));
    }

    #[test]
    fn test_large_nested_value_is_flagged() {
        let big: Vec<u32> = (0..40).collect();
        let result = validate_stateless_operation(
            "process_batch",
            &params(json!({"request_id": "r1", "alerts": big})),
        );
        assert!(!result.stateless);
        assert!(result.issues[0].contains("40 nested entries"));
    }
}
