//! Configuration tree normalization and projection onto descriptors.
//!
//! Some configuration sources flatten ordered lists into maps keyed by
//! `"0"`, `"1"`, ... (environment-style property sources do this). The
//! first pass repairs those maps into sequences; the second pass projects the
//! repaired tree onto the typed descriptors in [`crate::config::descriptor`].

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::descriptor::{
    ComponentDescriptor, JobDescriptor, ListenerDescriptor, RetryPolicy, SkipPolicy,
    StepDescriptor, TransactionPolicy, TransitionDescriptor, ValidatorDescriptor,
};
use crate::error::{AssemblyError, AssemblyResult};

/// Normalize a raw configuration tree.
///
/// A map whose keys are all decimal integers becomes a sequence ordered by
/// numeric key. Other maps keep their insertion order, lists are normalized
/// element by element and scalars pass through.
pub fn normalize(raw: Value) -> Value {
    match raw {
        Value::Object(map) => {
            if !map.is_empty() && map.keys().all(|k| is_index_key(k)) {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_by(|(a, _), (b, _)| compare_index_keys(a, b));
                Value::Array(entries.into_iter().map(|(_, v)| normalize(v)).collect())
            } else {
                Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        scalar => scalar,
    }
}

fn is_index_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

// Numeric comparison without parsing, so arbitrarily long keys cannot overflow.
fn compare_index_keys(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Convert a YAML document into the JSON tree the normalizer works on.
///
/// Integer and boolean map keys become strings.
pub fn yaml_to_tree(yaml: serde_yaml::Value) -> AssemblyResult<Value> {
    serde_json::to_value(yaml).map_err(|e| AssemblyError::Parse(e.to_string()))
}

/// Project a normalized node onto a typed shape, naming `path` on failure.
pub fn project<T: DeserializeOwned>(node: &Value, path: &str) -> AssemblyResult<T> {
    T::deserialize(node).map_err(|e| AssemblyError::config(display_path(path), e.to_string()))
}

/// Project a whole normalized job tree onto a [`JobDescriptor`].
///
/// Nested records are projected individually first so that an error names
/// the innermost offending record, e.g. `steps[1].reader`.
pub fn project_job(node: &Value) -> AssemblyResult<JobDescriptor> {
    let Value::Object(map) = node else {
        return Err(AssemblyError::config("<root>", "job definition must be a map"));
    };

    if let Some(listener) = map.get("listener") {
        project::<ListenerDescriptor>(listener, "listener")?;
    }
    if let Some(validator) = map.get("validator") {
        project::<ValidatorDescriptor>(validator, "validator")?;
    }
    if let Some(steps) = map.get("steps") {
        let Value::Array(steps) = steps else {
            return Err(AssemblyError::config("steps", "expected a list of steps"));
        };
        for (idx, step) in steps.iter().enumerate() {
            check_step(step, &format!("steps[{idx}]"))?;
        }
    }

    project(node, "")
}

fn check_step(step: &Value, path: &str) -> AssemblyResult<()> {
    let Value::Object(map) = step else {
        return Err(AssemblyError::config(path, "step must be a map"));
    };

    for key in ["reader", "processor", "writer", "tasklet"] {
        if let Some(component) = map.get(key) {
            project::<ComponentDescriptor>(component, &format!("{path}.{key}"))?;
        }
    }
    if let Some(retry) = map.get("retry") {
        project::<RetryPolicy>(retry, &format!("{path}.retry"))?;
    }
    if let Some(skip) = map.get("skip") {
        project::<SkipPolicy>(skip, &format!("{path}.skip"))?;
    }
    if let Some(transaction) = map.get("transaction") {
        project::<TransactionPolicy>(transaction, &format!("{path}.transaction"))?;
    }
    if let Some(Value::Array(listeners)) = map.get("listeners") {
        for (idx, listener) in listeners.iter().enumerate() {
            project::<ListenerDescriptor>(listener, &format!("{path}.listeners[{idx}]"))?;
        }
    }
    if let Some(Value::Array(transitions)) = map.get("transitions") {
        for (idx, transition) in transitions.iter().enumerate() {
            project::<TransitionDescriptor>(transition, &format!("{path}.transitions[{idx}]"))?;
        }
    }

    project::<StepDescriptor>(step, path).map(|_| ())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_keyed_map_becomes_sorted_list() {
        let raw = json!({"2": "c", "0": "a", "10": "k", "1": "b"});
        assert_eq!(normalize(raw), json!(["a", "b", "c", "k"]));
    }

    #[test]
    fn test_mixed_keys_keep_insertion_order() {
        let raw = json!({"zeta": 1, "0": "x", "alpha": {"1": "b", "0": "a"}});
        let normalized = normalize(raw);
        let keys: Vec<&String> = normalized.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "0", "alpha"]);
        assert_eq!(normalized["alpha"], json!(["a", "b"]));
    }

    #[test]
    fn test_empty_map_stays_map() {
        assert_eq!(normalize(json!({})), json!({}));
    }

    #[test]
    fn test_nested_lists_and_scalars() {
        let raw = json!([{"1": true, "0": null}, 3, "s"]);
        assert_eq!(normalize(raw), json!([[null, true], 3, "s"]));
    }

    #[test]
    fn test_leading_zero_keys_compare_numerically() {
        let raw = json!({"010": "ten", "9": "nine"});
        assert_eq!(normalize(raw), json!(["nine", "ten"]));
    }

    #[test]
    fn test_yaml_integer_keys_are_stringified() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("1: b\n0: a\n").unwrap();
        let tree = yaml_to_tree(yaml).unwrap();
        assert_eq!(normalize(tree), json!(["a", "b"]));
    }

    #[test]
    fn test_project_job_names_innermost_path() {
        let tree = json!({
            "name": "etl",
            "steps": [
                {"name": "extract", "tasklet": {"type": "Tasklet"}},
                {"name": "load", "reader": {"name": "r"}}
            ]
        });
        let err = project_job(&tree).unwrap_err();
        match err {
            AssemblyError::ConfigValidation { path, message } => {
                assert_eq!(path, "steps[1].reader");
                assert!(message.contains("type"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_project_job_rejects_uncoercible_value() {
        let tree = json!({
            "name": "etl",
            "steps": [{"name": "s", "chunk": "lots", "tasklet": {"type": "Tasklet"}}]
        });
        let err = project_job(&tree).unwrap_err();
        assert!(err.to_string().contains("steps[0]"));
    }

    #[test]
    fn test_project_job_ignores_unknown_fields() {
        let tree = json!({
            "name": "etl",
            "owner": "data-team",
            "steps": [{"name": "s", "tasklet": {"type": "Tasklet"}, "color": "blue"}]
        });
        let job = project_job(&tree).unwrap();
        assert_eq!(job.name, "etl");
        assert_eq!(job.steps.len(), 1);
    }
}
