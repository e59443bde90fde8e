//! Job file parsing with environment placeholder substitution.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::config::descriptor::JobDescriptor;
use crate::config::normalize::{normalize, project_job, yaml_to_tree};
use crate::error::{AssemblyError, AssemblyResult};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid placeholder regex")
});

/// Substitute `${VAR}` and `${VAR:-default}` with environment values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is unset and has
/// no default.
pub fn substitute_env_vars(input: &str) -> AssemblyResult<String> {
    let mut missing = Vec::new();

    let result = PLACEHOLDER_RE
        .replace_all(input, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.push(caps[1].to_string());
                    String::new()
                }
            },
        })
        .into_owned();

    if !missing.is_empty() {
        return Err(AssemblyError::Parse(format!(
            "Missing environment variable(s): {}",
            missing.join(", ")
        )));
    }

    Ok(result)
}

/// Parse a job definition from YAML (JSON is accepted as a YAML subset).
///
/// `root` is a dotted key path (e.g. `bulk.batch-job`) the job may be nested
/// under. When the document does not start with the first segment, the
/// whole document is taken as the job.
pub fn parse_job_str(content: &str, root: &str) -> AssemblyResult<JobDescriptor> {
    let substituted = substitute_env_vars(content)?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&substituted)?;
    let tree = normalize(yaml_to_tree(yaml)?);
    let job_tree = select_root(tree, root)?;
    project_job(&job_tree)
}

/// Parse a job definition file.
pub fn load_job_file(path: &Path, root: &str) -> AssemblyResult<JobDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AssemblyError::Parse(format!("Failed to read job file {}: {}", path.display(), e))
    })?;
    parse_job_str(&content, root)
}

fn select_root(tree: Value, root: &str) -> AssemblyResult<Value> {
    let segments: Vec<&str> = root.split('.').filter(|s| !s.is_empty()).collect();
    let Some(first) = segments.first() else {
        return Ok(tree);
    };
    if tree.get(*first).is_none() {
        return Ok(tree);
    }

    let mut current = tree;
    for (idx, segment) in segments.iter().enumerate() {
        current = match current {
            Value::Object(mut map) => map.remove(*segment).ok_or_else(|| {
                AssemblyError::config(segments[..=idx].join("."), "job root not found")
            })?,
            _ => {
                return Err(AssemblyError::config(
                    segments[..idx].join("."),
                    "expected a map",
                ))
            }
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETL_YAML: &str = r#"
bulk:
  batch-job:
    name: etl
    steps:
      - name: extract
        next: transform
        reader:
          type: FlatFileItemReader
          config:
            resource: file:/data/in.csv
            fieldNames: [id, amount]
        processor:
          type: PassThroughItemProcessor
        writer:
          name: auditWriter
          type: ItemWriter
      - name: transform
        tasklet:
          name: enrich
          type: Tasklet
"#;

    #[test]
    fn test_parse_nested_job() {
        let job = parse_job_str(ETL_YAML, "bulk.batch-job").unwrap();
        assert_eq!(job.name, "etl");
        assert_eq!(job.steps.len(), 2);
        assert_eq!(job.steps[0].next.as_deref(), Some("transform"));
        let reader = job.steps[0].reader.as_ref().unwrap();
        assert_eq!(reader.config["fieldNames"][1], "amount");
        assert_eq!(
            job.steps[1].tasklet.as_ref().unwrap().declared_name(),
            Some("enrich")
        );
    }

    #[test]
    fn test_parse_unnested_job() {
        let yaml = "name: solo\nsteps:\n  - name: only\n    tasklet: {type: Tasklet}\n";
        let job = parse_job_str(yaml, "bulk.batch-job").unwrap();
        assert_eq!(job.name, "solo");
    }

    #[test]
    fn test_integer_keyed_steps_are_ordered() {
        let yaml = r#"
name: indexed
steps:
  "1":
    name: second
    tasklet: {type: Tasklet}
  "0":
    name: first
    tasklet: {type: Tasklet}
"#;
        let job = parse_job_str(yaml, "").unwrap();
        let names: Vec<&str> = job.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BB_TEST_INPUT", "/tmp/in.csv");
        let result = substitute_env_vars("resource: ${BB_TEST_INPUT}").unwrap();
        assert_eq!(result, "resource: /tmp/in.csv");
        std::env::remove_var("BB_TEST_INPUT");
    }

    #[test]
    fn test_env_var_default() {
        let result = substitute_env_vars("chunk: ${BB_DEFINITELY_UNSET_CHUNK:-25}").unwrap();
        assert_eq!(result, "chunk: 25");
    }

    #[test]
    fn test_missing_env_vars_all_reported() {
        let err = substitute_env_vars("${BB_MISSING_X} and ${BB_MISSING_Y}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("BB_MISSING_X"));
        assert!(msg.contains("BB_MISSING_Y"));
    }

    #[test]
    fn test_partial_root_is_an_error() {
        let yaml = "bulk:\n  other: {}\n";
        let err = parse_job_str(yaml, "bulk.batch-job").unwrap_err();
        assert!(err.to_string().contains("bulk.batch-job"));
    }

    #[test]
    fn test_load_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(&path, ETL_YAML).unwrap();
        let job = load_job_file(&path, "bulk.batch-job").unwrap();
        assert_eq!(job.steps[1].name, "transform");

        let err = load_job_file(&dir.path().join("absent.yaml"), "").unwrap_err();
        assert!(err.to_string().contains("Failed to read job file"));
    }
}
