//! Declarative job descriptor types.
//!
//! These mirror the job file schema (camelCase keys). Defaults follow the
//! documented schema: chunk size 10, retry limit 3, skip limit 10.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Job
// ============================================================================

/// A declarative job: a name, job-scoped concerns and ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub name: String,

    /// Job-lifecycle listener, bound by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<ListenerDescriptor>,

    /// Parameter validator, bound by name when `validate` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorDescriptor>,

    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

impl JobDescriptor {
    pub fn step(&self, name: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorDescriptor {
    #[serde(default)]
    pub name: String,

    /// Parameters are accepted unchecked unless this is set.
    #[serde(default)]
    pub validate: bool,
}

// ============================================================================
// Step
// ============================================================================

/// Execution mode of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepMode {
    #[serde(alias = "chunk")]
    Chunk,
    #[serde(alias = "tasklet")]
    Tasklet,
}

impl std::fmt::Display for StepMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepMode::Chunk => write!(f, "CHUNK"),
            StepMode::Tasklet => write!(f, "TASKLET"),
        }
    }
}

/// One step of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub name: String,

    /// Explicit mode; inferred from the declared components when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<StepMode>,

    /// Items per chunk (commit interval).
    #[serde(default = "default_chunk")]
    pub chunk: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader: Option<ComponentDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<ComponentDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<ComponentDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasklet: Option<ComponentDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<ListenerDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionPolicy>,

    /// Linear successor; exclusive with `transitions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionDescriptor>,
}

fn default_chunk() -> usize {
    10
}

impl StepDescriptor {
    /// A chunk step with the default chunk size.
    pub fn chunk(
        name: impl Into<String>,
        reader: ComponentDescriptor,
        processor: ComponentDescriptor,
        writer: ComponentDescriptor,
    ) -> Self {
        Self {
            reader: Some(reader),
            processor: Some(processor),
            writer: Some(writer),
            ..Self::empty(name)
        }
    }

    /// A tasklet step.
    pub fn tasklet(name: impl Into<String>, tasklet: ComponentDescriptor) -> Self {
        Self {
            tasklet: Some(tasklet),
            ..Self::empty(name)
        }
    }

    fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
            chunk: default_chunk(),
            reader: None,
            processor: None,
            writer: None,
            tasklet: None,
            listeners: Vec::new(),
            retry: None,
            skip: None,
            transaction: None,
            next: None,
            transitions: Vec::new(),
        }
    }

    /// Declared mode, or TASKLET when only a tasklet is declared, else CHUNK.
    pub fn effective_mode(&self) -> StepMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        let has_item_components =
            self.reader.is_some() || self.processor.is_some() || self.writer.is_some();
        if self.tasklet.is_some() && !has_item_components {
            StepMode::Tasklet
        } else {
            StepMode::Chunk
        }
    }

    /// `next`, when set to a non-blank name.
    pub fn next_step(&self) -> Option<&str> {
        self.next.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn has_fault_tolerance(&self) -> bool {
        self.retry.is_some() || self.skip.is_some() || self.transaction.is_some()
    }
}

// ============================================================================
// Components and listeners
// ============================================================================

/// Reference to a reader, processor, writer or tasklet.
///
/// A blank `name` asks for a fresh build from `type` and `config`; a
/// non-blank name must match an already registered instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub component_type: String,

    /// Type-specific configuration, normalized.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl ComponentDescriptor {
    /// A descriptor built fresh from its type.
    pub fn of_type(component_type: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            component_type: component_type.into(),
            config: Value::Null,
        }
    }

    /// A descriptor referencing a named instance.
    pub fn named(name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::of_type(component_type)
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Declared name, or `None` when blank.
    pub fn declared_name(&self) -> Option<&str> {
        let name = self.name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Listener reference. `name` and `type` are both present or both absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub listener_type: Option<String>,
}

impl ListenerDescriptor {
    pub fn new(name: impl Into<String>, listener_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            listener_type: Some(listener_type.into()),
        }
    }

    pub fn declared_name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn declared_type(&self) -> Option<&str> {
        non_blank(self.listener_type.as_deref())
    }
}

// ============================================================================
// Fault tolerance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_retry_limit")]
    pub limit: u32,

    /// Error classes eligible for retry.
    #[serde(default)]
    pub exceptions: Vec<String>,
}

fn default_retry_limit() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: default_retry_limit(),
            exceptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipPolicy {
    #[serde(default = "default_skip_limit")]
    pub limit: u32,

    #[serde(default)]
    pub exceptions_to_skip: Vec<String>,

    /// Never skipped, even when also listed in `exceptions_to_skip`.
    #[serde(default)]
    pub exceptions_no_skip: Vec<String>,
}

fn default_skip_limit() -> u32 {
    10
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            limit: default_skip_limit(),
            exceptions_to_skip: Vec::new(),
            exceptions_no_skip: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPolicy {
    /// Reader is a transactional queue: items are re-read, not replayed.
    #[serde(default)]
    pub is_reader_in_transaction: bool,

    #[serde(default)]
    pub no_rollback_exceptions: Vec<String>,
}

// ============================================================================
// Transitions
// ============================================================================

/// Conditional edge `(from ?? owner) --on(on_condition)--> to_step`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default)]
    pub on_condition: String,

    #[serde(default)]
    pub to_step: String,

    /// The flow ends once `to_step` has run.
    #[serde(default)]
    pub is_ended: bool,
}

impl TransitionDescriptor {
    pub fn new(on_condition: impl Into<String>, to_step: impl Into<String>) -> Self {
        Self {
            from: None,
            on_condition: on_condition.into(),
            to_step: to_step.into(),
            is_ended: false,
        }
    }

    /// Source step name, defaulting to `owner`.
    pub fn source<'a>(&'a self, owner: &'a str) -> &'a str {
        non_blank(self.from.as_deref()).unwrap_or(owner)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults() {
        let yaml = r#"
name: load
reader:
  type: FlatFileItemReader
processor:
  type: PassThroughItemProcessor
writer:
  type: FlatFileItemWriter
retry: {}
skip: {}
"#;
        let step: StepDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.chunk, 10);
        assert_eq!(step.effective_mode(), StepMode::Chunk);
        assert_eq!(step.retry.unwrap().limit, 3);
        assert_eq!(step.skip.unwrap().limit, 10);
        assert!(step.reader.unwrap().declared_name().is_none());
    }

    #[test]
    fn test_tasklet_mode_is_inferred() {
        let step = StepDescriptor::tasklet("cleanup", ComponentDescriptor::named("purge", "Tasklet"));
        assert_eq!(step.effective_mode(), StepMode::Tasklet);
    }

    #[test]
    fn test_explicit_mode_wins() {
        let yaml = "name: s\nmode: tasklet\nreader: {type: ItemReader}\n";
        let step: StepDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.effective_mode(), StepMode::Tasklet);
    }

    #[test]
    fn test_transition_source_defaults_to_owner() {
        let mut transition = TransitionDescriptor::new("FAILED", "extract");
        assert_eq!(transition.source("transform"), "transform");
        transition.from = Some("  ".to_string());
        assert_eq!(transition.source("transform"), "transform");
        transition.from = Some("load".to_string());
        assert_eq!(transition.source("transform"), "load");
    }

    #[test]
    fn test_transition_yaml_keys() {
        let yaml = "onCondition: FAILED\ntoStep: extract\nisEnded: true\n";
        let transition: TransitionDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transition.on_condition, "FAILED");
        assert_eq!(transition.to_step, "extract");
        assert!(transition.is_ended);
    }

    #[test]
    fn test_blank_next_is_ignored() {
        let mut step = StepDescriptor::tasklet("a", ComponentDescriptor::of_type("Tasklet"));
        step.next = Some("   ".to_string());
        assert_eq!(step.next_step(), None);
    }
}
