//! Error types for job assembly.
//!
//! Every assembly failure is fail-fast: the first violated invariant aborts
//! assembly and surfaces here with enough context (path, step, declared
//! name/type) to locate the offending configuration.

use thiserror::Error;

/// Errors raised while turning a job descriptor into an executable job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Structural, required-field or mutual-exclusivity violation.
    #[error("Configuration error at '{path}': {message}")]
    ConfigValidation { path: String, message: String },

    /// Declared type is not known for the role.
    #[error("Unknown {role} type '{type_name}'")]
    UnknownComponentType { role: String, type_name: String },

    /// Type is known, no name was given, and nothing can build it.
    #[error("No builder registered for {role} type '{type_name}' and no component name was given")]
    NoBuilder { role: String, type_name: String },

    /// A declared name with no matching instance.
    #[error("No bean found with name '{name}' for {role}")]
    NamedComponentNotFound { role: String, name: String },

    /// Instance exists but does not satisfy the declared type.
    #[error("Component '{name}' does not satisfy {role} type '{expected}'")]
    ComponentTypeMismatch {
        role: String,
        name: String,
        expected: String,
    },

    /// A transition or `next` names a step that was never assembled.
    #[error("Transition references unknown step: {from} -> {to}")]
    UnresolvedTransitionReference { from: String, to: String },

    /// A step that re-enters itself under the outcome that entered it.
    #[error("Step '{step}' loops onto itself on '{pattern}'")]
    StaticLoop { step: String, pattern: String },

    /// Job or step listener could not be bound.
    #[error("Invalid listener '{name}': {reason}")]
    ListenerBinding { name: String, reason: String },

    /// A builder accepted the type but failed to construct the component.
    #[error("Failed to build component '{component}': {message}")]
    ComponentBuild { component: String, message: String },

    /// Job file could not be read or parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AssemblyError {
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        AssemblyError::ConfigValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn build(component: impl Into<String>, message: impl Into<String>) -> Self {
        AssemblyError::ComponentBuild {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using AssemblyError.
pub type AssemblyResult<T> = Result<T, AssemblyError>;

impl From<serde_yaml::Error> for AssemblyError {
    fn from(err: serde_yaml::Error) -> Self {
        AssemblyError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for AssemblyError {
    fn from(err: std::io::Error) -> Self {
        AssemblyError::Parse(err.to_string())
    }
}
