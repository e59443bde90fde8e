//! Structural validation of job and step descriptors.
//!
//! Runs before anything is resolved or built, so a rejected descriptor never
//! leaves partially constructed components behind. Cross-step references are
//! checked later by the flow builder.

use std::collections::HashSet;

use crate::config::descriptor::{
    ComponentDescriptor, JobDescriptor, ListenerDescriptor, StepDescriptor, StepMode,
};
use crate::error::{AssemblyError, AssemblyResult};

/// Validate job-level structure and every step.
pub fn validate_job(job: &JobDescriptor) -> AssemblyResult<()> {
    if job.name.trim().is_empty() {
        return Err(AssemblyError::config("name", "job name must be provided"));
    }

    if job.steps.is_empty() {
        return Err(AssemblyError::config(
            "steps",
            "job must contain at least one step",
        ));
    }

    if let Some(listener) = &job.listener {
        validate_listener_pairing(listener, "listener")?;
    }

    if let Some(validator) = &job.validator {
        if validator.validate && validator.name.trim().is_empty() {
            return Err(AssemblyError::config(
                "validator.name",
                "validator name must be provided when 'validate' is enabled",
            ));
        }
    }

    let mut seen = HashSet::new();
    for step in &job.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(AssemblyError::config(
                format!("steps.{}", step.name),
                format!("Duplicate step name: {}", step.name),
            ));
        }
        validate_step(step)?;
    }

    Ok(())
}

/// Validate one step: mode exclusivity, chunk size, listener pairing and
/// transition shape.
pub fn validate_step(step: &StepDescriptor) -> AssemblyResult<()> {
    if step.name.trim().is_empty() {
        return Err(AssemblyError::config("steps", "step name must be provided"));
    }
    let path = format!("steps.{}", step.name);

    match step.effective_mode() {
        StepMode::Chunk => {
            if step.chunk == 0 {
                return Err(AssemblyError::config(
                    format!("{path}.chunk"),
                    "chunk size must be greater than 0",
                ));
            }
            require(&step.reader, &path, "reader", StepMode::Chunk)?;
            require(&step.processor, &path, "processor", StepMode::Chunk)?;
            require(&step.writer, &path, "writer", StepMode::Chunk)?;
            forbid(&step.tasklet, &path, "tasklet", StepMode::Chunk)?;
        }
        StepMode::Tasklet => {
            require(&step.tasklet, &path, "tasklet", StepMode::Tasklet)?;
            forbid(&step.reader, &path, "reader", StepMode::Tasklet)?;
            forbid(&step.processor, &path, "processor", StepMode::Tasklet)?;
            forbid(&step.writer, &path, "writer", StepMode::Tasklet)?;
            if step.has_fault_tolerance() {
                let policy = if step.retry.is_some() {
                    "retry"
                } else if step.skip.is_some() {
                    "skip"
                } else {
                    "transaction"
                };
                return Err(AssemblyError::config(
                    format!("{path}.{policy}"),
                    format!("{policy} policy is not allowed in TASKLET mode"),
                ));
            }
        }
    }

    for (idx, listener) in step.listeners.iter().enumerate() {
        let lpath = format!("{path}.listeners[{idx}]");
        validate_listener_pairing(listener, &lpath)?;
        validate_item_listener_match(step, listener, &lpath)?;
    }

    if step.next_step().is_some() && !step.transitions.is_empty() {
        return Err(AssemblyError::config(
            format!("{path}.next"),
            "'next' and 'transitions' are mutually exclusive",
        ));
    }

    for (idx, transition) in step.transitions.iter().enumerate() {
        let tpath = format!("{path}.transitions[{idx}]");
        if transition.on_condition.trim().is_empty() {
            return Err(AssemblyError::config(
                format!("{tpath}.onCondition"),
                "onCondition must be provided",
            ));
        }
        if transition.to_step.trim().is_empty() {
            return Err(AssemblyError::config(
                format!("{tpath}.toStep"),
                "toStep must be provided when onCondition is set",
            ));
        }
    }

    Ok(())
}

fn require(
    component: &Option<ComponentDescriptor>,
    path: &str,
    role: &str,
    mode: StepMode,
) -> AssemblyResult<()> {
    match component {
        None => Err(AssemblyError::config(
            format!("{path}.{role}"),
            format!("{role} is required in {mode} mode"),
        )),
        Some(c) if c.component_type.trim().is_empty() => Err(AssemblyError::config(
            format!("{path}.{role}.type"),
            format!("{role} type must be provided"),
        )),
        Some(_) => Ok(()),
    }
}

fn forbid(
    component: &Option<ComponentDescriptor>,
    path: &str,
    role: &str,
    mode: StepMode,
) -> AssemblyResult<()> {
    if component.is_some() {
        return Err(AssemblyError::config(
            format!("{path}.{role}"),
            format!("{role} is not allowed in {mode} mode"),
        ));
    }
    Ok(())
}

fn validate_listener_pairing(listener: &ListenerDescriptor, path: &str) -> AssemblyResult<()> {
    match (listener.declared_name(), listener.declared_type()) {
        (Some(_), Some(_)) | (None, None) => Ok(()),
        _ => Err(AssemblyError::config(
            path,
            "listener name and type must both be set or both be absent",
        )),
    }
}

/// An item listener must carry the name of the component it observes, when
/// that component is declared by name.
fn validate_item_listener_match(
    step: &StepDescriptor,
    listener: &ListenerDescriptor,
    path: &str,
) -> AssemblyResult<()> {
    let (Some(name), Some(listener_type)) = (listener.declared_name(), listener.declared_type())
    else {
        return Ok(());
    };
    let (role, component) = match listener_type.to_ascii_lowercase().as_str() {
        "itemreadlistener" => ("reader", &step.reader),
        "itemprocesslistener" => ("processor", &step.processor),
        "itemwritelistener" => ("writer", &step.writer),
        _ => return Ok(()),
    };
    match component.as_ref().and_then(|c| c.declared_name()) {
        Some(expected) if expected != name => Err(AssemblyError::config(
            path,
            format!("{listener_type} '{name}' does not match {role} '{expected}'"),
        )),
        _ => Ok(()),
    }
}
