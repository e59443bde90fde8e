//! Component resolution: reuse a named instance or build a fresh one.
//!
//! The same algorithm serves readers, processors, writers, tasklets and
//! step listeners; only the role's table of declared types and builders
//! differs.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::component::Component;
use crate::config::descriptor::ComponentDescriptor;
use crate::error::{AssemblyError, AssemblyResult};
use crate::registry::{BuildContext, ComponentRegistry, Role};

/// How a resolved component came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Constructed from type and configuration during this assembly.
    Built,
    /// A pre-existing instance, looked up by name or supplied by a steplet.
    Reused,
}

/// A materialized component and the declared type it was checked against.
#[derive(Clone)]
pub struct ResolvedComponent {
    pub component: Arc<dyn Component>,
    pub declared_type: String,
    pub provenance: Provenance,
}

impl ResolvedComponent {
    pub fn name(&self) -> &str {
        self.component.name()
    }
}

impl fmt::Debug for ResolvedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedComponent")
            .field("name", &self.component.name())
            .field("kind", &self.component.kind())
            .field("declared_type", &self.declared_type)
            .field("provenance", &self.provenance)
            .finish()
    }
}

/// Resolve `descriptor` for `role`.
///
/// 1. The declared type must be known for the role.
/// 2. A non-blank name must match a registered instance that satisfies the
///    type; it is returned as [`Provenance::Reused`].
/// 3. Otherwise the type's builder constructs a new instance named `label`,
///    checked against the type like any named instance.
pub fn resolve(
    registry: &ComponentRegistry,
    role: Role,
    descriptor: &ComponentDescriptor,
    label: &str,
    chunk_size: usize,
) -> AssemblyResult<ResolvedComponent> {
    let type_name = descriptor.component_type.trim();
    let spec = registry
        .type_spec(role, type_name)
        .ok_or_else(|| AssemblyError::UnknownComponentType {
            role: role.to_string(),
            type_name: type_name.to_string(),
        })?;

    if let Some(name) = descriptor.declared_name() {
        let component =
            registry
                .named(name)
                .ok_or_else(|| AssemblyError::NamedComponentNotFound {
                    role: role.to_string(),
                    name: name.to_string(),
                })?;
        if !spec.accepts(&component) {
            return Err(AssemblyError::ComponentTypeMismatch {
                role: role.to_string(),
                name: name.to_string(),
                expected: type_name.to_string(),
            });
        }
        debug!(role = %role, component = %name, r#type = %type_name, "Reusing named component");
        return Ok(ResolvedComponent {
            component,
            declared_type: type_name.to_string(),
            provenance: Provenance::Reused,
        });
    }

    let builder = registry
        .builder(role, type_name)
        .ok_or_else(|| AssemblyError::NoBuilder {
            role: role.to_string(),
            type_name: type_name.to_string(),
        })?;

    let ctx = BuildContext {
        name: label,
        type_name,
        config: &descriptor.config,
        chunk_size,
        registry,
    };
    let component = builder(&ctx)?;
    if !spec.accepts(&component) {
        return Err(AssemblyError::ComponentTypeMismatch {
            role: role.to_string(),
            name: component.name().to_string(),
            expected: type_name.to_string(),
        });
    }
    debug!(role = %role, component = %label, r#type = %type_name, "Built component");

    Ok(ResolvedComponent {
        component,
        declared_type: type_name.to_string(),
        provenance: Provenance::Built,
    })
}

/// Check an externally supplied instance against the descriptor that is
/// supposed to describe it: same name, and it satisfies the declared type.
pub fn check_supplied(
    registry: &ComponentRegistry,
    role: Role,
    descriptor: &ComponentDescriptor,
    component: Arc<dyn Component>,
) -> AssemblyResult<ResolvedComponent> {
    let type_name = descriptor.component_type.trim();
    let expected_name = descriptor.declared_name().unwrap_or_default();
    if component.name() != expected_name {
        return Err(AssemblyError::ComponentTypeMismatch {
            role: role.to_string(),
            name: component.name().to_string(),
            expected: format!("{type_name} named '{expected_name}'"),
        });
    }

    let spec = registry
        .type_spec(role, type_name)
        .ok_or_else(|| AssemblyError::UnknownComponentType {
            role: role.to_string(),
            type_name: type_name.to_string(),
        })?;
    if !spec.accepts(&component) {
        return Err(AssemblyError::ComponentTypeMismatch {
            role: role.to_string(),
            name: component.name().to_string(),
            expected: type_name.to_string(),
        });
    }

    Ok(ResolvedComponent {
        component,
        declared_type: type_name.to_string(),
        provenance: Provenance::Reused,
    })
}
