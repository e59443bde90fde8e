//! Component registry: declared types, builders and named instances.
//!
//! The registry is populated once at startup and then shared read-only
//! (`Arc<ComponentRegistry>`); every lookup takes `&self`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::builtins::jdbc::{DataSource, ItemPreparedStatementSetter, PreparedStatementSetter, RowMapper};
use crate::component::{Capability, Component};
use crate::config::normalize::project;
use crate::error::AssemblyResult;
use crate::step::Steplet;

/// Builds a fresh component from its normalized configuration.
pub type ComponentBuilder =
    Arc<dyn Fn(&BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> + Send + Sync>;

pub type RowMapperFactory = Arc<dyn Fn() -> Arc<dyn RowMapper> + Send + Sync>;
pub type StatementSetterFactory = Arc<dyn Fn() -> Arc<dyn PreparedStatementSetter> + Send + Sync>;
pub type ItemStatementSetterFactory =
    Arc<dyn Fn() -> Arc<dyn ItemPreparedStatementSetter> + Send + Sync>;

/// Role a component reference plays inside a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Reader,
    Processor,
    Writer,
    Tasklet,
    Listener,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Processor => "processor",
            Role::Writer => "writer",
            Role::Tasklet => "tasklet",
            Role::Listener => "listener",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a declared type demands of an instance: a capability, optionally
/// narrowed to one concrete kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub capability: Capability,
    pub kind: Option<String>,
}

impl TypeSpec {
    /// Any implementor of `capability`.
    pub fn any(capability: Capability) -> Self {
        Self {
            capability,
            kind: None,
        }
    }

    /// Only instances of `kind` implementing `capability`.
    pub fn kind(capability: Capability, kind: impl Into<String>) -> Self {
        Self {
            capability,
            kind: Some(kind.into()),
        }
    }

    pub fn accepts(&self, component: &Arc<dyn Component>) -> bool {
        self.capability.is_provided_by(component)
            && self.kind.as_deref().map_or(true, |k| component.kind() == k)
    }
}

/// Inputs handed to a [`ComponentBuilder`].
pub struct BuildContext<'a> {
    /// Name given to the built instance, e.g. `extract.reader`.
    pub name: &'a str,
    pub type_name: &'a str,
    pub config: &'a Value,
    /// Chunk size of the owning step; paging readers use it as page size.
    pub chunk_size: usize,
    pub registry: &'a ComponentRegistry,
}

impl BuildContext<'_> {
    /// Project the configuration payload onto a typed shape.
    pub fn config_as<T: DeserializeOwned>(&self) -> AssemblyResult<T> {
        if self.config.is_null() {
            project(&Value::Object(Default::default()), &format!("{}.config", self.name))
        } else {
            project(self.config, &format!("{}.config", self.name))
        }
    }
}

#[derive(Default)]
struct RoleTable {
    types: BTreeMap<String, TypeSpec>,
    builders: HashMap<String, ComponentBuilder>,
}

/// Registry of component types, builders and named instances.
pub struct ComponentRegistry {
    tables: HashMap<Role, RoleTable>,
    named: BTreeMap<String, Arc<dyn Component>>,
    steplets: BTreeMap<String, Arc<dyn Steplet>>,
    datasources: HashMap<String, Arc<dyn DataSource>>,
    row_mappers: HashMap<String, RowMapperFactory>,
    statement_setters: HashMap<String, StatementSetterFactory>,
    item_statement_setters: HashMap<String, ItemStatementSetterFactory>,
}

impl ComponentRegistry {
    /// Create an empty registry with no declared types.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            named: BTreeMap::new(),
            steplets: BTreeMap::new(),
            datasources: HashMap::new(),
            row_mappers: HashMap::new(),
            statement_setters: HashMap::new(),
            item_statement_setters: HashMap::new(),
        }
    }

    /// Declare a type name the role accepts.
    pub fn declare_type(&mut self, role: Role, type_name: impl Into<String>, spec: TypeSpec) {
        self.tables
            .entry(role)
            .or_default()
            .types
            .insert(type_name.into(), spec);
    }

    /// Register a builder for a declared type.
    pub fn register_builder<F>(&mut self, role: Role, type_name: impl Into<String>, builder: F)
    where
        F: Fn(&BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> + Send + Sync + 'static,
    {
        self.tables
            .entry(role)
            .or_default()
            .builders
            .insert(type_name.into(), Arc::new(builder));
    }

    /// Register a named instance under its own name.
    pub fn register(&mut self, component: Arc<dyn Component>) {
        let name = component.name().to_string();
        if self.named.insert(name.clone(), component).is_some() {
            warn!(component = %name, "Named component registered twice; keeping the last one");
        }
    }

    /// Register pre-built components for the step with the steplet's name.
    pub fn register_steplet(&mut self, steplet: Arc<dyn Steplet>) {
        self.steplets.insert(steplet.step_name().to_string(), steplet);
    }

    pub fn register_datasource(&mut self, name: impl Into<String>, datasource: Arc<dyn DataSource>) {
        self.datasources.insert(name.into(), datasource);
    }

    pub fn register_row_mapper<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn RowMapper> + Send + Sync + 'static,
    {
        self.row_mappers.insert(name.into(), Arc::new(factory));
    }

    pub fn register_statement_setter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn PreparedStatementSetter> + Send + Sync + 'static,
    {
        self.statement_setters.insert(name.into(), Arc::new(factory));
    }

    pub fn register_item_statement_setter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ItemPreparedStatementSetter> + Send + Sync + 'static,
    {
        self.item_statement_setters
            .insert(name.into(), Arc::new(factory));
    }

    pub fn type_spec(&self, role: Role, type_name: &str) -> Option<&TypeSpec> {
        self.tables.get(&role)?.types.get(type_name)
    }

    pub fn builder(&self, role: Role, type_name: &str) -> Option<&ComponentBuilder> {
        self.tables.get(&role)?.builders.get(type_name)
    }

    /// Declared type names for a role, sorted.
    pub fn types(&self, role: Role) -> Vec<&str> {
        self.tables
            .get(&role)
            .map(|t| t.types.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn named(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.named.get(name).cloned()
    }

    pub fn named_components(&self) -> impl Iterator<Item = &Arc<dyn Component>> {
        self.named.values()
    }

    pub fn steplet(&self, step_name: &str) -> Option<Arc<dyn Steplet>> {
        self.steplets.get(step_name).cloned()
    }

    pub fn steplet_names(&self) -> impl Iterator<Item = &str> {
        self.steplets.keys().map(String::as_str)
    }

    pub fn datasource(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.datasources.get(name).cloned()
    }

    /// Fresh row mapper from the factory registered under `name`.
    pub fn row_mapper(&self, name: &str) -> Option<Arc<dyn RowMapper>> {
        self.row_mappers.get(name).map(|factory| factory())
    }

    pub fn statement_setter(&self, name: &str) -> Option<Arc<dyn PreparedStatementSetter>> {
        self.statement_setters.get(name).map(|factory| factory())
    }

    pub fn item_statement_setter(&self, name: &str) -> Option<Arc<dyn ItemPreparedStatementSetter>> {
        self.item_statement_setters.get(name).map(|factory| factory())
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut roles: Vec<_> = self.tables.keys().collect();
        roles.sort();
        let types: Vec<(Role, Vec<&str>)> = roles.into_iter().map(|r| (*r, self.types(*r))).collect();
        f.debug_struct("ComponentRegistry")
            .field("types", &types)
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("steplets", &self.steplets.keys().collect::<Vec<_>>())
            .field("datasources", &self.datasources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Item, ItemError, ItemReader};

    struct StaticReader;

    impl ItemReader for StaticReader {
        fn read(&self) -> Result<Option<Item>, ItemError> {
            Ok(None)
        }
    }

    impl Component for StaticReader {
        fn name(&self) -> &str {
            "static"
        }

        fn kind(&self) -> &str {
            "StaticReader"
        }

        fn as_reader(self: Arc<Self>) -> Option<Arc<dyn ItemReader>> {
            Some(self)
        }
    }

    #[test]
    fn test_registry_new() {
        let registry = ComponentRegistry::new();
        assert!(registry.types(Role::Reader).is_empty());
        assert!(registry.named("static").is_none());
    }

    #[test]
    fn test_type_spec_kind_narrowing() {
        let component: Arc<dyn Component> = Arc::new(StaticReader);
        assert!(TypeSpec::any(Capability::Reader).accepts(&component));
        assert!(TypeSpec::kind(Capability::Reader, "StaticReader").accepts(&component));
        assert!(!TypeSpec::kind(Capability::Reader, "FlatFileItemReader").accepts(&component));
        assert!(!TypeSpec::any(Capability::Writer).accepts(&component));
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ComponentRegistry::new();
        registry.declare_type(Role::Reader, "ItemReader", TypeSpec::any(Capability::Reader));
        registry.register_builder(Role::Reader, "ItemReader", |_ctx| {
            Ok(Arc::new(StaticReader) as Arc<dyn Component>)
        });
        registry.register(Arc::new(StaticReader));

        assert_eq!(registry.types(Role::Reader), vec!["ItemReader"]);
        assert!(registry.builder(Role::Reader, "ItemReader").is_some());
        assert!(registry.builder(Role::Writer, "ItemReader").is_none());
        assert_eq!(registry.named("static").unwrap().kind(), "StaticReader");

        let debug = format!("{:?}", registry);
        assert!(debug.contains("static"));
    }

    #[test]
    fn test_build_context_config_defaults_to_empty_map() {
        #[derive(serde::Deserialize)]
        struct Settings {
            #[serde(default)]
            delimiter: Option<String>,
        }

        let registry = ComponentRegistry::new();
        let ctx = BuildContext {
            name: "s.reader",
            type_name: "ItemReader",
            config: &Value::Null,
            chunk_size: 10,
            registry: &registry,
        };
        let settings: Settings = ctx.config_as().unwrap();
        assert!(settings.delimiter.is_none());
    }
}
