//! Stock component types and the default registry.

pub mod flat_file;
pub mod jdbc;
pub mod paging;

use std::sync::Arc;

use crate::component::{Capability, Component, Item, ItemError, ItemProcessor};
use crate::error::AssemblyResult;
use crate::registry::{BuildContext, ComponentRegistry, Role, TypeSpec};

pub use flat_file::{FlatFileItemReader, FlatFileItemWriter};
pub use jdbc::{
    ColumnMapRowMapper, DataSource, ItemPreparedStatementSetter, JdbcBatchItemWriter,
    JdbcCursorItemReader, JdbcPagingItemReader, PreparedStatementSetter, Row, RowMapper, SqlParams,
};
pub use paging::{PagingClause, PagingQuery, SortKey, SortOrder};

/// Returns its input unchanged.
pub struct PassThroughItemProcessor {
    name: String,
}

impl PassThroughItemProcessor {
    pub const KIND: &'static str = "PassThroughItemProcessor";

    pub fn build(ctx: &BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> {
        Ok(Arc::new(Self {
            name: ctx.name.to_string(),
        }))
    }
}

impl ItemProcessor for PassThroughItemProcessor {
    fn process(&self, item: Item) -> Result<Option<Item>, ItemError> {
        Ok(Some(item))
    }
}

impl Component for PassThroughItemProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn as_processor(self: Arc<Self>) -> Option<Arc<dyn ItemProcessor>> {
        Some(self)
    }
}

/// Declare the stock types and register their builders.
///
/// Generic types (`ItemReader`, `ItemProcessor`, `ItemWriter`, `Tasklet`
/// and the listener types) accept any implementor but have no builder, so
/// they must name a registered instance.
pub fn register_defaults(registry: &mut ComponentRegistry) {
    registry.declare_type(
        Role::Reader,
        FlatFileItemReader::KIND,
        TypeSpec::kind(Capability::Reader, FlatFileItemReader::KIND),
    );
    registry.declare_type(
        Role::Reader,
        JdbcPagingItemReader::KIND,
        TypeSpec::kind(Capability::Reader, JdbcPagingItemReader::KIND),
    );
    registry.declare_type(
        Role::Reader,
        JdbcCursorItemReader::KIND,
        TypeSpec::kind(Capability::Reader, JdbcCursorItemReader::KIND),
    );
    registry.declare_type(Role::Reader, "ItemReader", TypeSpec::any(Capability::Reader));
    registry.register_builder(Role::Reader, FlatFileItemReader::KIND, FlatFileItemReader::build);
    registry.register_builder(Role::Reader, JdbcPagingItemReader::KIND, JdbcPagingItemReader::build);
    registry.register_builder(Role::Reader, JdbcCursorItemReader::KIND, JdbcCursorItemReader::build);

    registry.declare_type(
        Role::Processor,
        PassThroughItemProcessor::KIND,
        TypeSpec::kind(Capability::Processor, PassThroughItemProcessor::KIND),
    );
    registry.declare_type(Role::Processor, "ItemProcessor", TypeSpec::any(Capability::Processor));
    registry.register_builder(
        Role::Processor,
        PassThroughItemProcessor::KIND,
        PassThroughItemProcessor::build,
    );

    registry.declare_type(
        Role::Writer,
        FlatFileItemWriter::KIND,
        TypeSpec::kind(Capability::Writer, FlatFileItemWriter::KIND),
    );
    registry.declare_type(
        Role::Writer,
        JdbcBatchItemWriter::KIND,
        TypeSpec::kind(Capability::Writer, JdbcBatchItemWriter::KIND),
    );
    registry.declare_type(Role::Writer, "ItemWriter", TypeSpec::any(Capability::Writer));
    registry.register_builder(Role::Writer, FlatFileItemWriter::KIND, FlatFileItemWriter::build);
    registry.register_builder(Role::Writer, JdbcBatchItemWriter::KIND, JdbcBatchItemWriter::build);

    registry.declare_type(Role::Tasklet, "Tasklet", TypeSpec::any(Capability::Tasklet));

    for capability in Capability::STEP_LISTENERS {
        registry.declare_type(Role::Listener, capability.type_name(), TypeSpec::any(capability));
    }
    // Resolvable on a step but handled by no step listener capability.
    registry.declare_type(
        Role::Listener,
        Capability::JobExecutionListener.type_name(),
        TypeSpec::any(Capability::JobExecutionListener),
    );

    jdbc::register_defaults(registry);
}

/// A registry holding the stock types, ready for application components.
pub fn create_default_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    register_defaults(&mut registry);
    registry
}
