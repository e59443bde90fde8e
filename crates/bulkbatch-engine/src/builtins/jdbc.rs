//! Database-backed readers and writer.
//!
//! Connections are not managed here: a [`DataSource`] registered by name in
//! the [`ComponentRegistry`] runs statements, and row mappers and statement
//! setters are registered there as named factories. Readers run their first
//! query on the first `read`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::builtins::paging::{paging_query, PagingClause, PagingQuery};
use crate::component::{Component, Item, ItemError, ItemReader, ItemWriter};
use crate::error::{AssemblyError, AssemblyResult};
use crate::registry::{BuildContext, ComponentRegistry};

/// A result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Statement parameters: positional (`?`) and named (`:name`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlParams {
    pub positional: Vec<Value>,
    pub named: BTreeMap<String, Value>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.positional.push(value.into());
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.named.insert(name.into(), value.into());
    }
}

/// Executes SQL on behalf of the JDBC components.
pub trait DataSource: Send + Sync {
    fn query(&self, sql: &str, params: &SqlParams) -> Result<Vec<Row>, ItemError>;

    /// Run `sql` once per parameter set; returns affected row counts.
    fn execute_batch(&self, sql: &str, batch: &[SqlParams]) -> Result<Vec<u64>, ItemError>;
}

/// Turns a row into an item.
pub trait RowMapper: Send + Sync {
    fn map_row(&self, row: &Row, row_num: usize) -> Result<Item, ItemError>;
}

/// Binds the parameters of a reader query.
pub trait PreparedStatementSetter: Send + Sync {
    fn set_values(&self, params: &mut SqlParams) -> Result<(), ItemError>;
}

/// Binds one item's values for a batch writer statement.
pub trait ItemPreparedStatementSetter: Send + Sync {
    fn set_values(&self, item: &Item, params: &mut SqlParams) -> Result<(), ItemError>;
}

/// Maps a row to a JSON object of its columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnMapRowMapper;

impl RowMapper for ColumnMapRowMapper {
    fn map_row(&self, row: &Row, _row_num: usize) -> Result<Item, ItemError> {
        Ok(Value::Object(row.clone()))
    }
}

pub const COLUMN_MAP_ROW_MAPPER: &str = "ColumnMapRowMapper";

/// Binds every field of an object item as a named parameter.
#[derive(Debug, Default, Clone, Copy)]
struct ItemFieldsSetter;

impl ItemPreparedStatementSetter for ItemFieldsSetter {
    fn set_values(&self, item: &Item, params: &mut SqlParams) -> Result<(), ItemError> {
        let fields = item
            .as_object()
            .ok_or_else(|| ItemError::new("InvalidItem", "item is not an object"))?;
        for (name, value) in fields {
            params.set(name.clone(), value.clone());
        }
        Ok(())
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, component: &str) -> Result<MutexGuard<'a, T>, ItemError> {
    mutex
        .lock()
        .map_err(|_| ItemError::new("IllegalState", format!("{component}: state lock poisoned")))
}

fn datasource(ctx: &BuildContext<'_>, name: &str) -> AssemblyResult<Arc<dyn DataSource>> {
    ctx.registry
        .datasource(name)
        .ok_or_else(|| AssemblyError::build(ctx.name, format!("no datasource registered as '{name}'")))
}

fn row_mapper(ctx: &BuildContext<'_>, mapped_class: Option<&str>) -> AssemblyResult<Arc<dyn RowMapper>> {
    let name = mapped_class.unwrap_or(COLUMN_MAP_ROW_MAPPER);
    ctx.registry
        .row_mapper(name)
        .ok_or_else(|| AssemblyError::build(ctx.name, format!("no row mapper registered as '{name}'")))
}

// ============================================================================
// Cursor reader
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorReaderConfig {
    datasource: String,
    sql: String,
    #[serde(default)]
    prepared_statement_class: Option<String>,
    #[serde(default)]
    mapped_class: Option<String>,
}

/// Runs one query and streams its rows.
pub struct JdbcCursorItemReader {
    name: String,
    sql: String,
    datasource: Arc<dyn DataSource>,
    mapper: Arc<dyn RowMapper>,
    setter: Option<Arc<dyn PreparedStatementSetter>>,
    rows: Mutex<Option<(VecDeque<Row>, usize)>>,
}

impl JdbcCursorItemReader {
    pub const KIND: &'static str = "JdbcCursorItemReader";

    pub fn build(ctx: &BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> {
        let config: CursorReaderConfig = ctx.config_as()?;
        if config.sql.trim().is_empty() {
            return Err(AssemblyError::build(ctx.name, "'sql' must be provided"));
        }
        let setter = match config.prepared_statement_class.as_deref() {
            Some(name) => Some(ctx.registry.statement_setter(name).ok_or_else(|| {
                AssemblyError::build(ctx.name, format!("no statement setter registered as '{name}'"))
            })?),
            None => None,
        };
        info!(component = %ctx.name, datasource = %config.datasource, "Built JdbcCursorItemReader");
        Ok(Arc::new(Self {
            name: ctx.name.to_string(),
            sql: config.sql,
            datasource: datasource(ctx, &config.datasource)?,
            mapper: row_mapper(ctx, config.mapped_class.as_deref())?,
            setter,
            rows: Mutex::new(None),
        }))
    }
}

impl ItemReader for JdbcCursorItemReader {
    fn read(&self) -> Result<Option<Item>, ItemError> {
        let mut state = lock(&self.rows, &self.name)?;
        if state.is_none() {
            let mut params = SqlParams::new();
            if let Some(setter) = &self.setter {
                setter.set_values(&mut params)?;
            }
            let rows = self.datasource.query(&self.sql, &params)?;
            debug!(component = %self.name, rows = rows.len(), "Opened cursor");
            *state = Some((rows.into(), 0));
        }
        let Some((rows, row_num)) = state.as_mut() else {
            return Ok(None);
        };
        match rows.pop_front() {
            Some(row) => {
                let item = self.mapper.map_row(&row, *row_num)?;
                *row_num += 1;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn close(&self) -> Result<(), ItemError> {
        *lock(&self.rows, &self.name)? = None;
        Ok(())
    }
}

impl Component for JdbcCursorItemReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn as_reader(self: Arc<Self>) -> Option<Arc<dyn ItemReader>> {
        Some(self)
    }
}

// ============================================================================
// Paging reader
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagingReaderConfig {
    datasource: String,
    provider_type: String,
    #[serde(default)]
    mapped_class: Option<String>,
    clause: PagingClause,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
}

#[derive(Default)]
struct PageState {
    buffer: VecDeque<Row>,
    last_keys: Option<BTreeMap<String, Value>>,
    exhausted: bool,
    row_num: usize,
}

/// Reads a query page by page, resuming after the last sort-key values.
pub struct JdbcPagingItemReader {
    name: String,
    query: PagingQuery,
    page_size: usize,
    parameters: BTreeMap<String, Value>,
    datasource: Arc<dyn DataSource>,
    mapper: Arc<dyn RowMapper>,
    state: Mutex<PageState>,
}

impl JdbcPagingItemReader {
    pub const KIND: &'static str = "JdbcPagingItemReader";

    pub fn build(ctx: &BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> {
        let config: PagingReaderConfig = ctx.config_as()?;
        let query = paging_query(&config.provider_type, &config.clause, ctx.chunk_size)
            .map_err(|e| AssemblyError::build(ctx.name, e.to_string()))?;
        info!(
            component = %ctx.name,
            datasource = %config.datasource,
            provider = %config.provider_type,
            page_size = ctx.chunk_size,
            "Built JdbcPagingItemReader"
        );
        Ok(Arc::new(Self {
            name: ctx.name.to_string(),
            query,
            page_size: ctx.chunk_size,
            parameters: config.parameters,
            datasource: datasource(ctx, &config.datasource)?,
            mapper: row_mapper(ctx, config.mapped_class.as_deref())?,
            state: Mutex::new(PageState::default()),
        }))
    }

    fn fetch_page(&self, state: &mut PageState) -> Result<(), ItemError> {
        let mut params = SqlParams::new();
        for (name, value) in &self.parameters {
            params.set(name.clone(), value.clone());
        }
        let sql = match &state.last_keys {
            None => &self.query.first_page,
            Some(keys) => {
                for (name, value) in keys {
                    params.set(name.clone(), value.clone());
                }
                &self.query.remaining_pages
            }
        };

        let rows = self.datasource.query(sql, &params)?;
        debug!(component = %self.name, rows = rows.len(), "Fetched page");
        if rows.len() < self.page_size {
            state.exhausted = true;
        }
        if let Some(last) = rows.last() {
            let mut keys = BTreeMap::new();
            for key in &self.query.sort_keys {
                let value = last.get(key.column()).cloned().ok_or_else(|| {
                    ItemError::new(
                        "InvalidRow",
                        format!("sort key column '{}' missing from result", key.column()),
                    )
                })?;
                keys.insert(key.parameter(), value);
            }
            state.last_keys = Some(keys);
        }
        state.buffer.extend(rows);
        Ok(())
    }
}

impl ItemReader for JdbcPagingItemReader {
    fn read(&self) -> Result<Option<Item>, ItemError> {
        let mut state = lock(&self.state, &self.name)?;
        if state.buffer.is_empty() && !state.exhausted {
            self.fetch_page(&mut state)?;
        }
        let Some(row) = state.buffer.pop_front() else {
            return Ok(None);
        };
        let item = self.mapper.map_row(&row, state.row_num)?;
        state.row_num += 1;
        Ok(Some(item))
    }

    fn close(&self) -> Result<(), ItemError> {
        *lock(&self.state, &self.name)? = PageState::default();
        Ok(())
    }
}

impl Component for JdbcPagingItemReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn as_reader(self: Arc<Self>) -> Option<Arc<dyn ItemReader>> {
        Some(self)
    }
}

// ============================================================================
// Batch writer
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchWriterConfig {
    datasource: String,
    sql: String,
    #[serde(default)]
    prepared_statement_class: Option<String>,
}

/// Writes each chunk as one statement batch.
pub struct JdbcBatchItemWriter {
    name: String,
    sql: String,
    datasource: Arc<dyn DataSource>,
    setter: Arc<dyn ItemPreparedStatementSetter>,
}

impl JdbcBatchItemWriter {
    pub const KIND: &'static str = "JdbcBatchItemWriter";

    pub fn build(ctx: &BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> {
        let config: BatchWriterConfig = ctx.config_as()?;
        if config.sql.trim().is_empty() {
            return Err(AssemblyError::build(ctx.name, "'sql' must be provided"));
        }
        let setter: Arc<dyn ItemPreparedStatementSetter> = match config.prepared_statement_class.as_deref() {
            Some(name) => ctx.registry.item_statement_setter(name).ok_or_else(|| {
                AssemblyError::build(ctx.name, format!("no item statement setter registered as '{name}'"))
            })?,
            None => Arc::new(ItemFieldsSetter),
        };
        info!(component = %ctx.name, datasource = %config.datasource, "Built JdbcBatchItemWriter");
        Ok(Arc::new(Self {
            name: ctx.name.to_string(),
            sql: config.sql,
            datasource: datasource(ctx, &config.datasource)?,
            setter,
        }))
    }
}

impl ItemWriter for JdbcBatchItemWriter {
    fn write(&self, items: &[Item]) -> Result<(), ItemError> {
        let mut batch = Vec::with_capacity(items.len());
        for item in items {
            let mut params = SqlParams::new();
            self.setter.set_values(item, &mut params)?;
            batch.push(params);
        }
        let counts = self.datasource.execute_batch(&self.sql, &batch)?;
        debug!(component = %self.name, items = items.len(), updated = counts.iter().sum::<u64>(), "Wrote batch");
        Ok(())
    }
}

impl Component for JdbcBatchItemWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn as_writer(self: Arc<Self>) -> Option<Arc<dyn ItemWriter>> {
        Some(self)
    }
}

/// Register the stock row mapper.
pub fn register_defaults(registry: &mut ComponentRegistry) {
    registry.register_row_mapper(COLUMN_MAP_ROW_MAPPER, || Arc::new(ColumnMapRowMapper));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// In-memory table `t(id, amount)` that understands the paging statements
    /// by looking for the `_id` parameter.
    struct FakeTable {
        rows: Vec<Row>,
        queries: Mutex<Vec<(String, SqlParams)>>,
        batches: Mutex<Vec<SqlParams>>,
    }

    impl FakeTable {
        fn new(n: i64) -> Self {
            let rows = (1..=n)
                .map(|id| {
                    let mut row = Row::new();
                    row.insert("id".to_string(), json!(id));
                    row.insert("amount".to_string(), json!(id * 10));
                    row
                })
                .collect();
            Self {
                rows,
                queries: Mutex::new(Vec::new()),
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    impl DataSource for FakeTable {
        fn query(&self, sql: &str, params: &SqlParams) -> Result<Vec<Row>, ItemError> {
            self.queries.lock().unwrap().push((sql.to_string(), params.clone()));
            let after = params.named.get("_id").and_then(Value::as_i64).unwrap_or(0);
            let limit = sql
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            Ok(self
                .rows
                .iter()
                .filter(|r| r["id"].as_i64().unwrap_or(0) > after)
                .take(limit)
                .cloned()
                .collect())
        }

        fn execute_batch(&self, _sql: &str, batch: &[SqlParams]) -> Result<Vec<u64>, ItemError> {
            self.batches.lock().unwrap().extend(batch.iter().cloned());
            Ok(vec![1; batch.len()])
        }
    }

    struct FixedSetter;

    impl PreparedStatementSetter for FixedSetter {
        fn set_values(&self, params: &mut SqlParams) -> Result<(), ItemError> {
            params.push(json!(0));
            Ok(())
        }
    }

    fn registry(table: Arc<FakeTable>) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        register_defaults(&mut registry);
        registry.register_datasource("main", table);
        registry.register_statement_setter("FixedSetter", || Arc::new(FixedSetter));
        registry
    }

    fn ctx<'a>(registry: &'a ComponentRegistry, config: &'a Value, chunk_size: usize) -> BuildContext<'a> {
        BuildContext {
            name: "load.reader",
            type_name: "test",
            config,
            chunk_size,
            registry,
        }
    }

    fn drain(reader: &dyn ItemReader) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(item) = reader.read().unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_paging_reader_walks_pages() {
        let table = Arc::new(FakeTable::new(5));
        let registry = registry(table.clone());
        let config = json!({
            "datasource": "main",
            "providerType": "postgresql",
            "clause": {
                "selectClause": "id, amount",
                "fromClause": "t",
                "sortClause": [{"key": "id", "order": "ASCENDING"}]
            },
            "parameters": {"minAmount": 0}
        });
        let reader = JdbcPagingItemReader::build(&ctx(&registry, &config, 2))
            .unwrap()
            .as_reader()
            .unwrap();

        let items = drain(reader.as_ref());
        assert_eq!(items.len(), 5);
        assert_eq!(items[4]["id"], json!(5));

        let queries = table.queries.lock().unwrap();
        assert_eq!(queries.len(), 3);
        assert!(queries[0].0.ends_with("LIMIT 2"));
        assert!(queries[1].0.contains("id > :_id"));
        assert_eq!(queries[2].1.named.get("_id"), Some(&json!(4)));
        assert_eq!(queries[2].1.named.get("minAmount"), Some(&json!(0)));
    }

    #[test]
    fn test_paging_reader_requires_known_dialect() {
        let table = Arc::new(FakeTable::new(1));
        let registry = registry(table);
        let config = json!({
            "datasource": "main",
            "providerType": "informix",
            "clause": {"selectClause": "id", "fromClause": "t", "sortClause": [{"key": "id"}]}
        });
        let err = JdbcPagingItemReader::build(&ctx(&registry, &config, 10)).err().unwrap();
        assert!(err.to_string().contains("informix"));
    }

    #[test]
    fn test_cursor_reader_binds_setter_and_maps_columns() {
        let table = Arc::new(FakeTable::new(3));
        let registry = registry(table.clone());
        let config = json!({
            "datasource": "main",
            "sql": "SELECT id, amount FROM t WHERE id > ?",
            "preparedStatementClass": "FixedSetter"
        });
        let reader = JdbcCursorItemReader::build(&ctx(&registry, &config, 10))
            .unwrap()
            .as_reader()
            .unwrap();
        let items = drain(reader.as_ref());
        assert_eq!(items, vec![
            json!({"id": 1, "amount": 10}),
            json!({"id": 2, "amount": 20}),
            json!({"id": 3, "amount": 30}),
        ]);
        assert_eq!(table.queries.lock().unwrap()[0].1.positional, vec![json!(0)]);
    }

    #[test]
    fn test_missing_registry_entries_are_build_errors() {
        let registry = registry(Arc::new(FakeTable::new(0)));
        let config = json!({"datasource": "replica", "sql": "SELECT 1"});
        let err = JdbcCursorItemReader::build(&ctx(&registry, &config, 10)).err().unwrap();
        assert_eq!(
            err,
            AssemblyError::build("load.reader", "no datasource registered as 'replica'")
        );

        let config = json!({"datasource": "main", "sql": "SELECT 1", "mappedClass": "UserRowMapper"});
        let err = JdbcCursorItemReader::build(&ctx(&registry, &config, 10)).err().unwrap();
        assert!(err.to_string().contains("no row mapper registered as 'UserRowMapper'"));
    }

    #[test]
    fn test_batch_writer_binds_item_fields() {
        let table = Arc::new(FakeTable::new(0));
        let registry = registry(table.clone());
        let config = json!({"datasource": "main", "sql": "INSERT INTO t VALUES (:id, :amount)"});
        let writer = JdbcBatchItemWriter::build(&ctx(&registry, &config, 10))
            .unwrap()
            .as_writer()
            .unwrap();
        writer
            .write(&[json!({"id": 1, "amount": 5}), json!({"id": 2, "amount": 7})])
            .unwrap();

        let batches = table.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].named.get("amount"), Some(&json!(7)));
        assert!(writer.write(&[json!("not an object")]).is_err());
    }
}
