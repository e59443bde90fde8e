//! Delimited flat-file reader and writer.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::component::{Component, Item, ItemError, ItemReader, ItemWriter};
use crate::error::{AssemblyError, AssemblyResult};
use crate::registry::BuildContext;

fn default_delimiter() -> String {
    ",".to_string()
}

/// Filesystem path of a resource location. `file:` is optional; classpath
/// resources do not exist here.
fn resource_path(component: &str, resource: &str) -> AssemblyResult<PathBuf> {
    let resource = resource.trim();
    if resource.is_empty() {
        return Err(AssemblyError::build(component, "'resource' must be provided"));
    }
    if resource.starts_with("classpath:") {
        return Err(AssemblyError::build(
            component,
            format!("classpath resources are not supported: '{resource}'"),
        ));
    }
    Ok(PathBuf::from(resource.strip_prefix("file:").unwrap_or(resource)))
}

fn check_fields(component: &str, delimiter: &str, field_names: &[String]) -> AssemblyResult<()> {
    if delimiter.is_empty() {
        return Err(AssemblyError::build(component, "'delimiter' must not be empty"));
    }
    if field_names.is_empty() {
        return Err(AssemblyError::build(component, "'fieldNames' must not be empty"));
    }
    Ok(())
}

fn lock<'a, T>(mutex: &'a Mutex<T>, component: &str) -> Result<MutexGuard<'a, T>, ItemError> {
    mutex
        .lock()
        .map_err(|_| ItemError::new("IllegalState", format!("{component}: state lock poisoned")))
}

/// Split `line` on `delimiter`, honouring double quotes. A doubled quote
/// inside a quoted field is a literal quote.
pub fn tokenize(line: &str, delimiter: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut rest = line;

    while let Some(c) = rest.chars().next() {
        if in_quotes {
            if c == '"' {
                if rest[1..].starts_with('"') {
                    current.push('"');
                    rest = &rest[2..];
                    continue;
                }
                in_quotes = false;
            } else {
                current.push(c);
            }
            rest = &rest[c.len_utf8()..];
        } else if rest.starts_with(delimiter) {
            tokens.push(std::mem::take(&mut current));
            rest = &rest[delimiter.len()..];
        } else {
            if c == '"' && current.trim().is_empty() {
                current.clear();
                in_quotes = true;
            } else {
                current.push(c);
            }
            rest = &rest[c.len_utf8()..];
        }
    }
    tokens.push(current);
    tokens
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReaderConfig {
    #[serde(default)]
    resource: String,
    #[serde(default = "default_delimiter")]
    delimiter: String,
    #[serde(default)]
    line_to_skip: usize,
    #[serde(default)]
    field_names: Vec<String>,
}

struct OpenFile {
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

/// Reads delimited lines into objects keyed by field name.
pub struct FlatFileItemReader {
    name: String,
    path: PathBuf,
    delimiter: String,
    lines_to_skip: usize,
    field_names: Vec<String>,
    file: Mutex<Option<OpenFile>>,
}

impl FlatFileItemReader {
    pub const KIND: &'static str = "FlatFileItemReader";

    pub fn build(ctx: &BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> {
        let config: ReaderConfig = ctx.config_as()?;
        let path = resource_path(ctx.name, &config.resource)?;
        check_fields(ctx.name, &config.delimiter, &config.field_names)?;
        info!(component = %ctx.name, resource = %path.display(), "Built FlatFileItemReader");
        Ok(Arc::new(Self {
            name: ctx.name.to_string(),
            path,
            delimiter: config.delimiter,
            lines_to_skip: config.line_to_skip,
            field_names: config.field_names,
            file: Mutex::new(None),
        }))
    }

    fn open(&self) -> Result<OpenFile, ItemError> {
        let file = File::open(&self.path).map_err(|e| {
            ItemError::new("ResourceNotFound", format!("{}: {}", self.path.display(), e))
        })?;
        let mut open = OpenFile {
            lines: BufReader::new(file).lines(),
            line_number: 0,
        };
        for _ in 0..self.lines_to_skip {
            if open.lines.next().transpose()?.is_none() {
                break;
            }
            open.line_number += 1;
        }
        debug!(component = %self.name, path = %self.path.display(), "Opened file");
        Ok(open)
    }
}

impl ItemReader for FlatFileItemReader {
    fn read(&self) -> Result<Option<Item>, ItemError> {
        let mut state = lock(&self.file, &self.name)?;
        if state.is_none() {
            *state = Some(self.open()?);
        }
        let Some(open) = state.as_mut() else {
            return Ok(None);
        };

        loop {
            let Some(line) = open.lines.next().transpose()? else {
                return Ok(None);
            };
            open.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let tokens = tokenize(&line, &self.delimiter);
            if tokens.len() != self.field_names.len() {
                return Err(ItemError::new(
                    "FlatFileParseError",
                    format!(
                        "{} line {}: expected {} fields, found {}",
                        self.path.display(),
                        open.line_number,
                        self.field_names.len(),
                        tokens.len()
                    ),
                ));
            }
            let record: Map<String, Value> = self
                .field_names
                .iter()
                .cloned()
                .zip(tokens.into_iter().map(Value::String))
                .collect();
            return Ok(Some(Value::Object(record)));
        }
    }

    fn close(&self) -> Result<(), ItemError> {
        *lock(&self.file, &self.name)? = None;
        Ok(())
    }
}

impl Component for FlatFileItemReader {
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
// Writer
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriterConfig {
    #[serde(default)]
    resource: String,
    #[serde(default = "default_delimiter")]
    delimiter: String,
    #[serde(default)]
    field_names: Vec<String>,
    #[serde(default)]
    file_header: Option<String>,
    #[serde(default)]
    file_footer: Option<String>,
}

/// Appends items as delimited lines; header on first open of an empty file,
/// footer on close.
pub struct FlatFileItemWriter {
    name: String,
    path: PathBuf,
    delimiter: String,
    field_names: Vec<String>,
    header: Option<String>,
    footer: Option<String>,
    out: Mutex<Option<BufWriter<File>>>,
}

impl FlatFileItemWriter {
    pub const KIND: &'static str = "FlatFileItemWriter";

    pub fn build(ctx: &BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>> {
        let config: WriterConfig = ctx.config_as()?;
        let path = resource_path(ctx.name, &config.resource)?;
        check_fields(ctx.name, &config.delimiter, &config.field_names)?;
        info!(component = %ctx.name, resource = %path.display(), "Built FlatFileItemWriter");
        Ok(Arc::new(Self {
            name: ctx.name.to_string(),
            path,
            delimiter: config.delimiter,
            field_names: config.field_names,
            header: config.file_header,
            footer: config.file_footer,
            out: Mutex::new(None),
        }))
    }

    fn open(&self) -> Result<BufWriter<File>, ItemError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut out = BufWriter::new(file);
        if let (true, Some(header)) = (is_new, &self.header) {
            writeln!(out, "{header}")?;
        }
        debug!(component = %self.name, path = %self.path.display(), "Opened file for append");
        Ok(out)
    }

    fn line(&self, item: &Item) -> Result<String, ItemError> {
        let fields = item.as_object().ok_or_else(|| {
            ItemError::new("InvalidItem", format!("{}: item is not an object", self.name))
        })?;
        let values: Vec<String> = self
            .field_names
            .iter()
            .map(|name| match fields.get(name) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        Ok(values.join(&self.delimiter))
    }
}

impl ItemWriter for FlatFileItemWriter {
    fn write(&self, items: &[Item]) -> Result<(), ItemError> {
        let lines = items
            .iter()
            .map(|item| self.line(item))
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = lock(&self.out, &self.name)?;
        if state.is_none() {
            *state = Some(self.open()?);
        }
        if let Some(out) = state.as_mut() {
            for line in &lines {
                writeln!(out, "{line}")?;
            }
            out.flush()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), ItemError> {
        let mut state = lock(&self.out, &self.name)?;
        if let Some(mut out) = state.take() {
            if let Some(footer) = &self.footer {
                writeln!(out, "{footer}")?;
            }
            out.flush()?;
        }
        Ok(())
    }
}

impl Component for FlatFileItemWriter {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;
    use serde_json::json;
    use std::fs;

    fn build(
        builder: fn(&BuildContext<'_>) -> AssemblyResult<Arc<dyn Component>>,
        config: Value,
    ) -> AssemblyResult<Arc<dyn Component>> {
        let registry = ComponentRegistry::new();
        builder(&BuildContext {
            name: "s.component",
            type_name: "test",
            config: &config,
            chunk_size: 10,
            registry: &registry,
        })
    }

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(tokenize("a,b,,c", ","), vec!["a", "b", "", "c"]);
        assert_eq!(tokenize(r#"1,"Doe, Jane","say ""hi""""#, ","), vec!["1", "Doe, Jane", r#"say "hi""#]);
        assert_eq!(tokenize("x||y", "||"), vec!["x", "y"]);
    }

    #[test]
    fn test_reader_skips_header_and_maps_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.csv");
        fs::write(&path, "id;name\n1;Ada\n\n2;\"Grace; H\"\n").unwrap();

        let reader = build(
            FlatFileItemReader::build,
            json!({
                "resource": format!("file:{}", path.display()),
                "delimiter": ";",
                "lineToSkip": 1,
                "fieldNames": ["id", "name"]
            }),
        )
        .unwrap()
        .as_reader()
        .unwrap();

        assert_eq!(reader.read().unwrap(), Some(json!({"id": "1", "name": "Ada"})));
        assert_eq!(reader.read().unwrap(), Some(json!({"id": "2", "name": "Grace; H"})));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_reader_opens_lazily() {
        let reader = build(
            FlatFileItemReader::build,
            json!({"resource": "/nonexistent/input.csv", "fieldNames": ["id"]}),
        )
        .unwrap()
        .as_reader()
        .unwrap();
        assert_eq!(reader.read().unwrap_err().class, "ResourceNotFound");
    }

    #[test]
    fn test_reader_field_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "1,2,3\n").unwrap();
        let reader = build(
            FlatFileItemReader::build,
            json!({"resource": path.display().to_string(), "fieldNames": ["a", "b"]}),
        )
        .unwrap()
        .as_reader()
        .unwrap();
        let err = reader.read().unwrap_err();
        assert_eq!(err.class, "FlatFileParseError");
        assert!(err.message.contains("line 1"));
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let err = build(
            FlatFileItemReader::build,
            json!({"resource": "classpath:in.csv", "fieldNames": ["id"]}),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("classpath resources are not supported"));

        let err = build(FlatFileItemWriter::build, json!({"resource": "out.csv"}))
            .err()
            .unwrap();
        assert!(err.to_string().contains("'fieldNames' must not be empty"));
    }

    #[test]
    fn test_writer_header_footer_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let config = json!({
            "resource": path.display().to_string(),
            "delimiter": "|",
            "fieldNames": ["id", "total", "note"],
            "fileHeader": "id|total|note",
            "fileFooter": "-- end --"
        });

        let writer = build(FlatFileItemWriter::build, config.clone())
            .unwrap()
            .as_writer()
            .unwrap();
        writer
            .write(&[json!({"id": 1, "total": 9.5, "note": "ok"}), json!({"id": 2})])
            .unwrap();
        writer.close().unwrap();

        let writer = build(FlatFileItemWriter::build, config).unwrap().as_writer().unwrap();
        writer.write(&[json!({"id": 3, "total": 1, "note": null})]).unwrap();
        writer.close().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "id|total|note\n1|9.5|ok\n2||\n-- end --\n3|1|\n-- end --\n"
        );
    }
}
