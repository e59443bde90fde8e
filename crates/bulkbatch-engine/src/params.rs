//! Job launch parameters.
//!
//! Parameters arrive as `key=value` or `key=value,type` arguments (a leading
//! `--` is ignored). `type` is one of `string`, `long`, `double` or `date`;
//! untyped values are strings.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing or validating job parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParametersError {
    #[error("Malformed parameter '{0}': expected key=value")]
    Malformed(String),

    #[error("Parameter '{key}' has unknown type '{kind}'")]
    UnknownType { key: String, kind: String },

    #[error("Parameter '{key}' value '{value}' is not a valid {kind}")]
    InvalidValue {
        key: String,
        value: String,
        kind: String,
    },

    #[error("Missing required parameter '{0}'")]
    Missing(String),

    #[error("{0}")]
    Invalid(String),
}

/// A single typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum JobParameter {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl JobParameter {
    pub fn type_name(&self) -> &'static str {
        match self {
            JobParameter::String(_) => "string",
            JobParameter::Long(_) => "long",
            JobParameter::Double(_) => "double",
            JobParameter::Date(_) => "date",
        }
    }

    fn parse(key: &str, value: &str, kind: &str) -> Result<Self, ParametersError> {
        let invalid = || ParametersError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            kind: kind.to_string(),
        };
        match kind.to_ascii_lowercase().as_str() {
            "string" => Ok(JobParameter::String(value.to_string())),
            "long" => value.parse().map(JobParameter::Long).map_err(|_| invalid()),
            "double" => value.parse().map(JobParameter::Double).map_err(|_| invalid()),
            "date" => parse_date(value).map(JobParameter::Date).ok_or_else(invalid),
            _ => Err(ParametersError::UnknownType {
                key: key.to_string(),
                kind: kind.to_string(),
            }),
        }
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl fmt::Display for JobParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobParameter::String(s) => write!(f, "{s}"),
            JobParameter::Long(v) => write!(f, "{v}"),
            JobParameter::Double(v) => write!(f, "{v}"),
            JobParameter::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

/// Ordered set of named parameters for one launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    values: BTreeMap<String, JobParameter>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse command-line style arguments.
    pub fn parse_args<I, S>(args: I) -> Result<Self, ParametersError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for arg in args {
            let arg = arg.as_ref().trim();
            let arg = arg.strip_prefix("--").unwrap_or(arg);
            let (key, rest) = arg
                .split_once('=')
                .filter(|(k, _)| !k.trim().is_empty())
                .ok_or_else(|| ParametersError::Malformed(arg.to_string()))?;
            let (value, kind) = match rest.rsplit_once(',') {
                Some((value, kind)) if is_type_name(kind) => (value, kind),
                _ => (rest, "string"),
            };
            let parameter = JobParameter::parse(key.trim(), value, kind.trim())?;
            params.insert(key.trim(), parameter);
        }
        Ok(params)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JobParameter) {
        self.values.insert(key.into(), value);
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, JobParameter::String(value.into()));
        self
    }

    pub fn with_long(mut self, key: impl Into<String>, value: i64) -> Self {
        self.insert(key, JobParameter::Long(value));
        self
    }

    pub fn with_double(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, JobParameter::Double(value));
        self
    }

    pub fn with_date(mut self, key: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.insert(key, JobParameter::Date(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&JobParameter> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(JobParameter::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(JobParameter::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(JobParameter::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.values.get(key) {
            Some(JobParameter::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JobParameter)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn is_type_name(kind: &str) -> bool {
    matches!(
        kind.trim().to_ascii_lowercase().as_str(),
        "string" | "long" | "double" | "date"
    )
}

impl fmt::Display for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (key, value)) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_untyped_and_typed_args() {
        let params = JobParameters::parse_args([
            "--input=/data/in.csv",
            "run.id=7,long",
            "ratio=0.5,double",
            "--day=2024-03-01,date",
        ])
        .unwrap();

        assert_eq!(params.get_string("input"), Some("/data/in.csv"));
        assert_eq!(params.get_long("run.id"), Some(7));
        assert_eq!(params.get_double("ratio"), Some(0.5));
        assert_eq!(
            params.get_date("day").unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_comma_in_string_value_is_kept() {
        let params = JobParameters::parse_args(["cols=a,b,c"]).unwrap();
        assert_eq!(params.get_string("cols"), Some("a,b,c"));
    }

    #[test]
    fn test_malformed_arg_rejected() {
        let err = JobParameters::parse_args(["--verbose"]).unwrap_err();
        assert_eq!(err, ParametersError::Malformed("verbose".to_string()));
    }

    #[test]
    fn test_invalid_long_rejected() {
        let err = JobParameters::parse_args(["run.id=seven,long"]).unwrap_err();
        assert!(err.to_string().contains("not a valid long"));
    }

    #[test]
    fn test_display_is_ordered() {
        let params = JobParameters::new()
            .with_string("name", "nightly")
            .with_long("run.id", 3);
        assert_eq!(params.to_string(), "{name=nightly, run.id=3}");
    }

    #[test]
    fn test_typed_getters_do_not_coerce() {
        let params = JobParameters::new().with_string("run.id", "3");
        assert_eq!(params.get_long("run.id"), None);
    }
}
