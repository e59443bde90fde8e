//! Persisted job history, as consumed by the run-id incrementer.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::JobParameters;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Job history unavailable: {0}")]
    Unavailable(String),

    #[error("Run id of job '{0}' cannot be incremented past {max}", max = i64::MAX)]
    RunIdExhausted(String),
}

/// Lifecycle status of a job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Starting,
    Started,
    Stopping,
    Stopped,
    Completed,
    Failed,
    Abandoned,
    Unknown,
}

impl BatchStatus {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Stopping => "STOPPING",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Abandoned => "ABANDONED",
            BatchStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// A job name together with one identifying parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: u64,
    pub job_name: String,
}

/// One attempt at running a job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: u64,
    pub instance_id: u64,
    pub job_name: String,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    pub exit_status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Read access to persisted job history.
#[async_trait]
pub trait JobExplorer: Send + Sync {
    /// Most recently created instance of `job_name`.
    async fn last_instance(&self, job_name: &str) -> Result<Option<JobInstance>, HistoryError>;

    /// Executions of `instance`, most recent first.
    async fn executions_of(
        &self,
        instance: &JobInstance,
    ) -> Result<Vec<JobExecution>, HistoryError>;
}

#[derive(Debug, Default)]
struct HistoryState {
    instances: Vec<(JobInstance, JobParameters)>,
    executions: Vec<JobExecution>,
}

/// Job history kept in process memory.
///
/// Instances are keyed by job name plus parameters, so recording an
/// execution with parameters seen before adds to the existing instance.
#[derive(Debug, Default)]
pub struct InMemoryJobExplorer {
    state: RwLock<HistoryState>,
}

impl InMemoryJobExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an execution and return it.
    pub fn record(
        &self,
        job_name: &str,
        parameters: JobParameters,
        status: BatchStatus,
    ) -> Result<JobExecution, HistoryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| HistoryError::Unavailable("history lock poisoned".to_string()))?;

        let instance_id = match state
            .instances
            .iter()
            .find(|(i, p)| i.job_name == job_name && *p == parameters)
        {
            Some((instance, _)) => instance.id,
            None => {
                let id = state.instances.len() as u64 + 1;
                state.instances.push((
                    JobInstance {
                        id,
                        job_name: job_name.to_string(),
                    },
                    parameters.clone(),
                ));
                id
            }
        };

        let now = Utc::now();
        let execution = JobExecution {
            id: state.executions.len() as u64 + 1,
            instance_id,
            job_name: job_name.to_string(),
            parameters,
            status,
            exit_status: status.to_string(),
            started_at: Some(now),
            ended_at: (!status.is_running()).then_some(now),
        };
        state.executions.push(execution.clone());
        Ok(execution)
    }
}

#[async_trait]
impl JobExplorer for InMemoryJobExplorer {
    async fn last_instance(&self, job_name: &str) -> Result<Option<JobInstance>, HistoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| HistoryError::Unavailable("history lock poisoned".to_string()))?;
        Ok(state
            .instances
            .iter()
            .filter(|(i, _)| i.job_name == job_name)
            .max_by_key(|(i, _)| i.id)
            .map(|(i, _)| i.clone()))
    }

    async fn executions_of(
        &self,
        instance: &JobInstance,
    ) -> Result<Vec<JobExecution>, HistoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| HistoryError::Unavailable("history lock poisoned".to_string()))?;
        let mut executions: Vec<JobExecution> = state
            .executions
            .iter()
            .filter(|e| e.instance_id == instance.id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_instance_is_newest() {
        let explorer = InMemoryJobExplorer::new();
        explorer
            .record("etl", JobParameters::new().with_long("run.id", 1), BatchStatus::Completed)
            .unwrap();
        explorer
            .record("etl", JobParameters::new().with_long("run.id", 2), BatchStatus::Failed)
            .unwrap();
        explorer
            .record("other", JobParameters::new(), BatchStatus::Completed)
            .unwrap();

        let last = explorer.last_instance("etl").await.unwrap().unwrap();
        assert_eq!(last.id, 2);
        assert!(explorer.last_instance("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_executions_most_recent_first() {
        let explorer = InMemoryJobExplorer::new();
        let params = JobParameters::new().with_long("run.id", 4);
        explorer.record("etl", params.clone(), BatchStatus::Failed).unwrap();
        explorer.record("etl", params, BatchStatus::Completed).unwrap();

        let instance = explorer.last_instance("etl").await.unwrap().unwrap();
        let executions = explorer.executions_of(&instance).await.unwrap();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].status, BatchStatus::Completed);
        assert!(executions[0].id > executions[1].id);
    }

    #[test]
    fn test_running_statuses() {
        assert!(BatchStatus::Started.is_running());
        assert!(!BatchStatus::Completed.is_running());
        assert_eq!(BatchStatus::Failed.to_string(), "FAILED");
    }
}
