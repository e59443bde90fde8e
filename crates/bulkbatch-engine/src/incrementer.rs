//! Run-id incrementer: makes each launch of a job a new instance.

use std::sync::Arc;

use tracing::debug;

use crate::history::{HistoryError, JobExplorer};
use crate::params::JobParameters;

/// Parameter key carrying the run id.
pub const RUN_ID_KEY: &str = "run.id";

/// Derives the next `run.id` from the most recent execution of the job.
///
/// Two concurrent launches may read the same last execution and pick the
/// same id; launches of one job must be serialized by whoever schedules them.
#[derive(Clone)]
pub struct RunIdIncrementer {
    job_name: String,
    explorer: Arc<dyn JobExplorer>,
}

impl RunIdIncrementer {
    pub fn new(job_name: impl Into<String>, explorer: Arc<dyn JobExplorer>) -> Self {
        Self {
            job_name: job_name.into(),
            explorer,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Run id of the most recent execution plus one; 1 without history.
    pub async fn next_run_id(&self) -> Result<i64, HistoryError> {
        let Some(instance) = self.explorer.last_instance(&self.job_name).await? else {
            return Ok(1);
        };
        let executions = self.explorer.executions_of(&instance).await?;
        let last = executions
            .first()
            .and_then(|e| e.parameters.get_long(RUN_ID_KEY))
            .unwrap_or(0);
        last.checked_add(1)
            .ok_or_else(|| HistoryError::RunIdExhausted(self.job_name.clone()))
    }

    /// `parameters` with `run.id` set to the next run id.
    pub async fn next(&self, parameters: JobParameters) -> Result<JobParameters, HistoryError> {
        let run_id = self.next_run_id().await?;
        debug!(job = %self.job_name, run_id, "Incremented run id");
        Ok(parameters.with_long(RUN_ID_KEY, run_id))
    }
}

impl std::fmt::Debug for RunIdIncrementer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunIdIncrementer")
            .field("job_name", &self.job_name)
            .finish()
    }
}
