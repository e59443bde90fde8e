//! Launch seam between assembled jobs and an execution engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::history::{BatchStatus, HistoryError};
use crate::job::ExecutableJob;
use crate::params::{JobParameters, ParametersError};

/// Why a launch was refused or failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchError {
    #[error("Job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Job '{0}' is not restartable")]
    NotRestartable(String),

    #[error("Job instance '{0}' already completed for these parameters")]
    AlreadyCompleted(String),

    #[error("Invalid job parameters: {0}")]
    InvalidParameters(#[from] ParametersError),

    #[error("Unexpected launch failure: {0}")]
    Unexpected(String),
}

impl From<HistoryError> for LaunchError {
    fn from(err: HistoryError) -> Self {
        LaunchError::Unexpected(err.to_string())
    }
}

/// Outcome of a launch accepted by the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job_name: String,
    pub execution_id: u64,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    pub exit_status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Runs an assembled job with a parameter set.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn launch(
        &self,
        job: &ExecutableJob,
        parameters: JobParameters,
    ) -> Result<ExecutionResult, LaunchError>;
}

/// Prepares parameters for an assembled job and hands it to a launcher.
pub struct JobExecutor {
    launcher: Arc<dyn JobLauncher>,
}

impl JobExecutor {
    pub fn new(launcher: Arc<dyn JobLauncher>) -> Self {
        Self { launcher }
    }

    /// Increment the run id when the job carries an incrementer, validate the
    /// result when it carries a validator, then launch.
    pub async fn run(
        &self,
        job: &ExecutableJob,
        parameters: JobParameters,
    ) -> Result<ExecutionResult, LaunchError> {
        let parameters = match &job.incrementer {
            Some(incrementer) => incrementer.next(parameters).await.map_err(|e| {
                error!(job = %job.name, error = %e, "Could not derive next run id");
                LaunchError::from(e)
            })?,
            None => parameters,
        };

        if let Some(validator) = &job.validator {
            if let Err(e) = validator.validate(&parameters) {
                error!(job = %job.name, params = %parameters, error = %e, "Invalid job parameters");
                return Err(LaunchError::InvalidParameters(e));
            }
        }

        info!(job = %job.name, params = %parameters, "Launching job");
        match self.launcher.launch(job, parameters).await {
            Ok(result) => {
                info!(
                    job = %job.name,
                    execution_id = result.execution_id,
                    status = %result.status,
                    exit_status = %result.exit_status,
                    "Job finished"
                );
                Ok(result)
            }
            Err(e) => {
                match &e {
                    LaunchError::AlreadyRunning(_) => {
                        warn!(job = %job.name, "Job already running; launch skipped")
                    }
                    LaunchError::NotRestartable(_) => {
                        error!(job = %job.name, "Job cannot be restarted")
                    }
                    LaunchError::AlreadyCompleted(_) => {
                        warn!(job = %job.name, "Job instance already completed; use new parameters")
                    }
                    LaunchError::InvalidParameters(reason) => {
                        error!(job = %job.name, error = %reason, "Launcher rejected job parameters")
                    }
                    LaunchError::Unexpected(reason) => {
                        error!(job = %job.name, error = %reason, "Unexpected error launching job")
                    }
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::component::{Capability, Component, ItemError, RepeatStatus, StepContext, Tasklet};
    use crate::component::JobParametersValidator;
    use crate::config::descriptor::{ComponentDescriptor, JobDescriptor, StepDescriptor, ValidatorDescriptor};
    use crate::config::settings::EngineConfig;
    use crate::history::{InMemoryJobExplorer, JobExplorer};
    use crate::incrementer::RUN_ID_KEY;
    use crate::job::JobAssembler;
    use crate::registry::{ComponentRegistry, Role, TypeSpec};

    struct Noop;

    impl Tasklet for Noop {
        fn execute(&self, _context: &StepContext) -> Result<RepeatStatus, ItemError> {
            Ok(RepeatStatus::Finished)
        }
    }

    impl Component for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn kind(&self) -> &str {
            "Noop"
        }

        fn as_tasklet(self: Arc<Self>) -> Option<Arc<dyn Tasklet>> {
            Some(self)
        }
    }

    struct NeedsDay;

    impl JobParametersValidator for NeedsDay {
        fn validate(&self, parameters: &JobParameters) -> Result<(), ParametersError> {
            parameters
                .get_string("day")
                .map(|_| ())
                .ok_or_else(|| ParametersError::Missing("day".to_string()))
        }
    }

    impl Component for NeedsDay {
        fn name(&self) -> &str {
            "needsDay"
        }

        fn kind(&self) -> &str {
            "NeedsDay"
        }

        fn as_parameters_validator(self: Arc<Self>) -> Option<Arc<dyn JobParametersValidator>> {
            Some(self)
        }
    }

    /// Records launches into the explorer, or fails with a fixed error.
    struct MockLauncher {
        explorer: Arc<InMemoryJobExplorer>,
        fail_with: Option<LaunchError>,
        launched: Mutex<Vec<JobParameters>>,
    }

    #[async_trait]
    impl JobLauncher for MockLauncher {
        async fn launch(
            &self,
            job: &ExecutableJob,
            parameters: JobParameters,
        ) -> Result<ExecutionResult, LaunchError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            self.launched
                .lock()
                .map_err(|_| LaunchError::Unexpected("poisoned".to_string()))?
                .push(parameters.clone());
            let execution = self
                .explorer
                .record(&job.name, parameters, BatchStatus::Completed)?;
            Ok(ExecutionResult {
                job_name: execution.job_name,
                execution_id: execution.id,
                parameters: execution.parameters,
                status: execution.status,
                exit_status: execution.exit_status,
                started_at: execution.started_at,
                ended_at: execution.ended_at,
            })
        }
    }

    fn assemble(explorer: Arc<dyn JobExplorer>, validate: bool) -> ExecutableJob {
        let mut registry = ComponentRegistry::new();
        registry.declare_type(Role::Tasklet, "Tasklet", TypeSpec::any(Capability::Tasklet));
        registry.register(Arc::new(Noop));
        registry.register(Arc::new(NeedsDay));
        let descriptor = JobDescriptor {
            name: "nightly".to_string(),
            listener: None,
            validator: Some(ValidatorDescriptor {
                name: "needsDay".to_string(),
                validate,
            }),
            steps: vec![StepDescriptor::tasklet(
                "only",
                ComponentDescriptor::named("noop", "Tasklet"),
            )],
        };
        let config = EngineConfig {
            profiles: vec!["local".to_string()],
            ..EngineConfig::default()
        };
        JobAssembler::new(Arc::new(registry))
            .with_config(config)
            .with_explorer(explorer)
            .assemble(&descriptor)
            .unwrap()
    }

    fn launcher(explorer: Arc<InMemoryJobExplorer>, fail_with: Option<LaunchError>) -> Arc<MockLauncher> {
        Arc::new(MockLauncher {
            explorer,
            fail_with,
            launched: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_run_id_increments_across_runs() {
        let explorer = Arc::new(InMemoryJobExplorer::new());
        let job = assemble(explorer.clone(), false);
        let executor = JobExecutor::new(launcher(explorer, None));

        let first = executor.run(&job, JobParameters::new()).await.unwrap();
        let second = executor.run(&job, JobParameters::new()).await.unwrap();
        assert_eq!(first.parameters.get_long(RUN_ID_KEY), Some(1));
        assert_eq!(second.parameters.get_long(RUN_ID_KEY), Some(2));
        assert_eq!(second.status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_parameters_never_reach_launcher() {
        let explorer = Arc::new(InMemoryJobExplorer::new());
        let job = assemble(explorer.clone(), true);
        let mock = launcher(explorer, None);
        let executor = JobExecutor::new(mock.clone());

        let err = executor.run(&job, JobParameters::new()).await.unwrap_err();
        assert_eq!(
            err,
            LaunchError::InvalidParameters(ParametersError::Missing("day".to_string()))
        );
        assert!(mock.launched.lock().unwrap().is_empty());

        let ok = executor
            .run(&job, JobParameters::new().with_string("day", "2024-03-01"))
            .await
            .unwrap();
        assert_eq!(ok.parameters.get_string("day"), Some("2024-03-01"));
    }

    #[tokio::test]
    async fn test_launcher_errors_are_returned_typed() {
        let explorer = Arc::new(InMemoryJobExplorer::new());
        let job = assemble(explorer.clone(), false);

        for expected in [
            LaunchError::AlreadyRunning("nightly".to_string()),
            LaunchError::NotRestartable("nightly".to_string()),
            LaunchError::AlreadyCompleted("nightly".to_string()),
            LaunchError::Unexpected("disk full".to_string()),
        ] {
            let executor = JobExecutor::new(launcher(explorer.clone(), Some(expected.clone())));
            let err = executor.run(&job, JobParameters::new()).await.unwrap_err();
            assert_eq!(err, expected);
        }
    }
}
