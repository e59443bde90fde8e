//! Job assembly: descriptor in, executable job out.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::component::{Capability, Component, JobExecutionListener, JobParametersValidator};
use crate::config::descriptor::{JobDescriptor, ListenerDescriptor};
use crate::config::settings::EngineConfig;
use crate::config::validate::validate_job;
use crate::error::{AssemblyError, AssemblyResult};
use crate::flow::{build_flow, ExecutionGraph};
use crate::history::JobExplorer;
use crate::incrementer::RunIdIncrementer;
use crate::registry::ComponentRegistry;
use crate::result_ext::ResultExt;
use crate::step::StepAssembler;

/// Registered components that no step of the job uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Steplets registered for step names the job does not declare.
    pub orphaned_steplets: Vec<String>,
    /// Named readers, processors, writers and tasklets never referenced.
    pub unreferenced_components: Vec<String>,
}

impl AssemblyReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_steplets.is_empty() && self.unreferenced_components.is_empty()
    }
}

/// A validated, fully wired job.
#[derive(Clone)]
pub struct ExecutableJob {
    pub name: String,
    pub graph: ExecutionGraph,
    pub listener: Option<Arc<dyn JobExecutionListener>>,
    pub validator: Option<Arc<dyn JobParametersValidator>>,
    pub incrementer: Option<RunIdIncrementer>,
    pub report: AssemblyReport,
}

impl fmt::Debug for ExecutableJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableJob")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .field("listener", &self.listener.is_some())
            .field("validator", &self.validator.is_some())
            .field("incrementer", &self.incrementer)
            .field("report", &self.report)
            .finish()
    }
}

/// Assembles jobs against a shared registry.
pub struct JobAssembler {
    registry: Arc<ComponentRegistry>,
    steps: StepAssembler,
    config: EngineConfig,
    explorer: Option<Arc<dyn JobExplorer>>,
}

impl JobAssembler {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            steps: StepAssembler::new(Arc::clone(&registry)),
            registry,
            config: EngineConfig::default(),
            explorer: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Job history used by the run-id incrementer.
    pub fn with_explorer(mut self, explorer: Arc<dyn JobExplorer>) -> Self {
        self.explorer = Some(explorer);
        self
    }

    pub fn assemble(&self, job: &JobDescriptor) -> AssemblyResult<ExecutableJob> {
        validate_job(job)?;

        let mut steps = Vec::with_capacity(job.steps.len());
        for descriptor in &job.steps {
            let steplet = self.registry.steplet(&descriptor.name);
            let step = self
                .steps
                .assemble_step(descriptor, steplet.as_deref())
                .log(format!("assembling step '{}' of job '{}'", descriptor.name, job.name))?;
            steps.push(step);
        }

        let graph = build_flow(job, steps).log(format!("building flow of job '{}'", job.name))?;

        let listener = match &job.listener {
            Some(descriptor) => self.job_listener(descriptor)?,
            None => None,
        };
        let validator = self.validator(job)?;

        let incrementer = match &self.explorer {
            Some(explorer) if self.config.run_id_incrementer_enabled() => {
                Some(RunIdIncrementer::new(job.name.clone(), Arc::clone(explorer)))
            }
            _ => {
                debug!(
                    job = %job.name,
                    profile = %self.config.run_id_profile,
                    "Run-id incrementer not attached"
                );
                None
            }
        };

        let report = self.report(job, &graph, listener.is_some())?;

        info!(
            job = %job.name,
            steps = graph.steps().len(),
            edges = graph.edges().len(),
            start = %graph.start,
            incrementer = incrementer.is_some(),
            "Assembled job"
        );

        Ok(ExecutableJob {
            name: job.name.clone(),
            graph,
            listener,
            validator,
            incrementer,
            report,
        })
    }

    fn job_listener(
        &self,
        descriptor: &ListenerDescriptor,
    ) -> AssemblyResult<Option<Arc<dyn JobExecutionListener>>> {
        let (Some(name), Some(listener_type)) = (descriptor.declared_name(), descriptor.declared_type())
        else {
            return Ok(None);
        };
        let binding = |reason: String| AssemblyError::ListenerBinding {
            name: name.to_string(),
            reason,
        };

        if Capability::from_listener_type(listener_type) != Some(Capability::JobExecutionListener) {
            return Err(binding(format!(
                "unsupported job listener type '{listener_type}'"
            )));
        }
        let component = self
            .registry
            .named(name)
            .ok_or_else(|| binding("no bean found with this name".to_string()))?;
        let listener = component
            .as_job_listener()
            .ok_or_else(|| binding("does not implement JobExecutionListener".to_string()))?;
        debug!(listener = %name, "Attached job listener");
        Ok(Some(listener))
    }

    fn validator(&self, job: &JobDescriptor) -> AssemblyResult<Option<Arc<dyn JobParametersValidator>>> {
        let Some(descriptor) = job.validator.as_ref().filter(|v| v.validate) else {
            return Ok(None);
        };
        let name = descriptor.name.trim();
        let component = self
            .registry
            .named(name)
            .ok_or_else(|| AssemblyError::NamedComponentNotFound {
                role: "validator".to_string(),
                name: name.to_string(),
            })?;
        let validator = component.as_parameters_validator().ok_or_else(|| {
            AssemblyError::ComponentTypeMismatch {
                role: "validator".to_string(),
                name: name.to_string(),
                expected: Capability::ParametersValidator.type_name().to_string(),
            }
        })?;
        debug!(validator = %name, "Attached parameters validator");
        Ok(Some(validator))
    }

    fn report(
        &self,
        job: &JobDescriptor,
        graph: &ExecutionGraph,
        has_job_listener: bool,
    ) -> AssemblyResult<AssemblyReport> {
        let step_names: HashSet<&str> = graph.step_names().into_iter().collect();
        let mut referenced: HashSet<&str> = graph
            .steps()
            .iter()
            .flat_map(|s| {
                s.components()
                    .into_iter()
                    .map(|c| c.name())
                    .chain(s.listeners.names.iter().map(String::as_str))
            })
            .collect();
        if has_job_listener {
            if let Some(name) = job.listener.as_ref().and_then(|l| l.declared_name()) {
                referenced.insert(name);
            }
        }

        let mut report = AssemblyReport::default();
        for steplet in self.registry.steplet_names() {
            if !step_names.contains(steplet) {
                warn!(job = %job.name, steplet = %steplet, "Steplet is not used by any step");
                report.orphaned_steplets.push(steplet.to_string());
            }
        }
        for component in self.registry.named_components() {
            if is_step_role(component) && !referenced.contains(component.name()) {
                warn!(
                    job = %job.name,
                    component = %component.name(),
                    kind = %component.kind(),
                    "Named component is not referenced by any step"
                );
                report.unreferenced_components.push(component.name().to_string());
            }
        }

        if self.config.fail_on_orphans && !report.is_clean() {
            let mut unused = report.orphaned_steplets.clone();
            unused.extend(report.unreferenced_components.iter().cloned());
            return Err(AssemblyError::config(
                "steps",
                format!("unused components: {}", unused.join(", ")),
            ));
        }
        Ok(report)
    }
}

impl fmt::Debug for JobAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobAssembler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("explorer", &self.explorer.is_some())
            .finish()
    }
}

fn is_step_role(component: &Arc<dyn Component>) -> bool {
    [
        Capability::Reader,
        Capability::Processor,
        Capability::Writer,
        Capability::Tasklet,
    ]
    .into_iter()
    .any(|c| c.is_provided_by(component))
}
