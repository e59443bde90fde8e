//! Step assembly: one step descriptor in, one executable step out.
//!
//! A step is assembled in a fixed order:
//!
//! 1. structural check of the descriptor (nothing is built on failure)
//! 2. components, taken from the step's steplet when one supplies them and
//!    resolved through the registry otherwise
//! 3. listeners, with the tracing listener always first
//! 4. fault tolerance, when any retry/skip/transaction policy is declared

pub mod fault;
pub mod tracing_listener;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::component::{
    exit_status, Capability, ChunkListener, Component, ItemProcessListener, ItemProcessor,
    ItemReadListener, ItemReader, ItemWriteListener, ItemWriter, SkipListener,
    StepExecutionListener, Tasklet,
};
use crate::config::descriptor::{ComponentDescriptor, ListenerDescriptor, StepDescriptor, StepMode};
use crate::config::validate::validate_step;
use crate::error::{AssemblyError, AssemblyResult};
use crate::registry::{ComponentRegistry, Role};
use crate::resolve::{check_supplied, resolve, ResolvedComponent};

pub use fault::FaultTolerancePolicy;
pub use tracing_listener::{TracingStepListener, TRACING_LISTENER_NAME};

/// Pre-built components for the step named [`Steplet::step_name`].
///
/// A supplied component replaces resolution for its role; every supplied
/// component is still checked against the step's descriptor.
pub trait Steplet: Send + Sync {
    fn step_name(&self) -> &str;

    fn reader(&self) -> Option<Arc<dyn Component>> {
        None
    }

    fn processor(&self) -> Option<Arc<dyn Component>> {
        None
    }

    fn writer(&self) -> Option<Arc<dyn Component>> {
        None
    }

    fn tasklet(&self) -> Option<Arc<dyn Component>> {
        None
    }
}

// ============================================================================
// Assembled step
// ============================================================================

/// Listeners bound to a step, grouped by the capability they were
/// dispatched to. A component implementing several capabilities appears in
/// several groups.
#[derive(Default, Clone)]
pub struct StepListeners {
    pub step: Vec<Arc<dyn StepExecutionListener>>,
    pub chunk: Vec<Arc<dyn ChunkListener>>,
    pub read: Vec<Arc<dyn ItemReadListener>>,
    pub process: Vec<Arc<dyn ItemProcessListener>>,
    pub write: Vec<Arc<dyn ItemWriteListener>>,
    pub skip: Vec<Arc<dyn SkipListener>>,
    /// Names of the attached components, in attachment order.
    pub names: Vec<String>,
}

impl StepListeners {
    /// Dispatch `component` to every listener capability it offers and
    /// return those capabilities.
    pub fn attach(&mut self, component: &Arc<dyn Component>) -> Vec<Capability> {
        let mut handled = Vec::new();
        if let Some(l) = Arc::clone(component).as_step_listener() {
            self.step.push(l);
            handled.push(Capability::StepExecutionListener);
        }
        if let Some(l) = Arc::clone(component).as_chunk_listener() {
            self.chunk.push(l);
            handled.push(Capability::ChunkListener);
        }
        if let Some(l) = Arc::clone(component).as_read_listener() {
            self.read.push(l);
            handled.push(Capability::ItemReadListener);
        }
        if let Some(l) = Arc::clone(component).as_process_listener() {
            self.process.push(l);
            handled.push(Capability::ItemProcessListener);
        }
        if let Some(l) = Arc::clone(component).as_write_listener() {
            self.write.push(l);
            handled.push(Capability::ItemWriteListener);
        }
        if let Some(l) = Arc::clone(component).as_skip_listener() {
            self.skip.push(l);
            handled.push(Capability::SkipListener);
        }
        if !handled.is_empty() {
            self.names.push(component.name().to_string());
        }
        handled
    }
}

impl fmt::Debug for StepListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepListeners")
            .field("names", &self.names)
            .field("step", &self.step.len())
            .field("chunk", &self.chunk.len())
            .field("read", &self.read.len())
            .field("process", &self.process.len())
            .field("write", &self.write.len())
            .field("skip", &self.skip.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ChunkStep {
    pub chunk_size: usize,
    pub reader: ResolvedComponent,
    pub processor: ResolvedComponent,
    pub writer: ResolvedComponent,
    /// `None`: any component error aborts the step.
    pub fault_tolerance: Option<FaultTolerancePolicy>,
}

impl ChunkStep {
    pub fn reader(&self) -> Option<Arc<dyn ItemReader>> {
        Arc::clone(&self.reader.component).as_reader()
    }

    pub fn processor(&self) -> Option<Arc<dyn ItemProcessor>> {
        Arc::clone(&self.processor.component).as_processor()
    }

    pub fn writer(&self) -> Option<Arc<dyn ItemWriter>> {
        Arc::clone(&self.writer.component).as_writer()
    }
}

#[derive(Debug, Clone)]
pub struct TaskletStep {
    pub tasklet: ResolvedComponent,
}

impl TaskletStep {
    pub fn tasklet(&self) -> Option<Arc<dyn Tasklet>> {
        Arc::clone(&self.tasklet.component).as_tasklet()
    }
}

#[derive(Debug, Clone)]
pub enum StepKind {
    Chunk(ChunkStep),
    Tasklet(TaskletStep),
}

/// A fully wired step, ready for an execution engine.
#[derive(Debug, Clone)]
pub struct ExecutableStep {
    pub name: String,
    pub kind: StepKind,
    pub listeners: StepListeners,
}

impl ExecutableStep {
    pub fn mode(&self) -> StepMode {
        match self.kind {
            StepKind::Chunk(_) => StepMode::Chunk,
            StepKind::Tasklet(_) => StepMode::Tasklet,
        }
    }

    /// Exit statuses this step can report.
    pub fn exit_statuses(&self) -> &'static [&'static str] {
        &exit_status::ALL
    }

    pub fn is_fault_tolerant(&self) -> bool {
        matches!(&self.kind, StepKind::Chunk(c) if c.fault_tolerance.is_some())
    }

    /// Step components in role order.
    pub fn components(&self) -> Vec<&ResolvedComponent> {
        match &self.kind {
            StepKind::Chunk(c) => vec![&c.reader, &c.processor, &c.writer],
            StepKind::Tasklet(t) => vec![&t.tasklet],
        }
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Assembles steps against a shared registry.
#[derive(Debug, Clone)]
pub struct StepAssembler {
    registry: Arc<ComponentRegistry>,
}

impl StepAssembler {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    pub fn assemble_step(
        &self,
        step: &StepDescriptor,
        steplet: Option<&dyn Steplet>,
    ) -> AssemblyResult<ExecutableStep> {
        validate_step(step)?;

        let kind = match step.effective_mode() {
            StepMode::Chunk => {
                let reader = self.component(step, Role::Reader, &step.reader, steplet.and_then(|s| s.reader()))?;
                let processor = self.component(
                    step,
                    Role::Processor,
                    &step.processor,
                    steplet.and_then(|s| s.processor()),
                )?;
                let writer = self.component(step, Role::Writer, &step.writer, steplet.and_then(|s| s.writer()))?;
                StepKind::Chunk(ChunkStep {
                    chunk_size: step.chunk,
                    reader,
                    processor,
                    writer,
                    fault_tolerance: FaultTolerancePolicy::from_policies(
                        step.retry.as_ref(),
                        step.skip.as_ref(),
                        step.transaction.as_ref(),
                    ),
                })
            }
            StepMode::Tasklet => {
                let tasklet =
                    self.component(step, Role::Tasklet, &step.tasklet, steplet.and_then(|s| s.tasklet()))?;
                StepKind::Tasklet(TaskletStep { tasklet })
            }
        };

        let listeners = self.listeners(step)?;

        info!(
            step = %step.name,
            mode = %step.effective_mode(),
            listeners = listeners.names.len(),
            fault_tolerant = matches!(&kind, StepKind::Chunk(c) if c.fault_tolerance.is_some()),
            "Assembled step"
        );

        Ok(ExecutableStep {
            name: step.name.clone(),
            kind,
            listeners,
        })
    }

    fn component(
        &self,
        step: &StepDescriptor,
        role: Role,
        descriptor: &Option<ComponentDescriptor>,
        supplied: Option<Arc<dyn Component>>,
    ) -> AssemblyResult<ResolvedComponent> {
        let descriptor = descriptor.as_ref().ok_or_else(|| {
            AssemblyError::config(
                format!("steps.{}.{}", step.name, role),
                format!("{role} is required in {} mode", step.effective_mode()),
            )
        })?;
        match supplied {
            Some(component) => check_supplied(&self.registry, role, descriptor, component),
            None => resolve(
                &self.registry,
                role,
                descriptor,
                &format!("{}.{}", step.name, role),
                step.chunk,
            ),
        }
    }

    fn listeners(&self, step: &StepDescriptor) -> AssemblyResult<StepListeners> {
        let mut listeners = StepListeners::default();
        let tracing: Arc<dyn Component> = Arc::new(TracingStepListener);
        listeners.attach(&tracing);

        for descriptor in &step.listeners {
            let Some(component) = self.listener(step, descriptor)? else {
                continue;
            };
            if listeners.attach(&component).is_empty() {
                warn!(
                    step = %step.name,
                    listener = %component.name(),
                    "Listener not handled: implements no step listener capability"
                );
            }
        }
        Ok(listeners)
    }

    fn listener(
        &self,
        step: &StepDescriptor,
        descriptor: &ListenerDescriptor,
    ) -> AssemblyResult<Option<Arc<dyn Component>>> {
        let (Some(name), Some(listener_type)) = (descriptor.declared_name(), descriptor.declared_type())
        else {
            return Ok(None);
        };
        let component = ComponentDescriptor::named(name, listener_type);
        let resolved = resolve(
            &self.registry,
            Role::Listener,
            &component,
            &format!("{}.listener", step.name),
            step.chunk,
        )
        .map_err(|e| AssemblyError::ListenerBinding {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(resolved.component))
    }
}
