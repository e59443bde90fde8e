//! Component capability traits.
//!
//! The chunk loop that drives these traits lives in the execution engine;
//! assembly only needs to know which capabilities an instance offers. Every
//! registrable instance implements [`Component`], whose `as_*` methods
//! expose the capabilities it actually has.

pub mod listener;

use std::sync::Arc;

use thiserror::Error;

use crate::params::{JobParameters, ParametersError};

pub use listener::{
    ChunkContext, ChunkListener, ItemProcessListener, ItemReadListener, ItemWriteListener,
    JobExecutionListener, SkipListener, StepExecution, StepExecutionListener,
};

/// A record flowing through a chunk step.
pub type Item = serde_json::Value;

/// Exit statuses a step can report.
pub mod exit_status {
    pub const UNKNOWN: &str = "UNKNOWN";
    pub const EXECUTING: &str = "EXECUTING";
    pub const COMPLETED: &str = "COMPLETED";
    pub const NOOP: &str = "NOOP";
    pub const FAILED: &str = "FAILED";
    pub const STOPPED: &str = "STOPPED";

    pub const ALL: [&str; 6] = [UNKNOWN, EXECUTING, COMPLETED, NOOP, FAILED, STOPPED];
}

/// Failure raised by a component while running.
///
/// `class` is what retry, skip and rollback policies match against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{class}: {message}")]
pub struct ItemError {
    pub class: String,
    pub message: String,
}

impl ItemError {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ItemError {
    fn from(e: std::io::Error) -> Self {
        ItemError::new("IoError", e.to_string())
    }
}

/// Produces items one at a time; `Ok(None)` signals the end of input.
pub trait ItemReader: Send + Sync {
    fn read(&self) -> Result<Option<Item>, ItemError>;

    fn close(&self) -> Result<(), ItemError> {
        Ok(())
    }
}

/// Maps an item; `Ok(None)` filters it out.
pub trait ItemProcessor: Send + Sync {
    fn process(&self, item: Item) -> Result<Option<Item>, ItemError>;
}

/// Consumes one chunk of items.
pub trait ItemWriter: Send + Sync {
    fn write(&self, items: &[Item]) -> Result<(), ItemError>;

    fn close(&self) -> Result<(), ItemError> {
        Ok(())
    }
}

/// Completion signal of a tasklet invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStatus {
    Finished,
    Continuable,
}

/// What a tasklet sees of the running step.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub step_name: String,
    pub parameters: JobParameters,
}

/// A single unit of work run as a whole step.
pub trait Tasklet: Send + Sync {
    fn execute(&self, context: &StepContext) -> Result<RepeatStatus, ItemError>;
}

/// Checks launch parameters before a job runs.
pub trait JobParametersValidator: Send + Sync {
    fn validate(&self, parameters: &JobParameters) -> Result<(), ParametersError>;
}

/// A registrable instance: a declared name, a concrete kind and the
/// capabilities it implements.
///
/// ```ignore
/// impl Component for AuditListener {
///     fn name(&self) -> &str { "audit" }
///     fn kind(&self) -> &str { "AuditListener" }
///     fn as_step_listener(self: Arc<Self>) -> Option<Arc<dyn StepExecutionListener>> { Some(self) }
///     fn as_chunk_listener(self: Arc<Self>) -> Option<Arc<dyn ChunkListener>> { Some(self) }
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// Name the instance is registered and referenced under.
    fn name(&self) -> &str;

    /// Concrete kind, matched against specific declared types such as
    /// `FlatFileItemReader`.
    fn kind(&self) -> &str;

    fn as_reader(self: Arc<Self>) -> Option<Arc<dyn ItemReader>> {
        None
    }

    fn as_processor(self: Arc<Self>) -> Option<Arc<dyn ItemProcessor>> {
        None
    }

    fn as_writer(self: Arc<Self>) -> Option<Arc<dyn ItemWriter>> {
        None
    }

    fn as_tasklet(self: Arc<Self>) -> Option<Arc<dyn Tasklet>> {
        None
    }

    fn as_step_listener(self: Arc<Self>) -> Option<Arc<dyn StepExecutionListener>> {
        None
    }

    fn as_chunk_listener(self: Arc<Self>) -> Option<Arc<dyn ChunkListener>> {
        None
    }

    fn as_read_listener(self: Arc<Self>) -> Option<Arc<dyn ItemReadListener>> {
        None
    }

    fn as_process_listener(self: Arc<Self>) -> Option<Arc<dyn ItemProcessListener>> {
        None
    }

    fn as_write_listener(self: Arc<Self>) -> Option<Arc<dyn ItemWriteListener>> {
        None
    }

    fn as_skip_listener(self: Arc<Self>) -> Option<Arc<dyn SkipListener>> {
        None
    }

    fn as_job_listener(self: Arc<Self>) -> Option<Arc<dyn JobExecutionListener>> {
        None
    }

    fn as_parameters_validator(self: Arc<Self>) -> Option<Arc<dyn JobParametersValidator>> {
        None
    }
}

/// A capability a component can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Reader,
    Processor,
    Writer,
    Tasklet,
    StepExecutionListener,
    ChunkListener,
    ItemReadListener,
    ItemProcessListener,
    ItemWriteListener,
    SkipListener,
    JobExecutionListener,
    ParametersValidator,
}

impl Capability {
    /// The six step-scoped listener capabilities, in dispatch order.
    pub const STEP_LISTENERS: [Capability; 6] = [
        Capability::StepExecutionListener,
        Capability::ChunkListener,
        Capability::ItemReadListener,
        Capability::ItemProcessListener,
        Capability::ItemWriteListener,
        Capability::SkipListener,
    ];

    /// Whether `component` implements this capability.
    pub fn is_provided_by(self, component: &Arc<dyn Component>) -> bool {
        let c = Arc::clone(component);
        match self {
            Capability::Reader => c.as_reader().is_some(),
            Capability::Processor => c.as_processor().is_some(),
            Capability::Writer => c.as_writer().is_some(),
            Capability::Tasklet => c.as_tasklet().is_some(),
            Capability::StepExecutionListener => c.as_step_listener().is_some(),
            Capability::ChunkListener => c.as_chunk_listener().is_some(),
            Capability::ItemReadListener => c.as_read_listener().is_some(),
            Capability::ItemProcessListener => c.as_process_listener().is_some(),
            Capability::ItemWriteListener => c.as_write_listener().is_some(),
            Capability::SkipListener => c.as_skip_listener().is_some(),
            Capability::JobExecutionListener => c.as_job_listener().is_some(),
            Capability::ParametersValidator => c.as_parameters_validator().is_some(),
        }
    }

    /// Listener capability for a declared listener type name.
    pub fn from_listener_type(type_name: &str) -> Option<Self> {
        match type_name {
            "StepExecutionListener" => Some(Capability::StepExecutionListener),
            "ChunkListener" => Some(Capability::ChunkListener),
            "ItemReadListener" => Some(Capability::ItemReadListener),
            "ItemProcessListener" => Some(Capability::ItemProcessListener),
            "ItemWriteListener" => Some(Capability::ItemWriteListener),
            "SkipListener" => Some(Capability::SkipListener),
            "JobExecutionListener" => Some(Capability::JobExecutionListener),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Capability::Reader => "ItemReader",
            Capability::Processor => "ItemProcessor",
            Capability::Writer => "ItemWriter",
            Capability::Tasklet => "Tasklet",
            Capability::StepExecutionListener => "StepExecutionListener",
            Capability::ChunkListener => "ChunkListener",
            Capability::ItemReadListener => "ItemReadListener",
            Capability::ItemProcessListener => "ItemProcessListener",
            Capability::ItemWriteListener => "ItemWriteListener",
            Capability::SkipListener => "SkipListener",
            Capability::JobExecutionListener => "JobExecutionListener",
            Capability::ParametersValidator => "JobParametersValidator",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Both;

    impl StepExecutionListener for Both {}
    impl ChunkListener for Both {}

    impl Component for Both {
        fn name(&self) -> &str {
            "both"
        }

        fn kind(&self) -> &str {
            "Both"
        }

        fn as_step_listener(self: Arc<Self>) -> Option<Arc<dyn StepExecutionListener>> {
            Some(self)
        }

        fn as_chunk_listener(self: Arc<Self>) -> Option<Arc<dyn ChunkListener>> {
            Some(self)
        }
    }

    #[test]
    fn test_capabilities_reflect_overrides() {
        let component: Arc<dyn Component> = Arc::new(Both);
        let provided: Vec<Capability> = Capability::STEP_LISTENERS
            .into_iter()
            .filter(|c| c.is_provided_by(&component))
            .collect();
        assert_eq!(
            provided,
            vec![Capability::StepExecutionListener, Capability::ChunkListener]
        );
        assert!(!Capability::Reader.is_provided_by(&component));
    }

    #[test]
    fn test_listener_type_names_round_trip() {
        for capability in Capability::STEP_LISTENERS {
            assert_eq!(
                Capability::from_listener_type(capability.type_name()),
                Some(capability)
            );
        }
        assert_eq!(Capability::from_listener_type("ItemReader"), None);
    }

    #[test]
    fn test_item_error_display() {
        let err = ItemError::new("TimeoutError", "upstream took too long");
        assert_eq!(err.to_string(), "TimeoutError: upstream took too long");
    }
}
