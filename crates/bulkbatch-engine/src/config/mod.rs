//! Job descriptors, their loading and the engine's own settings.

pub mod descriptor;
pub mod normalize;
pub mod parser;
pub mod settings;
pub mod validate;

pub use descriptor::{
    ComponentDescriptor, JobDescriptor, ListenerDescriptor, RetryPolicy, SkipPolicy,
    StepDescriptor, StepMode, TransactionPolicy, TransitionDescriptor, ValidatorDescriptor,
};
pub use normalize::{normalize, project, project_job};
pub use parser::{load_job_file, parse_job_str, substitute_env_vars};
pub use settings::EngineConfig;
pub use validate::{validate_job, validate_step};
