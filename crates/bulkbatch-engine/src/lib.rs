//! BulkBatch Assembly Engine
//!
//! Compiles declarative batch job descriptors into validated, executable
//! step graphs.
//!
//! This crate provides:
//! - Job file loading with `${VAR}` substitution and integer-keyed map normalization
//! - Component registry with named instances, typed builders and steplets
//! - Step assembly (chunk and tasklet steps, listeners, fault tolerance)
//! - Flow graph construction with exit-status pattern routing
//! - Built-in flat-file and JDBC components with dialect paging
//! - Run-id incrementer, job history and the launch seam
//!
//! ```ignore
//! use std::sync::Arc;
//! use bulkbatch_engine::{builtins, config, JobAssembler};
//!
//! let registry = Arc::new(builtins::create_default_registry());
//! let job = config::load_job_file(path, "bulk.batch-job")?;
//! let executable = JobAssembler::new(registry).assemble(&job)?;
//! ```

pub mod builtins;
pub mod component;
pub mod config;
pub mod error;
pub mod flow;
pub mod history;
pub mod incrementer;
pub mod job;
pub mod launch;
pub mod params;
pub mod registry;
pub mod resolve;
pub mod result_ext;
pub mod step;

pub use config::{EngineConfig, JobDescriptor, StepDescriptor};
pub use error::{AssemblyError, AssemblyResult};
pub use flow::{build_flow, ExecutionGraph, FlowCursor, FlowDecision, FlowEdge, FlowTarget};
pub use history::{BatchStatus, InMemoryJobExplorer, JobExecution, JobExplorer};
pub use incrementer::{RunIdIncrementer, RUN_ID_KEY};
pub use job::{AssemblyReport, ExecutableJob, JobAssembler};
pub use launch::{ExecutionResult, JobExecutor, JobLauncher, LaunchError};
pub use params::{JobParameter, JobParameters, ParametersError};
pub use registry::{ComponentRegistry, Role, TypeSpec};
pub use resolve::{Provenance, ResolvedComponent};
pub use result_ext::ResultExt;
pub use step::{ExecutableStep, StepAssembler, Steplet};
