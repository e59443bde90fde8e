//! Step- and job-scoped listener capabilities.
//!
//! All callbacks default to no-ops so an implementation only overrides
//! the events it cares about.

use crate::component::{Item, ItemError};
use crate::history::JobExecution;

/// Snapshot of a running or finished step, as seen by listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepExecution {
    pub step_name: String,
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub skip_count: u64,
    pub commit_count: u64,
    pub exit_status: String,
}

impl StepExecution {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            exit_status: crate::component::exit_status::EXECUTING.to_string(),
            ..Self::default()
        }
    }
}

/// Position of the chunk currently being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkContext {
    pub step_name: String,
    /// 1-based; the commit count of the step plus one.
    pub chunk_number: u64,
}

pub trait StepExecutionListener: Send + Sync {
    fn before_step(&self, _execution: &StepExecution) {}

    /// May return a replacement exit status.
    fn after_step(&self, _execution: &StepExecution) -> Option<String> {
        None
    }
}

pub trait ChunkListener: Send + Sync {
    fn before_chunk(&self, _context: &ChunkContext) {}

    fn after_chunk(&self, _context: &ChunkContext) {}

    fn after_chunk_error(&self, _context: &ChunkContext) {}
}

pub trait ItemReadListener: Send + Sync {
    fn before_read(&self) {}

    fn after_read(&self, _item: &Item) {}

    fn on_read_error(&self, _error: &ItemError) {}
}

pub trait ItemProcessListener: Send + Sync {
    fn before_process(&self, _item: &Item) {}

    fn after_process(&self, _item: &Item, _result: Option<&Item>) {}

    fn on_process_error(&self, _item: &Item, _error: &ItemError) {}
}

pub trait ItemWriteListener: Send + Sync {
    fn before_write(&self, _items: &[Item]) {}

    fn after_write(&self, _items: &[Item]) {}

    fn on_write_error(&self, _error: &ItemError, _items: &[Item]) {}
}

pub trait SkipListener: Send + Sync {
    fn on_skip_in_read(&self, _error: &ItemError) {}

    fn on_skip_in_process(&self, _item: &Item, _error: &ItemError) {}

    fn on_skip_in_write(&self, _item: &Item, _error: &ItemError) {}
}

pub trait JobExecutionListener: Send + Sync {
    fn before_job(&self, _execution: &JobExecution) {}

    fn after_job(&self, _execution: &JobExecution) {}
}
