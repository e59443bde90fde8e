//! Step and chunk lifecycle logging, attached to every assembled step.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::component::{
    ChunkContext, ChunkListener, Component, StepExecution, StepExecutionListener,
};

pub const TRACING_LISTENER_NAME: &str = "stepTracingListener";

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStepListener;

impl StepExecutionListener for TracingStepListener {
    fn before_step(&self, execution: &StepExecution) {
        info!(step = %execution.step_name, "Step started");
    }

    fn after_step(&self, execution: &StepExecution) -> Option<String> {
        info!(
            step = %execution.step_name,
            read = execution.read_count,
            written = execution.write_count,
            filtered = execution.filter_count,
            skipped = execution.skip_count,
            commits = execution.commit_count,
            exit_status = %execution.exit_status,
            "Step finished"
        );
        None
    }
}

impl ChunkListener for TracingStepListener {
    fn before_chunk(&self, context: &ChunkContext) {
        debug!(step = %context.step_name, chunk = context.chunk_number, "Chunk started");
    }

    fn after_chunk(&self, context: &ChunkContext) {
        debug!(step = %context.step_name, chunk = context.chunk_number, "Chunk committed");
    }

    fn after_chunk_error(&self, context: &ChunkContext) {
        warn!(step = %context.step_name, chunk = context.chunk_number, "Chunk rolled back");
    }
}

impl Component for TracingStepListener {
    fn name(&self) -> &str {
        TRACING_LISTENER_NAME
    }

    fn kind(&self) -> &str {
        "TracingStepListener"
    }

    fn as_step_listener(self: Arc<Self>) -> Option<Arc<dyn StepExecutionListener>> {
        Some(self)
    }

    fn as_chunk_listener(self: Arc<Self>) -> Option<Arc<dyn ChunkListener>> {
        Some(self)
    }
}
