//! Iteration controller
//!
//! ```text
//! READY → SELECTING → PROCESSING → MERGING → (SELECTING | DONE)
//!                 └──────────────┴─────────→ ABORTED
//! ```
//!
//! The halt signal and the iteration ceiling are both checked at SELECTING,
//! so an in-flight batch always completes first.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::processor::ProcessBatch;
use crate::store::SummaryStore;
use crate::types::Batch;

/// Default hard ceiling on loop iterations
pub const DEFAULT_ITERATION_CEILING: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Ready,
    Selecting,
    Processing,
    Merging,
    Done,
    Aborted,
}

impl ControllerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub iterations: usize,
    /// Indices of batches that finished with warnings
    pub batches_with_warnings: Vec<usize>,
    pub files_missing_summary: usize,
}

pub struct IterationController {
    queue: VecDeque<Batch>,
    ceiling: usize,
    iterations: usize,
    state: ControllerState,
    halt: CancellationToken,
}

impl IterationController {
    pub fn new(batches: Vec<Batch>, ceiling: usize) -> Self {
        Self {
            queue: batches.into(),
            ceiling,
            iterations: 0,
            state: ControllerState::Ready,
            halt: CancellationToken::new(),
        }
    }

    /// Use an externally owned halt signal
    pub fn with_halt(mut self, halt: CancellationToken) -> Self {
        self.halt = halt;
        self
    }

    /// Handle that stops the loop at the next SELECTING step
    pub fn halt_handle(&self) -> CancellationToken {
        self.halt.clone()
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Drive every queued batch through `processor`, merging into `store`.
    pub async fn run<P: ProcessBatch + ?Sized>(
        &mut self,
        processor: &P,
        store: &mut SummaryStore,
    ) -> Result<RunReport> {
        if self.state.is_terminal() {
            return Err(PipelineError::config("iteration controller already finished"));
        }

        let total = self.queue.len();
        let mut report = RunReport::default();
        info!(batches = total, ceiling = self.ceiling, "Starting batch loop");

        loop {
            self.state = ControllerState::Selecting;

            if self.halt.is_cancelled() {
                warn!(iterations = self.iterations, remaining = self.queue.len(), "Halt requested");
                return Err(self.abort(PipelineError::Halted {
                    iterations: self.iterations,
                }));
            }

            let Some(batch) = self.queue.pop_front() else {
                self.state = ControllerState::Done;
                report.iterations = self.iterations;
                info!(iterations = self.iterations, "All batches processed");
                return Ok(report);
            };

            self.iterations += 1;
            if self.iterations > self.ceiling {
                return Err(self.abort(PipelineError::IterationCeilingExceeded {
                    ceiling: self.ceiling,
                }));
            }

            self.state = ControllerState::Processing;
            info!(
                iteration = self.iterations,
                batch = batch.index,
                files = batch.files.len(),
                total,
                "Processing batch"
            );
            let result = match processor.process(&batch).await {
                Ok(result) => result,
                Err(err) => {
                    return Err(self.abort(PipelineError::BatchFailed {
                        index: batch.index,
                        source: Box::new(err),
                    }));
                }
            };

            self.state = ControllerState::Merging;
            if result.has_warnings() {
                report.batches_with_warnings.push(batch.index);
            }
            report.files_missing_summary += result.missing.len();
            store.merge(result);
        }
    }

    fn abort(&mut self, err: PipelineError) -> PipelineError {
        self.state = ControllerState::Aborted;
        error!(
            iteration = self.iterations,
            category = err.category().as_str(),
            error = %err,
            "Batch loop aborted"
        );
        err
    }
}
