//! Batch scheduling
//!
//! Fixed-width chunking of the corpus: `ceil(n / size)` batches, the last
//! possibly shorter, concatenating back to the corpus in order.

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{Batch, FileRef};

/// Partition `files` into batches of at most `batch_size` entries.
///
/// An empty input yields no batches. A zero batch size is a configuration
/// error.
pub fn create_batches(files: &[FileRef], batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(PipelineError::config("batch_size must be >= 1"));
    }

    let batches: Vec<Batch> = files
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            files: chunk.to_vec(),
        })
        .collect();

    debug!(
        files = files.len(),
        batch_size,
        batches = batches.len(),
        "Created batches"
    );
    Ok(batches)
}
