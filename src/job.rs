//! Progressive indexing jobs.
//!
//! A job holds the normalized rows of a dataset that [`FilterEngine::start_load`]
//! accepted and feeds them to the engine one batch at a time. Queries issued
//! between two steps see exactly the rows indexed so far.
//!
//! A job belongs to one engine generation. Any later `load`, `start_load`
//! or `invalidate_all` trips its abort signal; the next step then returns
//! [`JobStatus::Aborted`] without touching the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::FilterEngine;
use crate::error::Result;
use crate::store::Row;

/// Shared cancellation flag for an in-flight job.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Progress reported by [`IndexJob::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// More batches remain.
    Pending { indexed: usize, total: usize },
    /// Every row is placed and indexed.
    Complete { indexed: usize },
    /// A newer load or an explicit invalidation superseded this job.
    Aborted,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending { .. })
    }
}

#[derive(Debug)]
pub struct IndexJob {
    generation: u64,
    abort: AbortSignal,
    pending: std::vec::IntoIter<Row>,
    indexed: usize,
    total: usize,
    batch_size: usize,
}

impl IndexJob {
    pub(crate) fn new(
        generation: u64,
        abort: AbortSignal,
        rows: Vec<Row>,
        batch_size: usize,
    ) -> Self {
        let total = rows.len();
        Self {
            generation,
            abort,
            pending: rows.into_iter(),
            indexed: 0,
            total,
            // zero would never make progress
            batch_size: batch_size.max(1),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle that cancels this job when tripped.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn indexed(&self) -> usize {
        self.indexed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn is_stale(&self, engine: &FilterEngine) -> bool {
        self.abort.is_aborted() || engine.generation() != self.generation
    }

    /// Place and index the next batch.
    pub fn step(&mut self, engine: &mut FilterEngine) -> Result<JobStatus> {
        if self.is_stale(engine) {
            tracing::debug!(
                generation = self.generation,
                indexed = self.indexed,
                total = self.total,
                "Indexing job aborted"
            );
            return Ok(JobStatus::Aborted);
        }
        if self.indexed >= self.total {
            return Ok(JobStatus::Complete {
                indexed: self.indexed,
            });
        }

        let batch: Vec<Row> = self.pending.by_ref().take(self.batch_size).collect();
        let offset = self.indexed;
        let len = batch.len();
        engine.apply_batch(offset, batch)?;
        self.indexed += len;

        tracing::debug!(
            offset,
            rows = len,
            indexed = self.indexed,
            total = self.total,
            "Indexed batch"
        );

        if self.indexed >= self.total {
            Ok(JobStatus::Complete {
                indexed: self.indexed,
            })
        } else {
            Ok(JobStatus::Pending {
                indexed: self.indexed,
                total: self.total,
            })
        }
    }

    /// Drive the job to completion, yielding to the runtime between batches.
    pub async fn run(mut self, engine: &mut FilterEngine) -> Result<JobStatus> {
        loop {
            let status = self.step(engine)?;
            if status.is_finished() {
                return Ok(status);
            }
            tokio::task::yield_now().await;
        }
    }

    /// Drive the job to completion on the current thread.
    pub fn run_blocking(mut self, engine: &mut FilterEngine) -> Result<JobStatus> {
        loop {
            let status = self.step(engine)?;
            if status.is_finished() {
                return Ok(status);
            }
        }
    }
}
