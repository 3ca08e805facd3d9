//! The job envelope and its queue: a `Job`/`JobQueue`/`ChannelJobQueue`
//! shape covering the two maintenance jobs this system actually runs:
//! post-batch checkpoints and scheduled vector-index reconcile sweeps.

use archivist_core::error::{CoreError, ErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Job {
    /// Flush the WAL-journaled state to an on-disk snapshot so restart
    /// replay has a recent starting point.
    Checkpoint,
    /// Compare C1's `ready_for_embedding`/`embedding_generated` ids against
    /// what C5 actually holds, deleting orphans unless `dry_run`.
    Reconcile { dry_run: bool },
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job queue is closed")]
    Closed,
}

impl CoreError for JobQueueError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Unavailable
    }
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), JobQueueError>;
}

/// In-memory queue using a Tokio mpsc channel.
pub struct ChannelJobQueue {
    sender: mpsc::Sender<Job>,
}

impl ChannelJobQueue {
    pub fn new(sender: mpsc::Sender<Job>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), JobQueueError> {
        self.sender.send(job).await.map_err(|_| JobQueueError::Closed)
    }
}

/// Triggers a `Checkpoint` job once an ingestion batch has crossed
/// `threshold` rows — large batches need a fresh checkpoint afterward.
pub async fn maybe_checkpoint_after_batch(
    queue: &dyn JobQueue,
    batch_rows: usize,
    threshold: usize,
) -> Result<(), JobQueueError> {
    if batch_rows >= threshold {
        queue.enqueue(Job::Checkpoint).await?;
    }
    Ok(())
}
