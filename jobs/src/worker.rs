//! The maintenance worker: drains `Job`s off a channel and runs them
//! against the content store and vector index, in a channel-loop shape
//! (construct with a receiver + the repo it operates on, `run` consumes
//! `self` and logs start/stop).

use crate::queue::Job;
use std::sync::Arc;
use storage::repo::Repository;
use storage::vector_index::VectorIndexAdapter;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct Worker {
    receiver: mpsc::Receiver<Job>,
    repo: Arc<Repository>,
    vector_index: Arc<VectorIndexAdapter>,
}

impl Worker {
    pub fn new(
        receiver: mpsc::Receiver<Job>,
        repo: Arc<Repository>,
        vector_index: Arc<VectorIndexAdapter>,
    ) -> Self {
        Self {
            receiver,
            repo,
            vector_index,
        }
    }

    pub async fn run(mut self) {
        info!("maintenance worker started");
        while let Some(job) = self.receiver.recv().await {
            match job {
                Job::Checkpoint => {
                    info!("processing checkpoint job");
                    if let Err(e) = self.repo.checkpoint().await {
                        warn!("checkpoint failed: {}", e);
                    }
                }
                Job::Reconcile { dry_run } => {
                    info!(dry_run, "processing reconcile job");
                    self.process_reconcile(dry_run).await;
                }
            }
        }
        info!("maintenance worker stopped");
    }

    async fn process_reconcile(&self, dry_run: bool) {
        let expected_ids = self.repo.ids_flagged_ready_or_embedded().await;
        let report = self.vector_index.reconcile(&expected_ids, dry_run);
        if report.delta == 0 {
            info!("reconcile found no parity drift");
            return;
        }
        warn!(
            missing = report.missing_in_index.len(),
            orphaned = report.orphan_in_index.len(),
            dry_run,
            "reconcile found parity drift"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storage::vector_index::VectorIndexConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn checkpoint_job_invokes_repo_checkpoint_without_panicking() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            Repository::open(dir.path().join("c.wal"), Duration::from_secs(5))
                .await
                .unwrap()
                .with_snapshot_dir(dir.path()),
        );
        let index = Arc::new(VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "embedding-default-v1".into(),
            dimension: 8,
            timeout: Duration::from_millis(500),
            disabled: false,
            test_mode: true,
            allow_empty_collection: true,
            delta_threshold: 0,
        }));

        let (tx, rx) = mpsc::channel(4);
        let worker = Worker::new(rx, repo.clone(), index);
        let handle = tokio::spawn(worker.run());

        tx.send(Job::Checkpoint).await.unwrap();
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_job_runs_to_completion_with_no_drift() {
        let dir = tempdir().unwrap();
        let repo = Arc::new(
            Repository::open(dir.path().join("c.wal"), Duration::from_secs(5))
                .await
                .unwrap(),
        );
        let index = Arc::new(VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "embedding-default-v1".into(),
            dimension: 8,
            timeout: Duration::from_millis(500),
            disabled: false,
            test_mode: true,
            allow_empty_collection: true,
            delta_threshold: 0,
        }));

        let (tx, rx) = mpsc::channel(4);
        let worker = Worker::new(rx, repo, index);
        let handle = tokio::spawn(worker.run());

        tx.send(Job::Reconcile { dry_run: true }).await.unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
