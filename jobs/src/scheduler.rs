//! Periodic trigger for the background maintenance worker's scheduled
//! reconcile sweep. Ticks a `tokio::time::interval` and enqueues a dry-run
//! `Reconcile` job each period; the worker (`crate::worker::Worker`) does
//! the actual parity comparison.

use crate::queue::{Job, JobQueue};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct Scheduler {
    queue: Arc<dyn JobQueue>,
    period: Duration,
}

impl Scheduler {
    pub fn new(queue: Arc<dyn JobQueue>, period: Duration) -> Self {
        Self { queue, period }
    }

    /// Runs until the queue is closed. Intended to be spawned as its own
    /// task alongside `Worker::run`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.queue.enqueue(Job::Reconcile { dry_run: true }).await {
                warn!("scheduler could not enqueue reconcile job: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ChannelJobQueue;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn scheduler_enqueues_reconcile_on_every_tick() {
        let (tx, mut rx) = mpsc::channel(8);
        let queue: Arc<dyn JobQueue> = Arc::new(ChannelJobQueue::new(tx));
        let scheduler = Scheduler::new(queue, Duration::from_millis(10));
        let handle = tokio::spawn(scheduler.run());

        tokio::time::advance(Duration::from_millis(35)).await;
        let mut seen = 0;
        while let Ok(job) = rx.try_recv() {
            assert_eq!(job, Job::Reconcile { dry_run: true });
            seen += 1;
        }
        assert!(seen >= 1);
        handle.abort();
    }
}
