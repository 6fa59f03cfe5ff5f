use nzbdav::queue::{JobOutcome, QueueManager};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How long to wait before polling again when no job is ready.
const IDLE_POLL: tokio::time::Duration = tokio::time::Duration::from_secs(5);

/// Background task that feeds queued jobs to the ingestion pipeline
pub struct JobProcessor {
    queue: Arc<QueueManager>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl JobProcessor {
    pub fn new(queue: Arc<QueueManager>, shutdown_rx: mpsc::Receiver<()>) -> Self {
        Self { queue, shutdown_rx }
    }

    /// Start processing jobs from the queue
    pub async fn run(mut self) {
        tracing::info!("Job processor started");

        loop {
            let idle = match self.queue.process_next().await {
                Ok(Some(outcome)) => {
                    log_outcome(&outcome);
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    tracing::error!("Failed to fetch next queue item: {}", e);
                    true
                }
            };

            let wait = if idle {
                IDLE_POLL
            } else {
                tokio::time::Duration::ZERO
            };

            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Job processor shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn log_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed | JobOutcome::Duplicate => {
            tracing::debug!(?outcome, "job finished")
        }
        JobOutcome::Failed(reason) => tracing::debug!(%reason, "job moved to history as failed"),
        JobOutcome::Retrying(at) => tracing::debug!(retry_at = %at, "job paused"),
        JobOutcome::Cancelled => tracing::debug!("job cancelled"),
    }
}
