//! The ingestion queue and its single in-flight slot.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::Utc;
use nzbdav_common::{Error, PostProcessing, Priority, QueueItemId, Result};
use nzbdav_db::models::QueueItem;
use nzbdav_db::queries::queue;
use nzbdav_db::{get_conn, DbPool};
use nzbdav_parser::parse_nzb;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::processor::{ItemProcessor, JobOutcome};
use crate::config::ConfigManager;
use crate::usenet::UsenetStreamingClient;

/// The job currently being ingested.
struct InFlightJob {
    item: QueueItem,
    progress: Arc<AtomicU8>,
    cancel: CancellationToken,
    finished: watch::Receiver<bool>,
}

/// Snapshot of the in-flight job.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentJob {
    #[serde(flatten)]
    pub item: QueueItem,
    pub progress: u8,
}

/// A job submission.
#[derive(Debug, Clone)]
pub struct NewJob<'a> {
    pub nzb: &'a [u8],
    pub file_name: &'a str,
    pub category: &'a str,
    pub priority: Priority,
    pub post_processing: PostProcessing,
}

pub struct QueueManager {
    db: DbPool,
    usenet: Arc<UsenetStreamingClient>,
    config: Arc<ConfigManager>,
    in_flight: Mutex<Option<InFlightJob>>,
    shutdown: CancellationToken,
}

impl QueueManager {
    pub fn new(db: DbPool, usenet: Arc<UsenetStreamingClient>, config: Arc<ConfigManager>) -> Self {
        Self {
            db,
            usenet,
            config,
            in_flight: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Validate and enqueue an NZB document.
    pub fn add_nzb(&self, job: NewJob<'_>) -> Result<QueueItem> {
        let categories = self.config.categories();
        if !categories.iter().any(|c| c == job.category) {
            return Err(Error::invalid_input(format!(
                "unknown category `{}`, expected one of: {}",
                job.category,
                categories.join(", ")
            )));
        }

        let contents = std::str::from_utf8(job.nzb)
            .map_err(|e| Error::InvalidNzb(format!("document is not valid UTF-8: {e}")))?;
        let nzb = parse_nzb(job.nzb)?;

        let item = QueueItem {
            id: QueueItemId::new(),
            created_at: Utc::now(),
            file_name: job.file_name.to_string(),
            job_name: job_name(job.file_name),
            nzb_contents: contents.to_string(),
            nzb_file_size: job.nzb.len() as u64,
            total_segment_bytes: nzb.total_segment_bytes(),
            category: job.category.to_string(),
            priority: match job.priority {
                Priority::Default => Priority::Normal,
                other => other,
            },
            post_processing: job.post_processing,
            pause_until: None,
        };

        let conn = get_conn(&self.db)?;
        queue::insert_queue_item(&conn, &item)?;
        tracing::info!(
            id = %item.id,
            job = %item.job_name,
            category = %item.category,
            priority = %item.priority,
            files = nzb.files.len(),
            "queued nzb"
        );
        Ok(item)
    }

    /// Remove a job, cancelling it first if it is being processed.
    ///
    /// Returns whether a queue row was deleted.
    pub async fn remove_queue_item(&self, id: QueueItemId) -> Result<bool> {
        let slot = self.in_flight.lock().await;
        if let Some(job) = slot.as_ref().filter(|job| job.item.id == id) {
            tracing::info!(id = %id, job = %job.item.job_name, "cancelling in-flight job");
            cancel_and_wait(job).await;
        }
        let conn = get_conn(&self.db)?;
        let removed = queue::remove_queue_item(&conn, id)?;
        drop(slot);
        if removed {
            tracing::info!(id = %id, "removed queue item");
        }
        Ok(removed)
    }

    /// The in-flight job and its progress in percent.
    pub async fn current(&self) -> Option<CurrentJob> {
        self.in_flight.lock().await.as_ref().map(|job| CurrentJob {
            item: job.item.clone(),
            progress: job.progress.load(Ordering::Relaxed),
        })
    }

    /// Process the next eligible job, if any, to completion.
    ///
    /// Returns `None` when nothing was ready to run.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }
        let next = {
            let conn = get_conn(&self.db)?;
            queue::next_queue_item(&conn, Utc::now())?
        };
        let Some(item) = next else {
            return Ok(None);
        };

        let progress = Arc::new(AtomicU8::new(0));
        let cancel = self.shutdown.child_token();
        let (finished_tx, finished) = watch::channel(false);
        let claimed = self
            .try_set_in_flight(InFlightJob {
                item: item.clone(),
                progress: progress.clone(),
                cancel: cancel.clone(),
                finished,
            })
            .await?;
        if !claimed {
            return Ok(None);
        }

        let id = item.id;
        let outcome = ItemProcessor::new(
            self.db.clone(),
            self.usenet.clone(),
            self.config.clone(),
            item,
            progress,
            cancel,
        )
        .process()
        .await;

        finished_tx.send_replace(true);
        self.clear_in_flight(id).await;
        Ok(Some(outcome))
    }

    /// Cancel the in-flight job, if any, and stop taking new ones.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let slot = self.in_flight.lock().await;
        if let Some(job) = slot.as_ref() {
            cancel_and_wait(job).await;
        }
    }

    /// Claim the slot for `job` if it is free and the job is still queued.
    ///
    /// The row is re-read under the slot lock: a removal either deletes it
    /// before this check or finds the job in flight and cancels it.
    async fn try_set_in_flight(&self, job: InFlightJob) -> Result<bool> {
        let mut slot = self.in_flight.lock().await;
        if slot.is_some() {
            return Ok(false);
        }
        let still_queued = {
            let conn = get_conn(&self.db)?;
            queue::get_queue_item(&conn, job.item.id)?.is_some()
        };
        if !still_queued {
            tracing::debug!(id = %job.item.id, job = %job.item.job_name, "job removed before it started");
            return Ok(false);
        }
        *slot = Some(job);
        Ok(true)
    }

    async fn clear_in_flight(&self, id: QueueItemId) {
        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|job| job.item.id == id) {
            *slot = None;
        }
    }
}

/// Cancel `job` and wait until its processor has returned.
async fn cancel_and_wait(job: &InFlightJob) {
    job.cancel.cancel();
    let mut finished = job.finished.clone();
    // A dropped sender means the processor is gone too.
    let _ = finished.wait_for(|done| *done).await;
}

/// The job name for a submitted file: its name without a `.nzb` extension.
fn job_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.eq_ignore_ascii_case("nzb") => stem.to_string(),
        _ => file_name.to_string(),
    }
}
