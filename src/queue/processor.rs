//! Ingestion of a single queued job.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use nzbdav_common::{DavItemId, DownloadStatus, Error, Result};
use nzbdav_db::models::{DavItem, HistoryItem, QueueItem};
use nzbdav_db::queries::{history, items, queue};
use nzbdav_db::{get_conn, DbPool};
use nzbdav_parser::{parse_nzb, NzbFile};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use super::aggregators;
use super::file_processors::{self, FileKind, ProcessedFile};
use super::validator;
use crate::config::ConfigManager;
use crate::usenet::UsenetStreamingClient;

/// Delay before a job that hit a transient error is tried again.
pub const RETRY_DELAY_SECS: i64 = 60;

/// How a job left the processor.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// The job's folder already existed; recorded as completed.
    Duplicate,
    Failed(String),
    Retrying(DateTime<Utc>),
    /// Stopped by removal or shutdown; the queue row is left as is.
    Cancelled,
}

pub(crate) struct ItemProcessor {
    db: DbPool,
    usenet: Arc<UsenetStreamingClient>,
    config: Arc<ConfigManager>,
    item: QueueItem,
    progress: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl ItemProcessor {
    pub(crate) fn new(
        db: DbPool,
        usenet: Arc<UsenetStreamingClient>,
        config: Arc<ConfigManager>,
        item: QueueItem,
        progress: Arc<AtomicU8>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            usenet,
            config,
            item,
            progress,
            cancel,
        }
    }

    /// Run the job to one of its outcomes, recording it in the database.
    pub(crate) async fn process(self) -> JobOutcome {
        let started = Instant::now();
        tracing::info!(job = %self.item.job_name, id = %self.item.id, "processing queue item");

        match self.ingest(started).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() || self.cancel.is_cancelled() => {
                tracing::info!(job = %self.item.job_name, "queue item processing cancelled");
                JobOutcome::Cancelled
            }
            Err(e) if e.is_non_retryable() => {
                let message = e.to_string();
                tracing::error!(job = %self.item.job_name, error = %message, "queue item failed");
                let recorded = self.with_transaction(|tx| {
                    self.finish(tx, started, DownloadStatus::Failed, Some(message.clone()))
                });
                if let Err(e) = recorded {
                    tracing::error!(job = %self.item.job_name, error = %e, "failed to record job failure");
                }
                JobOutcome::Failed(message)
            }
            Err(e) => {
                let pause_until = Utc::now() + Duration::seconds(RETRY_DELAY_SECS);
                tracing::warn!(
                    job = %self.item.job_name,
                    error = %e,
                    retry_at = %pause_until,
                    "queue item hit an error, will retry"
                );
                let paused = get_conn(&self.db)
                    .and_then(|conn| queue::set_pause_until(&conn, self.item.id, Some(pause_until)));
                if let Err(e) = paused {
                    tracing::error!(job = %self.item.job_name, error = %e, "failed to pause job");
                }
                JobOutcome::Retrying(pause_until)
            }
        }
    }

    async fn ingest(&self, started: Instant) -> Result<JobOutcome> {
        if self.is_duplicate()? {
            tracing::info!(
                job = %self.item.job_name,
                category = %self.item.category,
                "job folder already exists, marking completed"
            );
            self.with_transaction(|tx| self.finish(tx, started, DownloadStatus::Completed, None))?;
            return Ok(JobOutcome::Duplicate);
        }

        let nzb = parse_nzb(self.item.nzb_contents.as_bytes())?;
        let files = self.resolve_names(nzb.files).await?;
        let processed = self.process_files(files).await?;

        self.with_transaction(|tx| {
            let mount = self.create_folders(tx)?;
            let mut entries = aggregators::rar_entries(mount, &processed);
            entries.extend(aggregators::plain_entries(mount, &processed));
            aggregators::ensure_unique_names(&entries)?;
            if self.config.ensure_importable_video() {
                validator::ensure_importable_video(&entries)?;
            }
            items::insert_entries(tx, &entries)?;
            self.finish(tx, started, DownloadStatus::Completed, None)?;
            tracing::info!(
                job = %self.item.job_name,
                entries = entries.len(),
                "queue item completed"
            );
            Ok(())
        })?;
        Ok(JobOutcome::Completed)
    }

    fn is_duplicate(&self) -> Result<bool> {
        let conn = get_conn(&self.db)?;
        let Some(category) = items::get_child(&conn, DavItemId::CONTENT, &self.item.category)?
        else {
            return Ok(false);
        };
        Ok(items::get_child(&conn, category.id, &self.item.job_name)?.is_some())
    }

    /// Name every file, keeping the first file of each name.
    async fn resolve_names(&self, files: Vec<NzbFile>) -> Result<Vec<(NzbFile, String)>> {
        let client = self.usenet.client();
        let cancel = &self.cancel;
        let lookups: Vec<BoxFuture<'_, Result<String>>> = files
            .iter()
            .map(|file| {
                let client = client.clone();
                async move { file_processors::resolve_file_name(client.as_ref(), file, cancel).await }
                    .boxed()
            })
            .collect();
        let names: Vec<String> = stream::iter(lookups)
            .buffered(self.fan_out())
            .try_collect()
            .await?;

        let mut seen = HashSet::new();
        Ok(files
            .into_iter()
            .zip(names)
            .filter(|(_, name)| seen.insert(name.clone()))
            .collect())
    }

    /// Fetch the metadata of every file. The first error cancels the rest.
    async fn process_files(&self, files: Vec<(NzbFile, String)>) -> Result<Vec<ProcessedFile>> {
        let cancel = self.cancel.child_token();
        let _stop_remaining = cancel.clone().drop_guard();
        let client = self.usenet.client();

        let tasks: Vec<BoxFuture<'static, Result<(usize, Option<ProcessedFile>)>>> = files
            .into_iter()
            .filter_map(|(file, name)| match FileKind::classify(&name) {
                FileKind::Skip => {
                    tracing::debug!(file = %name, "skipping recovery file");
                    None
                }
                kind => Some((kind, file, name)),
            })
            .enumerate()
            .map(|(index, (kind, file, name))| {
                let client = client.clone();
                let cancel = cancel.clone();
                async move {
                    let processed = match kind {
                        FileKind::Rar => {
                            file_processors::process_rar_volume(client, file, name, cancel).await
                        }
                        _ => file_processors::process_plain_file(client, file, name, cancel).await,
                    }?;
                    Ok::<_, Error>((index, processed))
                }
                .boxed()
            })
            .collect();

        let total = tasks.len();
        self.progress.store(0, Ordering::Relaxed);
        let mut pending = stream::iter(tasks).buffer_unordered(self.fan_out());
        let mut done = Vec::with_capacity(total);
        while let Some(result) = pending.next().await {
            match result {
                Ok(processed) => {
                    done.push(processed);
                    let percent = done.len() * 100 / total;
                    self.progress.store(percent as u8, Ordering::Relaxed);
                }
                Err(e) => {
                    cancel.cancel();
                    return Err(e);
                }
            }
        }

        done.sort_by_key(|(index, _)| *index);
        Ok(done.into_iter().filter_map(|(_, processed)| processed).collect())
    }

    /// Get or create the category folder, then create the job's folder.
    fn create_folders(&self, conn: &Connection) -> Result<DavItemId> {
        let category = match items::get_child(conn, DavItemId::CONTENT, &self.item.category)? {
            Some(existing) => existing.id,
            None => {
                let folder = DavItem::directory(DavItemId::CONTENT, self.item.category.clone());
                items::insert_item(conn, &folder)?;
                folder.id
            }
        };
        let mount = DavItem::directory(category, self.item.job_name.clone());
        items::insert_item(conn, &mount)?;
        Ok(mount.id)
    }

    /// Move the job from the queue to history.
    fn finish(
        &self,
        conn: &Connection,
        started: Instant,
        status: DownloadStatus,
        fail_message: Option<String>,
    ) -> Result<()> {
        queue::remove_queue_item(conn, self.item.id)?;
        history::insert_history_item(
            conn,
            &HistoryItem {
                id: self.item.id,
                created_at: Utc::now(),
                file_name: self.item.file_name.clone(),
                job_name: self.item.job_name.clone(),
                category: self.item.category.clone(),
                download_status: status,
                total_segment_bytes: self.item.total_segment_bytes,
                download_time_seconds: started.elapsed().as_secs(),
                fail_message,
            },
        )
    }

    fn with_transaction<T>(&self, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = get_conn(&self.db)?;
        let tx = conn.transaction().map_err(|e| Error::database(e.to_string()))?;
        let value = work(&tx)?;
        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        Ok(value)
    }

    fn fan_out(&self) -> usize {
        self.config.usenet_settings().connections
    }
}
