//! In-memory client for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use nzbdav_common::{Error, Result};
use nzbdav_stream::MemoryStream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::{NntpClient, SegmentStream};
use crate::yenc::YencHeader;

struct Article {
    header: YencHeader,
    data: Bytes,
}

/// Serves articles from memory and records which ones were fetched.
#[derive(Default)]
pub struct MemoryClient {
    articles: HashMap<String, Article>,
    fetched: Mutex<Vec<String>>,
    stats: AtomicUsize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `data` into segments of `segment_size` bytes and store them.
    /// Returns the segment ids in order.
    pub fn add_file(&mut self, name: &str, data: &[u8], segment_size: usize) -> Vec<String> {
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![&[][..]]
        } else {
            data.chunks(segment_size.max(1)).collect()
        };
        let total = chunks.len() as u32;
        let mut offset = 0u64;
        let mut ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            let id = format!("{name}.{}@memory", i + 1);
            let header = YencHeader {
                file_name: name.to_string(),
                file_size: data.len() as u64,
                line_length: 128,
                part_number: i as u32 + 1,
                total_parts: total,
                part_offset: offset,
                part_size: chunk.len() as u64,
            };
            offset += chunk.len() as u64;
            self.add_segment(&id, header, chunk.to_vec());
            ids.push(id);
        }
        ids
    }

    /// Store a single segment with an arbitrary header.
    pub fn add_segment(&mut self, id: &str, header: YencHeader, data: Vec<u8>) {
        self.articles.insert(
            id.to_string(),
            Article {
                header,
                data: Bytes::from(data),
            },
        );
    }

    /// Forget a segment so that fetching it reports a missing article.
    pub fn remove_segment(&mut self, id: &str) {
        self.articles.remove(id);
    }

    /// Number of segment fetches, header-only lookups included.
    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }

    /// Ids of fetched segments, in fetch order.
    pub fn fetched_ids(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    pub fn stat_count(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.fetched.lock().clear();
        self.stats.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl NntpClient for MemoryClient {
    async fn stat(&self, segment_id: &str, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.stats.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.articles.contains_key(segment_id))
    }

    async fn date(&self, _cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| Error::internal("invalid fixed date"))
    }

    async fn get_segment_stream(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::task::yield_now().await;
        self.fetched.lock().push(segment_id.to_string());
        let article = self
            .articles
            .get(segment_id)
            .ok_or_else(|| Error::ArticleNotFound(segment_id.to_string()))?;
        Ok(SegmentStream::new(
            article.header.clone(),
            Box::new(MemoryStream::new(article.data.clone())),
        ))
    }

    async fn wait_for_ready(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}
