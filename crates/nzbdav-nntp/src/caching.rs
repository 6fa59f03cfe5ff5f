//! Header-memoizing client decorator.
//!
//! Seeking and health checks consult the same segment headers many times;
//! caching them avoids a full segment fetch per lookup.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nzbdav_common::Result;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{NntpClient, SegmentStream};
use crate::yenc::YencHeader;

/// Default number of cached headers.
pub const DEFAULT_MAX_ENTRIES: usize = 8192;

/// Default sliding expiration of a cached header.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

struct CacheEntry {
    header: YencHeader,
    last_accessed: Instant,
}

/// Thread-safe cache of segment headers with sliding expiration.
pub struct HeaderCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl HeaderCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            ttl,
        }
    }

    /// Get a header, refreshing its expiration.
    pub fn get(&self, segment_id: &str) -> Option<YencHeader> {
        if let Some(mut entry) = self.entries.get_mut(segment_id) {
            if entry.last_accessed.elapsed() < self.ttl {
                entry.last_accessed = Instant::now();
                return Some(entry.header.clone());
            }
            drop(entry);
            self.entries.remove(segment_id);
        }
        None
    }

    pub fn insert(&self, segment_id: &str, header: YencHeader) {
        if !self.entries.contains_key(segment_id) && self.entries.len() >= self.max_entries {
            self.cleanup_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            segment_id.to_string(),
            CacheEntry {
                header,
                last_accessed: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_accessed) < self.ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl Default for HeaderCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

/// Wraps a client and remembers every segment header it sees.
pub struct CachingClient<C> {
    inner: C,
    headers: HeaderCache,
}

impl<C: NntpClient> CachingClient<C> {
    pub fn new(inner: C) -> Self {
        Self::with_cache(inner, HeaderCache::default())
    }

    pub fn with_cache(inner: C, headers: HeaderCache) -> Self {
        Self { inner, headers }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn cache(&self) -> &HeaderCache {
        &self.headers
    }
}

#[async_trait]
impl<C: NntpClient> NntpClient for CachingClient<C> {
    async fn stat(&self, segment_id: &str, cancel: &CancellationToken) -> Result<bool> {
        self.inner.stat(segment_id, cancel).await
    }

    async fn date(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        self.inner.date(cancel).await
    }

    async fn get_segment_stream(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream> {
        let stream = self.inner.get_segment_stream(segment_id, cancel).await?;
        self.headers.insert(segment_id, stream.header().clone());
        Ok(stream)
    }

    async fn get_segment_yenc_header(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<YencHeader> {
        if let Some(header) = self.headers.get(segment_id) {
            return Ok(header);
        }
        let header = self.inner.get_segment_yenc_header(segment_id, cancel).await?;
        self.headers.insert(segment_id, header.clone());
        Ok(header)
    }

    async fn wait_for_ready(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.wait_for_ready(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryClient;

    fn header(offset: u64) -> YencHeader {
        YencHeader {
            file_name: "a.bin".into(),
            file_size: 1000,
            line_length: 128,
            part_number: 1,
            total_parts: 1,
            part_offset: offset,
            part_size: 10,
        }
    }

    #[tokio::test]
    async fn test_repeated_header_lookups_hit_cache() {
        let mut memory = MemoryClient::new();
        let ids = memory.add_file("a.mkv", &[7u8; 1000], 100);
        let client = CachingClient::new(memory);
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            let h = client.get_segment_yenc_header(&ids[3], &cancel).await.unwrap();
            assert_eq!(h.part_offset, 300);
        }
        assert_eq!(client.inner().fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_segment_fetch_populates_cache() {
        let mut memory = MemoryClient::new();
        let ids = memory.add_file("a.mkv", &[7u8; 1000], 100);
        let client = CachingClient::new(memory);
        let cancel = CancellationToken::new();

        drop(client.get_segment_stream(&ids[0], &cancel).await.unwrap());
        client.get_segment_yenc_header(&ids[0], &cancel).await.unwrap();
        assert_eq!(client.inner().fetch_count(), 1);
        assert_eq!(client.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = HeaderCache::new(2, DEFAULT_TTL);
        cache.insert("a", header(0));
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("b", header(10));
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(cache.get("a").is_some());
        cache.insert("c", header(20));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiration() {
        let cache = HeaderCache::new(10, Duration::from_secs(60));
        cache.insert("a", header(0));
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(cache.get("a").is_some());
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(cache.get("a").is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }
}
