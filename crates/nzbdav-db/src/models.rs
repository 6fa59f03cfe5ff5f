//! Rust models matching the database schema.

use chrono::{DateTime, Utc};
use nzbdav_common::{
    DavItemId, DownloadStatus, ItemType, PostProcessing, Priority, QueueItemId, RarPart,
};
use serde::{Deserialize, Serialize};

/// A node of the served directory tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DavItem {
    pub id: DavItemId,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<DavItemId>,
    pub name: String,
    pub file_size: Option<u64>,
    pub item_type: ItemType,
}

impl DavItem {
    pub fn directory(parent_id: DavItemId, name: impl Into<String>) -> Self {
        Self::new(parent_id, name, None, ItemType::Directory)
    }

    pub fn nzb_file(parent_id: DavItemId, name: impl Into<String>, file_size: u64) -> Self {
        Self::new(parent_id, name, Some(file_size), ItemType::NzbFile)
    }

    pub fn rar_file(parent_id: DavItemId, name: impl Into<String>, file_size: u64) -> Self {
        Self::new(parent_id, name, Some(file_size), ItemType::RarFile)
    }

    fn new(
        parent_id: DavItemId,
        name: impl Into<String>,
        file_size: Option<u64>,
        item_type: ItemType,
    ) -> Self {
        Self {
            id: DavItemId::new(),
            created_at: Utc::now(),
            parent_id: Some(parent_id),
            name: name.into(),
            file_size,
            item_type,
        }
    }
}

/// Segments backing a plain file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DavNzbFile {
    pub id: DavItemId,
    pub segment_ids: Vec<String>,
}

/// Volume windows backing an archive member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DavRarFile {
    pub id: DavItemId,
    pub rar_parts: Vec<RarPart>,
}

/// One row to create in a batch insert.
#[derive(Debug, Clone, PartialEq)]
pub enum NewEntry {
    Directory(DavItem),
    NzbFile(DavItem, Vec<String>),
    RarFile(DavItem, Vec<RarPart>),
}

impl NewEntry {
    pub fn item(&self) -> &DavItem {
        match self {
            Self::Directory(item) | Self::NzbFile(item, _) | Self::RarFile(item, _) => item,
        }
    }
}

/// A job waiting for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    pub job_name: String,
    #[serde(skip_serializing, default)]
    pub nzb_contents: String,
    pub nzb_file_size: u64,
    pub total_segment_bytes: u64,
    pub category: String,
    pub priority: Priority,
    pub post_processing: PostProcessing,
    pub pause_until: Option<DateTime<Utc>>,
}

/// The recorded outcome of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryItem {
    pub id: QueueItemId,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    pub job_name: String,
    pub category: String,
    pub download_status: DownloadStatus,
    pub total_segment_bytes: u64,
    pub download_time_seconds: u64,
    pub fail_message: Option<String>,
}
