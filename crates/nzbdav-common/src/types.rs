//! Enums and value types shared by the database, queue, and streaming layers.
//!
//! Enum discriminants are the values persisted in SQLite and accepted by the
//! queue API, so they must never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of directory tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// A plain directory.
    Directory = 1,
    /// The root of the completed-symlinks tree.
    SymlinkRoot = 2,
    /// A file backed directly by usenet segments.
    NzbFile = 3,
    /// A file stored inside one or more RAR volumes.
    RarFile = 4,
}

impl ItemType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Directory),
            2 => Some(Self::SymlinkRoot),
            3 => Some(Self::NzbFile),
            4 => Some(Self::RarFile),
            _ => None,
        }
    }

    /// Whether nodes of this type can have children.
    pub fn is_directory(self) -> bool {
        matches!(self, Self::Directory | Self::SymlinkRoot)
    }
}

/// Scheduling priority of a queued job. Higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Default = -100,
    Duplicate = -3,
    Paused = -2,
    Low = -1,
    Normal = 0,
    High = 1,
    Force = 2,
}

impl Priority {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -100 => Some(Self::Default),
            -3 => Some(Self::Duplicate),
            -2 => Some(Self::Paused),
            -1 => Some(Self::Low),
            0 => Some(Self::Normal),
            1 => Some(Self::High),
            2 => Some(Self::Force),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Paused => write!(f, "paused"),
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Force => write!(f, "force"),
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    /// Accepts either the lowercase name or the numeric value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.trim().to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "duplicate" => Some(Self::Duplicate),
            "paused" => Some(Self::Paused),
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "force" => Some(Self::Force),
            other => other.parse::<i64>().ok().and_then(Self::from_i64),
        };
        parsed.ok_or_else(|| Error::invalid_input(format!("unknown priority `{s}`")))
    }
}

/// Post-processing mode requested at submission. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessing {
    Default = -1,
    None = 0,
    Repair = 1,
    RepairUnpack = 2,
    RepairUnpackDelete = 3,
}

impl PostProcessing {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::Default),
            0 => Some(Self::None),
            1 => Some(Self::Repair),
            2 => Some(Self::RepairUnpack),
            3 => Some(Self::RepairUnpackDelete),
            _ => None,
        }
    }
}

impl FromStr for PostProcessing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .ok()
            .and_then(Self::from_i64)
            .ok_or_else(|| Error::invalid_input(format!("unknown post-processing mode `{s}`")))
    }
}

/// Final outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Completed = 1,
    Failed = 2,
}

impl DownloadStatus {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Completed),
            2 => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One window of an archive member inside a single RAR volume.
///
/// `segment_ids` and `part_size` describe the whole volume; `offset` and
/// `byte_count` locate the member's stored bytes inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RarPart {
    pub segment_ids: Vec<String>,
    pub part_size: u64,
    pub offset: u64,
    pub byte_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_values() {
        assert_eq!(ItemType::Directory.as_i64(), 1);
        assert_eq!(ItemType::RarFile.as_i64(), 4);
        assert_eq!(ItemType::from_i64(2), Some(ItemType::SymlinkRoot));
        assert_eq!(ItemType::from_i64(9), None);
        assert!(ItemType::SymlinkRoot.is_directory());
        assert!(!ItemType::NzbFile.is_directory());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Force > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::Low > Priority::Paused);
        assert!(Priority::Paused > Priority::Duplicate);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("Force".parse::<Priority>().unwrap(), Priority::Force);
        assert_eq!("-1".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
        assert!("7".parse::<Priority>().is_err());
    }

    #[test]
    fn test_post_processing_parse() {
        assert_eq!(
            "3".parse::<PostProcessing>().unwrap(),
            PostProcessing::RepairUnpackDelete
        );
        assert!("x".parse::<PostProcessing>().is_err());
    }

    #[test]
    fn test_download_status() {
        assert_eq!(DownloadStatus::from_i64(1), Some(DownloadStatus::Completed));
        assert_eq!(DownloadStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_rar_part_json_shape() {
        let part = RarPart {
            segment_ids: vec!["a@b".into()],
            part_size: 100,
            offset: 20,
            byte_count: 80,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["segment_ids"][0], "a@b");
        assert_eq!(json["byte_count"], 80);
    }
}
