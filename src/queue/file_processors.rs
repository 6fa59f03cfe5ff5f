//! Per-file metadata discovery for an ingestion job.
//!
//! Each posted file is either a RAR volume, whose stored members are
//! indexed from its headers, or a plain file, whose size comes from the
//! first segment's yEnc header. Nothing beyond those headers is fetched.

use std::sync::Arc;

use nzbdav_common::{paths, Error, Result};
use nzbdav_nntp::NntpClient;
use nzbdav_parser::filename::{choose_file_name, has_plausible_extension, subject_file_name};
use nzbdav_parser::rar;
use nzbdav_parser::{NzbFile, StoredEntry};
use tokio_util::sync::CancellationToken;

use crate::streaming::NzbFileStream;

/// A plain posted file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainFile {
    pub name: String,
    pub segment_ids: Vec<String>,
    pub file_size: u64,
}

/// One RAR volume and the stored member data it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RarVolume {
    pub name: String,
    pub segment_ids: Vec<String>,
    pub part_size: u64,
    pub entries: Vec<StoredEntry>,
}

impl RarVolume {
    /// Sort key placing volumes of a set in reading order.
    pub fn sort_key(&self) -> (String, u32, bool) {
        let (part, bare) = rar::volume_order(&self.name);
        (rar::archive_name(&self.name), part, bare)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedFile {
    Plain(PlainFile),
    RarVolume(RarVolume),
}

/// How a posted file is handled, decided from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Rar,
    Plain,
    Skip,
}

impl FileKind {
    pub fn classify(name: &str) -> Self {
        if rar::is_rar_file(name) {
            Self::Rar
        } else if paths::is_par2_file(name) {
            Self::Skip
        } else {
            Self::Plain
        }
    }
}

/// Best-effort name of a posted file.
///
/// The subject line wins when it yields a name with a plausible extension.
/// Otherwise the first segment's header is consulted.
pub async fn resolve_file_name(
    client: &dyn NntpClient,
    file: &NzbFile,
    cancel: &CancellationToken,
) -> Result<String> {
    let subject_name = subject_file_name(&file.subject);
    if has_plausible_extension(&subject_name) {
        return Ok(subject_name);
    }
    let Some(first) = file.segments.first() else {
        return Ok(subject_name);
    };
    let header = client
        .get_segment_yenc_header(&first.message_id, cancel)
        .await?;
    Ok(choose_file_name(subject_name, header.file_name))
}

/// Size a plain file from its first segment header.
///
/// A missing article is tolerated for anything that is not a video: the
/// file is skipped with a warning.
pub async fn process_plain_file(
    client: Arc<dyn NntpClient>,
    file: NzbFile,
    name: String,
    cancel: CancellationToken,
) -> Result<Option<ProcessedFile>> {
    let segment_ids = file.segment_ids();
    let Some(first) = segment_ids.first() else {
        tracing::warn!(file = %name, "file has no segments, skipping");
        return Ok(None);
    };

    match client.get_segment_yenc_header(first, &cancel).await {
        Ok(header) => Ok(Some(ProcessedFile::Plain(PlainFile {
            name,
            segment_ids,
            file_size: header.file_size,
        }))),
        Err(Error::ArticleNotFound(id)) if !paths::is_video_file(&name) => {
            tracing::warn!(
                file = %name,
                segment = %id,
                "file has missing articles, skipping since it is not a video"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Index the stored members of one RAR volume.
pub async fn process_rar_volume(
    client: Arc<dyn NntpClient>,
    file: NzbFile,
    name: String,
    cancel: CancellationToken,
) -> Result<Option<ProcessedFile>> {
    let segment_ids = file.segment_ids();
    let Some(first_id) = segment_ids.first() else {
        return Err(Error::invalid_archive(format!("volume `{name}` has no segments")));
    };

    let first = client.get_segment_stream(first_id, &cancel).await?;
    let part_size = first.header().file_size;
    let mut volume = NzbFileStream::new(client, segment_ids.clone(), part_size, 1)
        .with_first_segment(first)
        .with_cancellation(&cancel);

    let entries = rar::read_stored_entries(&mut volume).await?;
    tracing::debug!(volume = %name, entries = entries.len(), part_size, "indexed rar volume");

    Ok(Some(ProcessedFile::RarVolume(RarVolume {
        name,
        segment_ids,
        part_size,
        entries,
    })))
}
