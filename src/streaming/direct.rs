//! Serving tree entries over HTTP with range requests.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use nzbdav_common::{DavItemId, Error, ItemType, Result};
use nzbdav_db::get_conn;
use nzbdav_db::queries::items;
use nzbdav_stream::{BoxedSeekableStream, ReadStream, SeekableStream};

use crate::server::{AppContext, AppError};

const CHUNK_SIZE: usize = 64 * 1024;

/// Serve an NZB or RAR file entry with range request support.
pub async fn stream_item(
    State(ctx): State<AppContext>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Response, AppError> {
    let id: DavItemId = item_id
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid item id `{item_id}`")))?;

    let (name, mut stream) = open_item(&ctx, id)?;
    let file_size = stream.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| parse_range_header(s, file_size));

    let content_type = determine_content_type(&name);

    let response = match range {
        Some((start, end)) => {
            let length = end - start + 1;
            stream.seek(start)?;
            tracing::debug!(item = %id, start, end, "serving range");

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body_from(stream, length))
        }
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, file_size.to_string())
            .header(header::ACCEPT_RANGES, "bytes")
            .body(body_from(stream, file_size)),
    };
    response.map_err(|e| AppError::from(Error::internal(e.to_string())))
}

/// Look up a file entry and open a stream over it.
fn open_item(ctx: &AppContext, id: DavItemId) -> Result<(String, BoxedSeekableStream)> {
    let conn = get_conn(&ctx.db)?;
    let item = items::get_item(&conn, id)?
        .ok_or_else(|| Error::not_found(format!("item {id}")))?;

    let stream: BoxedSeekableStream = match item.item_type {
        ItemType::NzbFile => {
            let file = items::get_nzb_file(&conn, id)?
                .ok_or_else(|| Error::not_found(format!("segments of {id}")))?;
            Box::new(
                ctx.usenet
                    .file_stream(file.segment_ids, item.file_size.unwrap_or(0)),
            )
        }
        ItemType::RarFile => {
            let file = items::get_rar_file(&conn, id)?
                .ok_or_else(|| Error::not_found(format!("archive parts of {id}")))?;
            Box::new(ctx.usenet.rar_file_stream(file.rar_parts))
        }
        ItemType::Directory | ItemType::SymlinkRoot => {
            return Err(Error::invalid_input(format!("{} is a directory", item.name)));
        }
    };
    Ok((item.name, stream))
}

/// Stream `length` bytes from the current position as a response body.
fn body_from(stream: BoxedSeekableStream, length: u64) -> Body {
    let chunks = futures::stream::try_unfold((stream, length), |(stream, remaining)| {
        next_chunk(stream, remaining)
    });
    Body::from_stream(chunks)
}

async fn next_chunk(
    mut stream: BoxedSeekableStream,
    remaining: u64,
) -> Result<Option<(Bytes, (BoxedSeekableStream, u64))>> {
    if remaining == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; CHUNK_SIZE.min(remaining as usize)];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(Error::unexpected_eof(format!(
            "stream ended with {remaining} bytes left to send"
        )));
    }
    buf.truncate(n);
    Ok(Some((Bytes::from(buf), (stream, remaining - n as u64))))
}

/// Parse HTTP Range header.
///
/// Supports formats:
/// - bytes=0-499
/// - bytes=500-
/// - bytes=-500 (last 500 bytes)
///
/// Returns inclusive `(start, end)`, or `None` when the header is malformed
/// or unsatisfiable.
pub fn parse_range_header(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let header = header.strip_prefix("bytes=")?;
    if file_size == 0 {
        return None;
    }

    let (start, end) = header.split_once('-')?;
    let start = start.trim();
    let end = end.trim();

    match (start.is_empty(), end.is_empty()) {
        // bytes=-500 (last 500 bytes)
        (true, false) => {
            let suffix_len: u64 = end.parse().ok()?;
            if suffix_len == 0 {
                return None;
            }
            let start = file_size.saturating_sub(suffix_len);
            Some((start, file_size - 1))
        }
        // bytes=500- (from 500 to end)
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            if start >= file_size {
                return None;
            }
            Some((start, file_size - 1))
        }
        // bytes=0-499
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            if start >= file_size {
                return None;
            }
            let end = end.min(file_size - 1);
            if start > end {
                return None;
            }
            Some((start, end))
        }
        (true, true) => None,
    }
}

fn determine_content_type(name: &str) -> &'static str {
    match nzbdav_common::paths::extension(name).as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("ts" | "m2ts") => "video/mp2t",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("srt") => "application/x-subrip",
        _ => "application/octet-stream",
    }
}
