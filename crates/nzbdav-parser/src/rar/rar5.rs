//! RAR 5.x headers.

use nzbdav_common::{Error, Result};
use nzbdav_stream::SeekableStream;

use super::reader::{read_vint, HeaderReader};
use super::{member_path, offset_after, read_header_bytes, seek_within, StoredEntry};

/// Header crc plus the longest header-size vint RAR writes.
const HEADER_PREFIX_SIZE: u64 = 4 + 3;
/// Smallest complete header: crc, size, type, flags and one body byte.
const MIN_HEADER_SIZE: u64 = 8;
/// Smallest file header carrying a one-byte name and a data size.
const MIN_FILE_HEADER_SIZE: u64 = 15;

const MAIN_HEADER: u64 = 1;
const FILE_HEADER: u64 = 2;
const SERVICE_HEADER: u64 = 3;
const ENCRYPTION_HEADER: u64 = 4;
const END_HEADER: u64 = 5;

const HAS_EXTRA_AREA: u64 = 0x01;
const HAS_DATA_AREA: u64 = 0x02;

const FILE_DIRECTORY: u64 = 0x01;
const FILE_HAS_MTIME: u64 = 0x02;
const FILE_HAS_CRC: u64 = 0x04;

const EXTRA_ENCRYPTION: u64 = 0x01;

struct Header {
    kind: u64,
    data_size: u64,
    /// Type-specific fields.
    body: Vec<u8>,
    /// Extra records, split off the end of the header.
    extra: Vec<u8>,
}

/// Read one header at the current position. The stream is left at the
/// start of the header's data area.
async fn read_header<S>(stream: &mut S) -> Result<Header>
where
    S: SeekableStream + ?Sized,
{
    let start = stream.position();
    let prefix_len = HEADER_PREFIX_SIZE.min(stream.len() - start) as usize;
    let mut raw = vec![0u8; prefix_len];
    read_header_bytes(stream, &mut raw).await?;

    let (header_size, size_len) = read_vint(&raw[4.min(raw.len())..])
        .ok_or_else(|| Error::invalid_archive(format!("bad header size at byte {start}")))?;
    let fields_start = 4 + size_len;
    let total = offset_after(fields_start as u64, header_size)?;
    if total > stream.len() - start {
        return Err(Error::invalid_archive(format!(
            "header at byte {start} runs past the end of the volume"
        )));
    }
    if total > raw.len() as u64 {
        let have = raw.len();
        raw.resize(total as usize, 0);
        read_header_bytes(stream, &mut raw[have..]).await?;
    } else {
        raw.truncate(total as usize);
    }
    seek_within(stream, start + total)?;

    let fields = &raw[fields_start..];
    let mut r = HeaderReader::new(fields);
    let kind = r.vint()?;
    let flags = r.vint()?;
    let extra_size = if flags & HAS_EXTRA_AREA != 0 {
        r.vint_len()?
    } else {
        0
    };
    let data_size = if flags & HAS_DATA_AREA != 0 { r.vint()? } else { 0 };
    let rest = r.bytes(r.remaining())?;
    if extra_size > rest.len() {
        return Err(Error::invalid_archive(format!(
            "extra area of header at byte {start} is larger than the header"
        )));
    }
    let (body, extra) = rest.split_at(rest.len() - extra_size);
    Ok(Header {
        kind,
        data_size,
        body: body.to_vec(),
        extra: extra.to_vec(),
    })
}

/// Walk the headers after the signature.
pub(super) async fn read_entries<S>(stream: &mut S) -> Result<Vec<StoredEntry>>
where
    S: SeekableStream + ?Sized,
{
    let mut entries = Vec::new();
    loop {
        if stream.len() - stream.position() < MIN_HEADER_SIZE {
            break;
        }
        let header = read_header(stream).await?;
        let data_start = stream.position();
        let data_end = offset_after(data_start, header.data_size)?;

        match header.kind {
            ENCRYPTION_HEADER => {
                return Err(Error::PasswordProtected(
                    "archive headers are encrypted".into(),
                ));
            }
            END_HEADER => break,
            FILE_HEADER => {
                if let Some(entry) = stored_entry(&header, data_start)? {
                    entries.push(entry);
                }
                seek_within(stream, data_end)?;
                if stream.len() - data_end < MIN_FILE_HEADER_SIZE {
                    break;
                }
            }
            MAIN_HEADER | SERVICE_HEADER => seek_within(stream, data_end)?,
            other => {
                tracing::debug!(header_type = other, "skipping unknown RAR5 header");
                seek_within(stream, data_end)?;
            }
        }
    }
    Ok(entries)
}

fn stored_entry(header: &Header, data_start: u64) -> Result<Option<StoredEntry>> {
    let mut r = HeaderReader::new(&header.body);
    let file_flags = r.vint()?;
    r.vint()?; // unpacked size
    r.vint()?; // attributes
    if file_flags & FILE_HAS_MTIME != 0 {
        r.skip(4)?;
    }
    if file_flags & FILE_HAS_CRC != 0 {
        r.skip(4)?;
    }
    let compression = r.vint()?;
    r.vint()?; // host os
    let name_len = r.vint_len()?;
    let name = r.bytes(name_len)?;

    if file_flags & FILE_DIRECTORY != 0 {
        return Ok(None);
    }
    let Some(path) = member_path(name) else {
        return Ok(None);
    };
    if has_encryption_record(&header.extra)? {
        return Err(Error::PasswordProtected(format!("`{path}` is encrypted")));
    }
    let method = (compression >> 7) & 0x07;
    if method != 0 {
        return Err(Error::UnsupportedCompression(format!(
            "`{path}` uses compression method m{method}, only stored (m0) members can be streamed"
        )));
    }
    Ok(Some(StoredEntry {
        path,
        data_start,
        byte_count: header.data_size,
    }))
}

fn has_encryption_record(extra: &[u8]) -> Result<bool> {
    let mut r = HeaderReader::new(extra);
    while r.remaining() > 0 {
        let size = r.vint_len()?;
        let record = r.bytes(size)?;
        let mut record = HeaderReader::new(record);
        if record.vint()? == EXTRA_ENCRYPTION {
            return Ok(true);
        }
    }
    Ok(false)
}
