//! RAR 1.5-4.x block headers.

use nzbdav_common::{Error, Result};
use nzbdav_stream::SeekableStream;

use super::reader::HeaderReader;
use super::{member_path, offset_after, read_header_bytes, seek_within, StoredEntry};

const BASE_HEADER_SIZE: u64 = 7;
/// Base header plus the fixed file-header fields.
const MIN_FILE_HEADER_SIZE: u64 = 32;

const MAIN_HEADER: u8 = 0x73;
const FILE_HEADER: u8 = 0x74;
const END_HEADER: u8 = 0x7B;

const MAIN_ENCRYPTED_HEADERS: u16 = 0x0080;
const FILE_ENCRYPTED: u16 = 0x0004;
const FILE_DIRECTORY_MASK: u16 = 0x00E0;
const FILE_LARGE: u16 = 0x0100;
const FILE_UNICODE_NAME: u16 = 0x0200;
const LONG_BLOCK: u16 = 0x8000;

const METHOD_STORE: u8 = 0x30;

struct FileHeader<'a> {
    flags: u16,
    packed_size: u64,
    method: u8,
    name: &'a [u8],
}

impl<'a> FileHeader<'a> {
    fn parse(flags: u16, body: &'a [u8]) -> Result<Self> {
        let mut r = HeaderReader::new(body);
        let mut packed_size = u64::from(r.u32_le()?);
        r.skip(4)?; // unpacked size
        r.skip(1)?; // host os
        r.skip(4)?; // file crc
        r.skip(4)?; // mtime
        r.skip(1)?; // unpack version
        let method = r.u8()?;
        let name_size = r.u16_le()? as usize;
        r.skip(4)?; // attributes
        if flags & FILE_LARGE != 0 {
            packed_size |= u64::from(r.u32_le()?) << 32;
            r.skip(4)?;
        }
        let mut name = r.bytes(name_size)?;
        if flags & FILE_UNICODE_NAME != 0 {
            if let Some(nul) = name.iter().position(|b| *b == 0) {
                name = &name[..nul];
            }
        }
        Ok(Self {
            flags,
            packed_size,
            method,
            name,
        })
    }

    fn is_directory(&self) -> bool {
        self.flags & FILE_DIRECTORY_MASK == FILE_DIRECTORY_MASK
    }
}

/// Walk the blocks after the signature.
pub(super) async fn read_entries<S>(stream: &mut S) -> Result<Vec<StoredEntry>>
where
    S: SeekableStream + ?Sized,
{
    let mut entries = Vec::new();
    loop {
        let start = stream.position();
        if stream.len() - start < BASE_HEADER_SIZE {
            break;
        }

        let mut base = [0u8; BASE_HEADER_SIZE as usize];
        read_header_bytes(stream, &mut base).await?;
        let mut r = HeaderReader::new(&base);
        r.skip(2)?; // header crc
        let block_type = r.u8()?;
        let flags = r.u16_le()?;
        let head_size = u64::from(r.u16_le()?);
        if head_size < BASE_HEADER_SIZE {
            return Err(Error::invalid_archive(format!(
                "block at byte {start} declares a {head_size} byte header"
            )));
        }

        let mut body = vec![0u8; (head_size - BASE_HEADER_SIZE) as usize];
        read_header_bytes(stream, &mut body).await?;
        let data_start = start + head_size;

        match block_type {
            MAIN_HEADER if flags & MAIN_ENCRYPTED_HEADERS != 0 => {
                return Err(Error::PasswordProtected(
                    "archive headers are encrypted".into(),
                ));
            }
            FILE_HEADER => {
                let file = FileHeader::parse(flags, &body)?;
                let data_end = offset_after(data_start, file.packed_size)?;
                if let Some(entry) = stored_entry(&file, data_start)? {
                    entries.push(entry);
                }
                seek_within(stream, data_end)?;
                if stream.len() - data_end < MIN_FILE_HEADER_SIZE {
                    break;
                }
            }
            END_HEADER => break,
            _ => {
                let add_size = if flags & LONG_BLOCK != 0 {
                    u64::from(HeaderReader::new(&body).u32_le()?)
                } else {
                    0
                };
                seek_within(stream, offset_after(data_start, add_size)?)?;
            }
        }
    }
    Ok(entries)
}

fn stored_entry(file: &FileHeader<'_>, data_start: u64) -> Result<Option<StoredEntry>> {
    if file.is_directory() {
        return Ok(None);
    }
    let Some(path) = member_path(file.name) else {
        return Ok(None);
    };
    if file.flags & FILE_ENCRYPTED != 0 {
        return Err(Error::PasswordProtected(format!("`{path}` is encrypted")));
    }
    if file.method != METHOD_STORE {
        return Err(Error::UnsupportedCompression(format!(
            "`{path}` uses compression method m{}, only stored (m0) members can be streamed",
            file.method.wrapping_sub(METHOD_STORE)
        )));
    }
    Ok(Some(StoredEntry {
        path,
        data_start,
        byte_count: file.packed_size,
    }))
}
