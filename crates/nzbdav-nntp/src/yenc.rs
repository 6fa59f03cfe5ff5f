//! yEnc header parsing and line decoding.

use nzbdav_common::{Error, Result};
use nzbdav_stream::ByteRange;

/// Metadata from the `=ybegin` and `=ypart` lines of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YencHeader {
    pub file_name: String,
    pub file_size: u64,
    pub line_length: u32,
    pub part_number: u32,
    pub total_parts: u32,
    /// Zero-based offset of this part within the file.
    pub part_offset: u64,
    pub part_size: u64,
}

impl YencHeader {
    /// Bytes of the file covered by this part.
    pub fn byte_range(&self) -> Result<ByteRange> {
        let end = self.part_offset.checked_add(self.part_size).ok_or_else(|| {
            Error::InvalidYenc(format!(
                "part of {} bytes at offset {} overflows",
                self.part_size, self.part_offset
            ))
        })?;
        Ok(ByteRange::new(self.part_offset, end))
    }

    /// Parse the `=ybegin` line and, for multipart posts, the `=ypart` line.
    pub fn parse(ybegin: &str, ypart: Option<&str>) -> Result<Self> {
        let ybegin = ybegin
            .strip_prefix("=ybegin")
            .ok_or_else(|| Error::InvalidYenc(format!("not a ybegin line: {ybegin}")))?;

        // `name=` is always last and may contain spaces.
        let (params, file_name) = match ybegin.find(" name=") {
            Some(idx) => (&ybegin[..idx], ybegin[idx + 6..].trim_end().to_string()),
            None => (ybegin, String::new()),
        };

        let file_size: u64 = required(params, "size")?;
        let line_length = optional(params, "line")?.unwrap_or(128);
        let part_number = optional(params, "part")?.unwrap_or(1);
        let total_parts = optional(params, "total")?.unwrap_or(1);

        let (part_offset, part_size) = match ypart {
            Some(line) => {
                let params = line
                    .strip_prefix("=ypart")
                    .ok_or_else(|| Error::InvalidYenc(format!("not a ypart line: {line}")))?;
                let begin: u64 = required(params, "begin")?;
                let end: u64 = required(params, "end")?;
                if begin == 0 || end < begin || end > file_size {
                    return Err(Error::InvalidYenc(format!(
                        "part range {begin}-{end} invalid for file of {file_size} bytes"
                    )));
                }
                (begin - 1, end - begin + 1)
            }
            None => (0, file_size),
        };

        Ok(Self {
            file_name,
            file_size,
            line_length,
            part_number,
            total_parts,
            part_offset,
            part_size,
        })
    }
}

fn keyword<'a>(params: &'a str, key: &str) -> Option<&'a str> {
    params.split_whitespace().find_map(|token| {
        token
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

fn optional<T: std::str::FromStr>(params: &str, key: &str) -> Result<Option<T>> {
    keyword(params, key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| Error::InvalidYenc(format!("bad value for {key}: {value}")))
        })
        .transpose()
}

fn required<T: std::str::FromStr>(params: &str, key: &str) -> Result<T> {
    optional(params, key)?.ok_or_else(|| Error::InvalidYenc(format!("missing {key}")))
}

/// Decode one encoded line, appending the output to `out`.
///
/// `line` must not include the line terminator.
pub fn decode_line(line: &[u8], out: &mut Vec<u8>) {
    let mut escaped = false;
    for &b in line {
        if escaped {
            out.push(b.wrapping_sub(64).wrapping_sub(42));
            escaped = false;
        } else if b == b'=' {
            escaped = true;
        } else if b != b'\r' && b != b'\n' {
            out.push(b.wrapping_sub(42));
        }
    }
}

/// Encode bytes as yEnc lines. Used to build test articles.
#[cfg(any(test, feature = "testing"))]
pub fn encode(data: &[u8], line_length: usize) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut line = Vec::with_capacity(line_length + 2);
    for &b in data {
        let encoded = b.wrapping_add(42);
        if matches!(encoded, 0 | b'\n' | b'\r' | b'=' | b'.') {
            line.push(b'=');
            line.push(encoded.wrapping_add(64));
        } else {
            line.push(encoded);
        }
        if line.len() >= line_length {
            lines.push(std::mem::take(&mut line));
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_multipart_header() {
        let header = YencHeader::parse(
            "=ybegin part=2 total=10 line=128 size=500000 name=My Show S01E01.mkv",
            Some("=ypart begin=50001 end=100000"),
        )
        .unwrap();
        assert_eq!(header.file_name, "My Show S01E01.mkv");
        assert_eq!(header.file_size, 500_000);
        assert_eq!(header.part_number, 2);
        assert_eq!(header.total_parts, 10);
        assert_eq!(header.part_offset, 50_000);
        assert_eq!(header.part_size, 50_000);
        assert_eq!(header.byte_range().unwrap(), ByteRange::new(50_000, 100_000));
    }

    #[test]
    fn test_parse_single_part_header() {
        let header = YencHeader::parse("=ybegin line=128 size=1234 name=a.nfo", None).unwrap();
        assert_eq!(header.part_offset, 0);
        assert_eq!(header.part_size, 1234);
        assert_eq!(header.total_parts, 1);
    }

    #[test]
    fn test_parse_rejects_missing_size() {
        let err = YencHeader::parse("=ybegin line=128 name=a.bin", None).unwrap_err();
        assert_matches!(err, Error::InvalidYenc(_));
    }

    #[test]
    fn test_byte_range_rejects_overflow() {
        let mut header = YencHeader::parse("=ybegin line=128 size=10 name=a.bin", None).unwrap();
        header.part_offset = u64::MAX - 4;
        assert_matches!(header.byte_range(), Err(Error::InvalidYenc(_)));
    }

    #[test]
    fn test_parse_rejects_bad_part_range() {
        let err = YencHeader::parse(
            "=ybegin part=1 size=100 name=a.bin",
            Some("=ypart begin=50 end=200"),
        )
        .unwrap_err();
        assert_matches!(err, Error::InvalidYenc(_));
    }

    #[test]
    fn test_decode_handles_escapes() {
        // 0xD6 + 42 wraps to 0x00, which must be escaped.
        let data = [0xD6u8, b'a', 0x13, 0xE3, 0xFF];
        let lines = encode(&data, 128);
        let mut out = Vec::new();
        for line in &lines {
            decode_line(line, &mut out);
        }
        assert_eq!(out, data);
        assert!(lines[0].contains(&b'='));
    }

    #[test]
    fn test_decode_known_bytes() {
        let mut out = Vec::new();
        decode_line(b"r\x8f\x96\x96\x99", &mut out);
        assert_eq!(out, b"Hello");
    }
}
