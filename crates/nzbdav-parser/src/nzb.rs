//! NZB document parsing.
//!
//! An NZB lists the files of a Usenet post and, for each file, the message
//! ids of its segments:
//!
//! ```xml
//! <nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
//!   <head><meta type="name">Some.Release</meta></head>
//!   <file poster="..." date="..." subject="[1/2] - &quot;a.mkv&quot; yEnc (1/2)">
//!     <groups><group>alt.binaries.test</group></groups>
//!     <segments>
//!       <segment bytes="739811" number="1">part1of2.abc@host</segment>
//!       <segment bytes="739811" number="2">part2of2.abc@host</segment>
//!     </segments>
//!   </file>
//! </nzb>
//! ```

use std::collections::HashMap;

use nzbdav_common::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A parsed NZB document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nzb {
    /// `<meta type="...">` values from the head, keyed by type.
    pub meta: HashMap<String, Vec<String>>,
    pub files: Vec<NzbFile>,
}

impl Nzb {
    /// The `name` meta value, if present.
    pub fn metadata_name(&self) -> Option<&str> {
        self.meta
            .get("name")
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Sum of the declared sizes of every segment.
    pub fn total_segment_bytes(&self) -> u64 {
        self.files.iter().map(NzbFile::total_segment_bytes).sum()
    }
}

/// One file of an NZB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NzbFile {
    pub subject: String,
    pub poster: String,
    pub date: Option<i64>,
    pub groups: Vec<String>,
    /// Sorted by segment number.
    pub segments: Vec<NzbSegment>,
}

impl NzbFile {
    /// Message ids in segment order.
    pub fn segment_ids(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.message_id.clone()).collect()
    }

    pub fn total_segment_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NzbSegment {
    pub number: u32,
    /// Encoded size declared by the poster.
    pub bytes: u64,
    pub message_id: String,
}

/// Element whose text content is being collected.
enum TextTarget {
    Meta(String),
    Group,
    Segment { number: u32, bytes: u64 },
}

/// Parse an NZB document.
///
/// Fails with [`Error::InvalidNzb`] on malformed XML, a missing `<nzb>`
/// root, a segment without a usable number or message id, or a document
/// without any segments at all.
pub fn parse_nzb(data: &[u8]) -> Result<Nzb> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut nzb = Nzb::default();
    let mut saw_root = false;
    let mut file: Option<NzbFile> = None;
    let mut target: Option<TextTarget> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| invalid(format!("malformed XML at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"nzb" => saw_root = true,
                b"file" => file = Some(start_file(&e)?),
                b"meta" => {
                    let kind = attribute(&e, b"type")?.unwrap_or_default();
                    target = Some(TextTarget::Meta(kind));
                    text.clear();
                }
                b"group" => {
                    target = Some(TextTarget::Group);
                    text.clear();
                }
                b"segment" => {
                    target = Some(start_segment(&e)?);
                    text.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"nzb" => saw_root = true,
                b"segment" => return Err(invalid("segment without a message id")),
                _ => {}
            },
            Event::Text(t) => {
                if target.is_some() {
                    let value = t.unescape().map_err(|e| invalid(e.to_string()))?;
                    text.push_str(&value);
                }
            }
            Event::CData(t) => {
                if target.is_some() {
                    text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"file" => {
                    if let Some(done) = file.take() {
                        nzb.files.push(finish_file(done));
                    }
                }
                b"meta" | b"group" | b"segment" => {
                    finish_text(&mut nzb, file.as_mut(), target.take(), text.trim())?;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(invalid("missing <nzb> root element"));
    }
    nzb.files.retain(|f| {
        if f.segments.is_empty() {
            tracing::debug!(subject = %f.subject, "dropping nzb file without segments");
        }
        !f.segments.is_empty()
    });
    if nzb.files.is_empty() {
        return Err(invalid("document contains no segments"));
    }
    Ok(nzb)
}

fn start_file(e: &BytesStart<'_>) -> Result<NzbFile> {
    Ok(NzbFile {
        subject: attribute(e, b"subject")?.unwrap_or_default(),
        poster: attribute(e, b"poster")?.unwrap_or_default(),
        date: attribute(e, b"date")?.and_then(|d| d.trim().parse().ok()),
        ..NzbFile::default()
    })
}

fn start_segment(e: &BytesStart<'_>) -> Result<TextTarget> {
    let number = attribute(e, b"number")?
        .and_then(|n| n.trim().parse().ok())
        .ok_or_else(|| invalid("segment without a valid number"))?;
    let bytes = attribute(e, b"bytes")?
        .and_then(|b| b.trim().parse().ok())
        .unwrap_or(0);
    Ok(TextTarget::Segment { number, bytes })
}

fn finish_text(
    nzb: &mut Nzb,
    file: Option<&mut NzbFile>,
    target: Option<TextTarget>,
    text: &str,
) -> Result<()> {
    match (target, file) {
        (Some(TextTarget::Meta(kind)), _) => {
            nzb.meta.entry(kind).or_default().push(text.to_string());
        }
        (Some(TextTarget::Group), Some(file)) => file.groups.push(text.to_string()),
        (Some(TextTarget::Segment { number, bytes }), Some(file)) => {
            if text.is_empty() {
                return Err(invalid(format!("segment {number} has no message id")));
            }
            file.segments.push(NzbSegment {
                number,
                bytes,
                message_id: text.to_string(),
            });
        }
        _ => {}
    }
    Ok(())
}

fn finish_file(mut file: NzbFile) -> NzbFile {
    file.segments.sort_by_key(|s| s.number);
    file.segments.dedup_by_key(|s| s.number);
    file
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| invalid(err.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|err| invalid(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidNzb(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="iso-8859-1" ?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="name">Some.Show.S01E01</meta>
    <meta type="category">TV</meta>
  </head>
  <file poster="poster@example.com" date="1700000000" subject="[1/2] - &quot;show.mkv&quot; yEnc (1/3)">
    <groups>
      <group>alt.binaries.test</group>
      <group>alt.binaries.misc</group>
    </groups>
    <segments>
      <segment bytes="300" number="3">c@example</segment>
      <segment bytes="500" number="1">a@example</segment>
      <segment bytes="500" number="2">b@example</segment>
    </segments>
  </file>
  <file poster="poster@example.com" date="1700000000" subject="[2/2] - &quot;show.nfo&quot; yEnc (1/1)">
    <groups><group>alt.binaries.test</group></groups>
    <segments>
      <segment bytes="12" number="1">nfo@example</segment>
    </segments>
  </file>
</nzb>"#;

    #[test]
    fn test_parses_files_and_segments() {
        let nzb = parse_nzb(SAMPLE.as_bytes()).unwrap();
        assert_eq!(nzb.files.len(), 2);
        assert_eq!(nzb.metadata_name(), Some("Some.Show.S01E01"));

        let show = &nzb.files[0];
        assert_eq!(show.subject, r#"[1/2] - "show.mkv" yEnc (1/3)"#);
        assert_eq!(show.date, Some(1_700_000_000));
        assert_eq!(show.groups, vec!["alt.binaries.test", "alt.binaries.misc"]);
        assert_eq!(show.segment_ids(), vec!["a@example", "b@example", "c@example"]);
        assert_eq!(show.total_segment_bytes(), 1300);
        assert_eq!(nzb.total_segment_bytes(), 1312);
    }

    #[test]
    fn test_rejects_non_nzb() {
        assert_matches!(parse_nzb(b"<html><body/></html>"), Err(Error::InvalidNzb(_)));
        assert_matches!(parse_nzb(b"not xml at all"), Err(Error::InvalidNzb(_)));
        assert_matches!(
            parse_nzb(b"<nzb><file subject=\"x\"><segments></segments></file></nzb>"),
            Err(Error::InvalidNzb(_))
        );
    }

    #[test]
    fn test_rejects_bad_segments() {
        let missing_number = br#"<nzb><file subject="x"><segments>
            <segment bytes="1">a@b</segment></segments></file></nzb>"#;
        assert_matches!(parse_nzb(missing_number), Err(Error::InvalidNzb(_)));

        let empty_id = br#"<nzb><file subject="x"><segments>
            <segment bytes="1" number="1">  </segment></segments></file></nzb>"#;
        assert_matches!(parse_nzb(empty_id), Err(Error::InvalidNzb(_)));
    }

    #[test]
    fn test_duplicate_segment_numbers_keep_first() {
        let doc = br#"<nzb><file subject="x"><segments>
            <segment bytes="1" number="1">first@b</segment>
            <segment bytes="1" number="1">second@b</segment>
            </segments></file></nzb>"#;
        let nzb = parse_nzb(doc).unwrap();
        assert_eq!(nzb.files[0].segment_ids(), vec!["first@b"]);
    }
}
