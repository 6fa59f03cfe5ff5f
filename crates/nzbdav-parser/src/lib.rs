//! # nzbdav-parser
//!
//! Parsers for the documents nzbdav ingests:
//!
//! - [`nzb`]: NZB documents listing a post's files and segment ids.
//! - [`filename`]: recovering file names from NZB subject lines.
//! - [`rar`]: locating stored members inside RAR volumes.
//!
//! ```
//! use nzbdav_parser::parse_nzb;
//!
//! let doc = br#"<nzb><file subject="&quot;a.mkv&quot; yEnc (1/1)">
//!   <segments><segment bytes="10" number="1">id@host</segment></segments>
//! </file></nzb>"#;
//! let nzb = parse_nzb(doc).unwrap();
//! assert_eq!(nzb.files[0].segment_ids(), vec!["id@host"]);
//! ```

pub mod filename;
pub mod nzb;
pub mod rar;

pub use nzb::{parse_nzb, Nzb, NzbFile, NzbSegment};
pub use rar::{read_stored_entries, StoredEntry};
