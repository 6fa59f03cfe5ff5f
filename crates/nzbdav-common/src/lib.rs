//! nzbdav-common: shared types, ids, and errors.
//!
//! This crate provides functionality used across every nzbdav crate:
//!
//! - **Error Handling**: one error enum covering transport, content, and storage failures
//! - **Typed IDs**: UUID wrappers for directory items and queue jobs
//! - **Core Types**: item kinds, job priorities, post-processing modes, history outcomes
//! - **Path Utilities**: extension-based classification of file names
//!
//! # Examples
//!
//! ```
//! use nzbdav_common::{DavItemId, Error, Priority, Result};
//! use nzbdav_common::paths::is_video_file;
//!
//! let root = DavItemId::ROOT;
//! assert!(Priority::High > Priority::Normal);
//! assert!(is_video_file("movie.mkv"));
//!
//! fn example() -> Result<()> {
//!     Err(Error::CorruptFile("bad segment".into()))
//! }
//! assert!(example().unwrap_err().is_non_retryable());
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
