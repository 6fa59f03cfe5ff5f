//! Logical file streams and HTTP serving.
//!
//! - [`NzbFileStream`]: a posted file, read segment by segment
//! - [`RarFileStream`]: a stored archive member spread over volumes
//!
//! # Routes
//!
//! - `GET /items/{item_id}` - file entry with range support

mod direct;
mod nzb_file;
mod rar_file;

pub use direct::{parse_range_header, stream_item};
pub use nzb_file::NzbFileStream;
pub use rar_file::RarFileStream;

use axum::{routing::get, Router};

use crate::server::AppContext;

/// Create the file serving router.
pub fn items_router() -> Router<AppContext> {
    Router::new().route("/:item_id", get(stream_item))
}
