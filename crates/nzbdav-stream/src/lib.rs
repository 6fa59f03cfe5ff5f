//! nzbdav-stream: async stream primitives for stitching segments together.
//!
//! - [`ReadStream`] / [`SeekableStream`]: the read and seek contract every
//!   file stream implements. Drop is dispose.
//! - [`LimitedStream`]: truncates another stream after N bytes.
//! - [`CombinedStream`]: concatenates a lazily produced sequence of streams.
//! - [`Prefetch`]: runs up to K fetches ahead and yields them in order.
//! - [`BufferToEndStream`]: drains an upstream to EOF in the background.
//! - [`MemoryStream`]: seekable stream over a byte buffer.
//! - [`interpolation`]: locates the segment containing a byte offset.

pub mod buffer_to_end;
pub mod combined;
pub mod interpolation;
pub mod limited;
pub mod memory;
pub mod prefetch;
pub mod stream;

pub use buffer_to_end::BufferToEndStream;
pub use combined::CombinedStream;
pub use interpolation::{ByteRange, SearchResult};
pub use limited::LimitedStream;
pub use memory::MemoryStream;
pub use prefetch::Prefetch;
pub use stream::{BoxedSeekableStream, BoxedStream, ReadStream, SeekableStream};
