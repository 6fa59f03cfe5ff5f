//! nzbdav-nntp: pooled Usenet clients that stream decoded segments.
//!
//! Layers, innermost first:
//!
//! - [`NntpConnection`]: one TCP/TLS connection speaking NNTP.
//! - [`SingleConnectionClient`]: serializes commands on one connection and
//!   hands out segment streams that drain themselves.
//! - [`ConnectionPool`]: bounded, idle-reaped pool of clients.
//! - [`MultiConnectionClient`]: runs each command on a pooled client.
//! - [`CachingClient`]: memoizes segment headers.
//!
//! All layers implement [`NntpClient`].

pub mod body;
pub mod caching;
pub mod client;
pub mod connection;
pub mod multi;
pub mod pool;
pub mod single;
pub mod yenc;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use caching::{CachingClient, HeaderCache};
pub use client::{NntpClient, SegmentStream};
pub use connection::NntpConnection;
pub use multi::MultiConnectionClient;
pub use pool::{ConnectionFactory, ConnectionGuard, ConnectionPool};
pub use single::SingleConnectionClient;
pub use yenc::YencHeader;
