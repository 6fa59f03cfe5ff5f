//! nzbdav - stream usenet content straight from NZB documents
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod queue;
pub mod server;
pub mod streaming;
pub mod usenet;
