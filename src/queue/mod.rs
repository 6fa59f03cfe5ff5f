//! Ingestion of submitted NZB documents into the directory tree.
//!
//! Jobs run one at a time. For each job the processor:
//!
//! 1. Completes it straight away if its folder already exists
//! 2. Names and classifies every posted file
//! 3. Fetches sizes and RAR headers with bounded concurrency
//! 4. Writes the folder and its entries in one transaction
//!
//! Non-retryable errors move the job to history as failed. Anything else
//! pauses it for a minute before it is picked up again.

mod aggregators;
mod file_processors;
mod manager;
mod processor;
mod validator;

pub use manager::{CurrentJob, NewJob, QueueManager};
pub use processor::{JobOutcome, RETRY_DELAY_SECS};
