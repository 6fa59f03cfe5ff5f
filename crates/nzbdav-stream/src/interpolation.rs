//! Interpolation search over lazily discovered byte ranges.
//!
//! A segmented file of known total size is split into `N` parts whose
//! individual boundaries are only known after fetching each part's header.
//! [`find`] locates the part containing a byte offset by guessing its index
//! from the average part size of the remaining search window, probing that
//! part, and shrinking the window on whichever side the probe fell.

use std::future::Future;
use std::ops::Range;

use nzbdav_common::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position < self.end
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains_range(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end && other.start <= other.end
    }
}

/// The part found to contain the search target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub index: usize,
    pub range: ByteRange,
}

/// Find the index whose byte range contains `target`.
///
/// `index_range` and `byte_range` describe the search window: the parts in
/// `index_range` together cover exactly `byte_range`. `probe(i)` fetches the
/// byte range of part `i`.
///
/// Any probe result that contradicts the window fails with `CorruptFile`
/// instead of looping: the target outside the window, an empty index range,
/// or a probed range that is not contained in the window. Both bounds only
/// ever move inwards, so the search always terminates.
pub async fn find<F, Fut>(
    target: u64,
    index_range: Range<usize>,
    byte_range: ByteRange,
    mut probe: F,
    cancel: &CancellationToken,
) -> Result<SearchResult>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<ByteRange>>,
{
    let mut indexes = index_range;
    let mut bytes = byte_range;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !bytes.contains(target) {
            return Err(Error::corrupt(format!(
                "offset {target} is outside search range {}..{}",
                bytes.start, bytes.end
            )));
        }
        if indexes.is_empty() {
            return Err(Error::corrupt(format!(
                "no segments left to cover offset {target}"
            )));
        }

        let guess = guess_index(target, &indexes, &bytes);
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            found = probe(guess) => found?,
        };

        if !bytes.contains_range(&found) {
            return Err(Error::corrupt(format!(
                "segment {guess} spans {}..{}, outside search range {}..{}",
                found.start, found.end, bytes.start, bytes.end
            )));
        }

        if found.end <= target {
            indexes.start = guess + 1;
            bytes.start = found.end;
        } else if found.start > target {
            indexes.end = guess;
            bytes.end = found.start;
        } else {
            return Ok(SearchResult {
                index: guess,
                range: found,
            });
        }
    }
}

/// `start + floor((target - b0) / (bytes_per_index))`, clamped into range.
fn guess_index(target: u64, indexes: &Range<usize>, bytes: &ByteRange) -> usize {
    let count = indexes.len() as u128;
    let offset = (target - bytes.start) as u128 * count / bytes.len() as u128;
    (indexes.start + offset as usize).min(indexes.end - 1)
}
