//! Bounds-checked field reader over a header buffer.
//!
//! RAR4 headers use fixed-width little-endian fields; RAR5 headers mostly
//! use vints, where each byte carries 7 data bits and the high bit marks a
//! continuation.

use nzbdav_common::{Error, Result};

/// Longest vint that still fits in a u64.
const MAX_VINT_LEN: usize = 10;

/// Decode a vint from the start of `data`, returning the value and the
/// number of bytes it occupied.
pub fn read_vint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().take(MAX_VINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

pub struct HeaderReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(truncated)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn vint(&mut self) -> Result<u64> {
        let (value, len) = read_vint(&self.data[self.pos..]).ok_or_else(truncated)?;
        self.pos += len;
        Ok(value)
    }

    /// A vint that is used as an in-memory length.
    pub fn vint_len(&mut self) -> Result<usize> {
        usize::try_from(self.vint()?).map_err(|_| Error::invalid_archive("header length overflow"))
    }
}

fn truncated() -> Error {
    Error::invalid_archive("truncated archive header")
}
