//! Builders for synthetic RAR volumes.
//!
//! Checksums are written as zero; the indexer never verifies them.

use super::{RAR4_SIGNATURE, RAR5_SIGNATURE};

/// Builds a RAR4 volume.
pub struct Rar4Builder {
    out: Vec<u8>,
}

impl Rar4Builder {
    pub fn new() -> Self {
        Self::with_main_flags(0)
    }

    /// A volume whose main header announces encrypted headers.
    pub fn with_encrypted_headers() -> Self {
        Self::with_main_flags(0x0080)
    }

    fn with_main_flags(flags: u16) -> Self {
        let mut out = RAR4_SIGNATURE.to_vec();
        push_rar4_block(&mut out, 0x73, flags, &[0u8; 6]);
        Self { out }
    }

    /// Add a stored member.
    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.member(name, data, 0x30, 0, data.len() as u64)
    }

    /// Add a member with a raw method byte, `0x30` being store.
    pub fn file_with_method(self, name: &str, data: &[u8], method: u8) -> Self {
        self.member(name, data, method, 0, data.len() as u64)
    }

    pub fn encrypted_member(self, name: &str, data: &[u8]) -> Self {
        self.member(name, data, 0x30, 0x0004, data.len() as u64)
    }

    /// Add a stored member using the 64-bit size fields.
    pub fn file_with_high_size(self, name: &str, data: &[u8]) -> Self {
        self.member(name, data, 0x30, 0x0100, data.len() as u64)
    }

    /// Add a stored member whose 64-bit packed size claims `packed_size`
    /// bytes regardless of the data actually written.
    pub fn file_with_declared_size(self, name: &str, data: &[u8], packed_size: u64) -> Self {
        self.member(name, data, 0x30, 0x0100, packed_size)
    }

    pub fn directory(self, name: &str) -> Self {
        self.member(name, &[], 0x30, 0x00E0, 0)
    }

    fn member(mut self, name: &str, data: &[u8], method: u8, flags: u16, packed_size: u64) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&(packed_size as u32).to_le_bytes());
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.push(2); // host os
        body.extend_from_slice(&0u32.to_le_bytes()); // file crc
        body.extend_from_slice(&0u32.to_le_bytes()); // mtime
        body.push(29); // unpack version
        body.push(method);
        body.extend_from_slice(&(name.len() as u16).to_le_bytes());
        body.extend_from_slice(&0x20u32.to_le_bytes()); // attributes
        if flags & 0x0100 != 0 {
            body.extend_from_slice(&((packed_size >> 32) as u32).to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes());
        }
        body.extend_from_slice(name.as_bytes());
        push_rar4_block(&mut self.out, 0x74, flags | 0x8000, &body);
        self.out.extend_from_slice(data);
        self
    }

    /// Append the end block and return the volume bytes.
    pub fn finish(mut self) -> Vec<u8> {
        push_rar4_block(&mut self.out, 0x7B, 0x4000, &[]);
        self.out
    }
}

impl Default for Rar4Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn push_rar4_block(out: &mut Vec<u8>, kind: u8, flags: u16, body: &[u8]) {
    out.extend_from_slice(&0u16.to_le_bytes());
    out.push(kind);
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&((7 + body.len()) as u16).to_le_bytes());
    out.extend_from_slice(body);
}

/// Builds a RAR5 volume.
pub struct Rar5Builder {
    out: Vec<u8>,
}

impl Rar5Builder {
    pub fn new() -> Self {
        let mut out = RAR5_SIGNATURE.to_vec();
        push_rar5_header(&mut out, 1, &vint(0), &[], None);
        Self { out }
    }

    /// A volume starting with an archive encryption header.
    pub fn with_encrypted_headers() -> Self {
        let mut out = RAR5_SIGNATURE.to_vec();
        let mut body = vint(0); // version
        body.extend(vint(0)); // flags
        body.push(15); // kdf count
        body.extend_from_slice(&[0u8; 16]); // salt
        push_rar5_header(&mut out, 4, &body, &[], None);
        Self { out }
    }

    /// Add a stored member.
    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.member(2, name, data, 0, 0, &[])
    }

    /// Add a stored member whose header claims a data area of `data_size`
    /// bytes regardless of the data actually written.
    pub fn file_with_declared_size(mut self, name: &str, data: &[u8], data_size: u64) -> Self {
        let mut body = vint(0x04);
        body.extend(vint(data.len() as u64)); // unpacked size
        body.extend(vint(0x20)); // attributes
        body.extend_from_slice(&0u32.to_le_bytes()); // crc
        body.extend(vint(0)); // stored
        body.extend(vint(1)); // host os
        body.extend(vint(name.len() as u64));
        body.extend_from_slice(name.as_bytes());
        push_rar5_header(&mut self.out, 2, &body, &[], Some(data_size));
        self.out.extend_from_slice(data);
        self
    }

    /// Add a member compressed with `method` (0 is store, 1 to 5 compress).
    pub fn file_with_method(self, name: &str, data: &[u8], method: u64) -> Self {
        self.member(2, name, data, 0, method, &[])
    }

    pub fn encrypted_member(self, name: &str, data: &[u8]) -> Self {
        let mut record = vint(0x01);
        record.extend_from_slice(&[0u8; 8]);
        let mut extra = vint(record.len() as u64);
        extra.extend(record);
        self.member(2, name, data, 0, 0, &extra)
    }

    pub fn directory(self, name: &str) -> Self {
        self.member(2, name, &[], 0x01, 0, &[])
    }

    /// Add a service header such as `QO` or `CMT`.
    pub fn service(self, name: &str, data: &[u8]) -> Self {
        self.member(3, name, data, 0, 0, &[])
    }

    fn member(
        mut self,
        kind: u64,
        name: &str,
        data: &[u8],
        file_flags: u64,
        method: u64,
        extra: &[u8],
    ) -> Self {
        let mut body = vint(file_flags | 0x04);
        body.extend(vint(data.len() as u64)); // unpacked size
        body.extend(vint(0x20)); // attributes
        body.extend_from_slice(&0u32.to_le_bytes()); // crc
        body.extend(vint(method << 7));
        body.extend(vint(1)); // host os
        body.extend(vint(name.len() as u64));
        body.extend_from_slice(name.as_bytes());
        push_rar5_header(&mut self.out, kind, &body, extra, Some(data.len() as u64));
        self.out.extend_from_slice(data);
        self
    }

    /// Append the end header and return the volume bytes.
    pub fn finish(mut self) -> Vec<u8> {
        push_rar5_header(&mut self.out, 5, &vint(0), &[], None);
        self.out
    }

    /// The volume bytes without an end header.
    pub fn unfinished(self) -> Vec<u8> {
        self.out
    }
}

impl Default for Rar5Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn push_rar5_header(out: &mut Vec<u8>, kind: u64, body: &[u8], extra: &[u8], data: Option<u64>) {
    let mut flags = 0;
    if !extra.is_empty() {
        flags |= 0x01;
    }
    if data.is_some() {
        flags |= 0x02;
    }
    let mut fields = vint(kind);
    fields.extend(vint(flags));
    if !extra.is_empty() {
        fields.extend(vint(extra.len() as u64));
    }
    if let Some(size) = data {
        fields.extend(vint(size));
    }
    fields.extend_from_slice(body);
    fields.extend_from_slice(extra);

    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend(vint(fields.len() as u64));
    out.extend(fields);
}

fn vint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}
