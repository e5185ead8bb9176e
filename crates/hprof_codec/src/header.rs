//! File header and record header framing.

use crate::tags::ID_SIZE;

/// Format identifier at the start of every dump, including its NUL terminator.
pub const FORMAT_MAGIC: &[u8; 19] = b"JAVA PROFILE 1.0.3\0";

/// Size of the file header: magic, identifier size, two timestamp words.
pub const FILE_HEADER_SIZE: usize = FORMAT_MAGIC.len() + 4 + 8;

/// Size of a record header: tag (1) + time (4) + length (4).
pub const RECORD_HEADER_SIZE: usize = 9;

/// The header written once at the start of a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Milliseconds since the Unix epoch when the dump started.
    pub timestamp_ms: u64,
}

impl FileHeader {
    /// Creates a header with the given timestamp.
    #[must_use]
    pub const fn new(timestamp_ms: u64) -> Self {
        Self { timestamp_ms }
    }

    /// Serializes the header.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut out = [0u8; FILE_HEADER_SIZE];
        let magic_len = FORMAT_MAGIC.len();
        out[..magic_len].copy_from_slice(FORMAT_MAGIC);
        out[magic_len..magic_len + 4].copy_from_slice(&ID_SIZE.to_be_bytes());
        let high = (self.timestamp_ms >> 32) as u32;
        let low = self.timestamp_ms as u32;
        out[magic_len + 4..magic_len + 8].copy_from_slice(&high.to_be_bytes());
        out[magic_len + 8..].copy_from_slice(&low.to_be_bytes());
        out
    }
}

/// Serializes a record header.
#[must_use]
pub fn encode_record_header(tag: u8, time: u32, length: u32) -> [u8; RECORD_HEADER_SIZE] {
    let mut out = [0u8; RECORD_HEADER_SIZE];
    out[0] = tag;
    out[1..5].copy_from_slice(&time.to_be_bytes());
    out[5..9].copy_from_slice(&length.to_be_bytes());
    out
}
