//! Growable body buffer for one record.

use crate::error::{CodecError, CodecResult};
use bytes::BufMut;

/// Initial capacity of a fresh record body.
pub const INITIAL_CAPACITY: usize = 128;

/// The body of one record under construction.
///
/// All multi-byte values are written big-endian. Capacity grows by at
/// least doubling whenever an append would not fit, so a long run of
/// appends costs amortized O(1) per byte. The only way an append fails is
/// an allocation failure.
///
/// The buffer tracks a dirty flag that is set by every append and cleared
/// by [`RecordBuffer::clear`] once the body has been flushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBuffer {
    bytes: Vec<u8>,
    dirty: bool,
}

impl RecordBuffer {
    /// Creates an empty buffer with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates an empty buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            dirty: false,
        }
    }

    /// Number of body bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current allocated capacity.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Returns `true` if the buffer holds bytes that were not flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the buffer as holding an open record, even if the body is empty.
    ///
    /// Records such as `HEAP_DUMP_END` have no body but still need flushing.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Value for the record length field.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LengthOverflow`] if the body exceeds `u32::MAX` bytes.
    pub fn length_field(&self) -> CodecResult<u32> {
        u32::try_from(self.bytes.len()).map_err(|_| CodecError::LengthOverflow {
            len: self.bytes.len(),
        })
    }

    /// Drops the body and clears the dirty flag, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.dirty = false;
    }

    /// Releases the allocation.
    pub fn release(&mut self) {
        self.bytes = Vec::new();
        self.dirty = false;
    }

    fn reserve(&mut self, additional: usize) -> CodecResult<()> {
        if self.bytes.capacity() - self.bytes.len() >= additional {
            return Ok(());
        }
        // try_reserve grows to max(2 * capacity, len + additional)
        self.bytes
            .try_reserve(additional)
            .map_err(|_| CodecError::AllocationFailure {
                requested: additional,
            })
    }

    /// Appends one byte.
    pub fn add_u1(&mut self, value: u8) -> CodecResult<()> {
        self.reserve(1)?;
        self.bytes.put_u8(value);
        self.dirty = true;
        Ok(())
    }

    /// Appends a big-endian `u16`.
    pub fn add_u2(&mut self, value: u16) -> CodecResult<()> {
        self.reserve(2)?;
        self.bytes.put_u16(value);
        self.dirty = true;
        Ok(())
    }

    /// Appends a big-endian `u32`.
    pub fn add_u4(&mut self, value: u32) -> CodecResult<()> {
        self.reserve(4)?;
        self.bytes.put_u32(value);
        self.dirty = true;
        Ok(())
    }

    /// Appends a big-endian `u64`.
    pub fn add_u8(&mut self, value: u64) -> CodecResult<()> {
        self.reserve(8)?;
        self.bytes.put_u64(value);
        self.dirty = true;
        Ok(())
    }

    /// Appends a list of bytes.
    pub fn add_u1_list(&mut self, values: &[u8]) -> CodecResult<()> {
        self.reserve(values.len())?;
        self.bytes.put_slice(values);
        self.dirty = true;
        Ok(())
    }

    /// Appends a list of big-endian `u16` values.
    pub fn add_u2_list(&mut self, values: &[u16]) -> CodecResult<()> {
        self.reserve(values.len().saturating_mul(2))?;
        for &v in values {
            self.bytes.put_u16(v);
        }
        self.dirty = true;
        Ok(())
    }

    /// Appends a list of big-endian `u32` values.
    pub fn add_u4_list(&mut self, values: &[u32]) -> CodecResult<()> {
        self.reserve(values.len().saturating_mul(4))?;
        for &v in values {
            self.bytes.put_u32(v);
        }
        self.dirty = true;
        Ok(())
    }

    /// Appends a list of big-endian `u64` values.
    pub fn add_u8_list(&mut self, values: &[u64]) -> CodecResult<()> {
        self.reserve(values.len().saturating_mul(8))?;
        for &v in values {
            self.bytes.put_u64(v);
        }
        self.dirty = true;
        Ok(())
    }

    /// Appends the UTF-8 bytes of `value` with no length prefix.
    ///
    /// The enclosing record's length field delimits the string.
    pub fn add_utf8(&mut self, value: &str) -> CodecResult<()> {
        self.add_u1_list(value.as_bytes())
    }

    /// Appends an identifier.
    pub fn add_id(&mut self, id: u32) -> CodecResult<()> {
        self.add_u4(id)
    }

    /// Appends a list of identifiers.
    pub fn add_id_list(&mut self, ids: &[u32]) -> CodecResult<()> {
        self.add_u4_list(ids)
    }
}
