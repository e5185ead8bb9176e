//! In-memory sink for testing and in-process consumers.

use crate::error::{SinkError, SinkResult};
use crate::sink::DumpSink;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory sink.
///
/// All clones of an `InMemorySink` share one buffer, so a caller can keep
/// a clone as a reader handle while the dump writer owns the other one.
/// This makes the sink suitable for:
/// - Unit and integration tests
/// - Consumers that post-process the dump in the same process
///
/// # Example
///
/// ```rust
/// use hprof_sink::{DumpSink, InMemorySink};
///
/// let mut sink = InMemorySink::new();
/// let reader = sink.clone();
/// sink.write_all(b"test data").unwrap();
/// sink.close().unwrap();
/// assert_eq!(reader.len(), 9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    data: Arc<RwLock<Vec<u8>>>,
    closed: bool,
}

impl InMemorySink {
    /// Creates a new empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns the number of bytes in the shared buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns `true` if this handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DumpSink for InMemorySink {
    fn write_all(&mut self, new_data: &[u8]) -> SinkResult<()> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.data.write().extend_from_slice(new_data);
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        // Nothing is buffered outside the shared vector
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn close(&mut self) -> SinkResult<()> {
        self.closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory buffer".to_string()
    }
}
