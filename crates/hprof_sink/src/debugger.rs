//! Sink that streams a dump to an attached debugger.

use crate::error::{SinkError, SinkResult};
use crate::sink::DumpSink;
use bytes::{Bytes, BytesMut};

/// Default size of the chunks handed to a [`DebuggerTransport`] (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A live channel to an attached debugger.
///
/// The transport is owned by the caller. A [`DebuggerSink`] only borrows
/// it and never closes it.
pub trait DebuggerTransport {
    /// Delivers one chunk of dump bytes.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the chunk could not be delivered.
    fn send_chunk(&mut self, chunk: Bytes) -> Result<(), String>;
}

/// A sink that batches dump bytes into chunks for a borrowed transport.
///
/// Bytes are accumulated until `chunk_size` is reached, then forwarded.
/// `flush` and `close` forward whatever is pending. The transport is left
/// open when the sink is closed or dropped.
pub struct DebuggerSink<'a> {
    transport: &'a mut dyn DebuggerTransport,
    pending: BytesMut,
    chunk_size: usize,
    written: u64,
    closed: bool,
}

impl<'a> DebuggerSink<'a> {
    /// Creates a sink over `transport` using [`DEFAULT_CHUNK_SIZE`].
    pub fn new(transport: &'a mut dyn DebuggerTransport) -> Self {
        Self::with_chunk_size(transport, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a sink over `transport` with a custom chunk size.
    ///
    /// A chunk size of zero is treated as one byte.
    pub fn with_chunk_size(transport: &'a mut dyn DebuggerTransport, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            transport,
            pending: BytesMut::with_capacity(chunk_size),
            chunk_size,
            written: 0,
            closed: false,
        }
    }

    fn send(&mut self, chunk: Bytes) -> SinkResult<()> {
        self.transport
            .send_chunk(chunk)
            .map_err(SinkError::Transport)
    }
}

impl DumpSink for DebuggerSink<'_> {
    fn write_all(&mut self, data: &[u8]) -> SinkResult<()> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.chunk_size {
            let chunk = self.pending.split_to(self.chunk_size).freeze();
            self.send(chunk)?;
        }
        self.written += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if !self.pending.is_empty() {
            let chunk = self.pending.split().freeze();
            self.send(chunk)?;
        }
        Ok(())
    }

    /// Bytes accepted by calls to `write_all` that succeeded, including
    /// bytes still waiting for a full chunk.
    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn close(&mut self) -> SinkResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("debugger transport ({} byte chunks)", self.chunk_size)
    }
}

impl std::fmt::Debug for DebuggerSink<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerSink")
            .field("pending", &self.pending.len())
            .field("chunk_size", &self.chunk_size)
            .field("written", &self.written)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct RecordingTransport {
        chunks: Vec<Bytes>,
        refuse: bool,
    }

    impl DebuggerTransport for RecordingTransport {
        fn send_chunk(&mut self, chunk: Bytes) -> Result<(), String> {
            if self.refuse {
                return Err("peer went away".to_string());
            }
            self.chunks.push(chunk);
            Ok(())
        }
    }

    impl RecordingTransport {
        fn joined(&self) -> Vec<u8> {
            self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
        }
    }

    #[test]
    fn debugger_batches_into_chunks() {
        let mut transport = RecordingTransport::default();
        {
            let mut sink = DebuggerSink::with_chunk_size(&mut transport, 4);
            sink.write_all(b"abcdefghij").unwrap();
            assert_eq!(sink.bytes_written(), 10);
            sink.close().unwrap();
        }
        let sizes: Vec<usize> = transport.chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(transport.joined(), b"abcdefghij");
    }

    #[test]
    fn debugger_holds_bytes_until_flush() {
        let mut transport = RecordingTransport::default();
        {
            let mut sink = DebuggerSink::new(&mut transport);
            sink.write_all(b"small").unwrap();
        }
        // Dropped without flush: nothing delivered
        assert!(transport.chunks.is_empty());
    }

    #[test]
    fn debugger_close_leaves_transport_usable() {
        let mut transport = RecordingTransport::default();
        {
            let mut sink = DebuggerSink::new(&mut transport);
            sink.write_all(b"dump").unwrap();
            sink.close().unwrap();
            assert!(matches!(sink.write_all(b"more"), Err(SinkError::Closed)));
        }
        // The caller still owns a working transport
        transport.send_chunk(Bytes::from_static(b"after")).unwrap();
        assert_eq!(transport.chunks.len(), 2);
    }

    #[test]
    fn debugger_transport_failure_surfaces() {
        let mut transport = RecordingTransport {
            refuse: true,
            ..Default::default()
        };
        let mut sink = DebuggerSink::with_chunk_size(&mut transport, 2);
        let result = sink.write_all(b"abc");
        assert!(matches!(result, Err(SinkError::Transport(_))));
    }

    #[test]
    fn debugger_failed_write_is_not_counted() {
        let mut transport = RecordingTransport::default();
        {
            let mut sink = DebuggerSink::with_chunk_size(&mut transport, 4);
            sink.write_all(b"ab").unwrap();
            assert_eq!(sink.bytes_written(), 2);
        }
        transport.refuse = true;
        let mut sink = DebuggerSink::with_chunk_size(&mut transport, 4);
        sink.write_all(b"ab").unwrap();
        assert!(sink.write_all(b"cdef").is_err());
        assert_eq!(sink.bytes_written(), 2);
    }

    proptest! {
        #[test]
        fn debugger_reassembles_any_write_sequence(
            writes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16),
            chunk_size in 1usize..32,
        ) {
            let mut transport = RecordingTransport::default();
            let expected: Vec<u8> = writes.iter().flatten().copied().collect();
            {
                let mut sink = DebuggerSink::with_chunk_size(&mut transport, chunk_size);
                for w in &writes {
                    sink.write_all(w).unwrap();
                }
                sink.close().unwrap();
            }
            prop_assert_eq!(transport.joined(), expected);
            prop_assert!(transport.chunks.iter().all(|c| c.len() <= chunk_size));
        }
    }
}
