//! Test fixtures and dump helpers.
//!
//! Provides sinks and transports with scripted failures and one-call
//! helpers that dump a [`SyntheticHeap`] and read the result back.

use crate::reader::HeapDumpView;
use crate::synthetic::SyntheticHeap;
use bytes::Bytes;
use hprof_core::{dump_heap_to, DumpConfig, DumpSummary};
use hprof_sink::{DebuggerTransport, DumpSink, InMemorySink, SinkError, SinkResult};
use std::io;
use std::path::PathBuf;
use tempfile::TempDir;

/// Configuration with a fixed header timestamp, for reproducible bytes.
pub fn test_config() -> DumpConfig {
    DumpConfig::new().header_timestamp_ms(0)
}

/// An in-memory sink whose writes fail after a number of successes.
#[derive(Debug, Clone)]
pub struct FailingSink {
    inner: InMemorySink,
    writes_left: usize,
}

impl FailingSink {
    /// Accepts `successful_writes` calls to `write_all`, then fails.
    pub fn after_writes(successful_writes: usize) -> Self {
        Self {
            inner: InMemorySink::new(),
            writes_left: successful_writes,
        }
    }

    /// Handle onto the bytes accepted so far.
    pub fn reader(&self) -> InMemorySink {
        self.inner.clone()
    }
}

impl DumpSink for FailingSink {
    fn write_all(&mut self, data: &[u8]) -> SinkResult<()> {
        if self.writes_left == 0 {
            return Err(SinkError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        self.writes_left -= 1;
        self.inner.write_all(data)
    }

    fn flush(&mut self) -> SinkResult<()> {
        self.inner.flush()
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }

    fn close(&mut self) -> SinkResult<()> {
        self.inner.close()
    }

    fn describe(&self) -> String {
        format!("failing({})", self.inner.describe())
    }
}

/// A debugger transport that records every chunk it receives.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    /// Chunks in delivery order.
    pub chunks: Vec<Bytes>,
    reject_after: Option<usize>,
}

impl RecordingTransport {
    /// Creates a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that rejects chunks after `accepted` deliveries.
    pub fn rejecting_after(accepted: usize) -> Self {
        Self {
            chunks: Vec::new(),
            reject_after: Some(accepted),
        }
    }

    /// All received bytes, concatenated.
    pub fn data(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }
}

impl DebuggerTransport for RecordingTransport {
    fn send_chunk(&mut self, chunk: Bytes) -> Result<(), String> {
        if self.reject_after.is_some_and(|n| self.chunks.len() >= n) {
            return Err("debugger detached".to_string());
        }
        self.chunks.push(chunk);
        Ok(())
    }
}

/// A path for a dump file inside a fresh temporary directory.
///
/// The directory is removed when the returned guard drops.
pub fn temp_dump_file() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("heap.hprof");
    (dir, path)
}

/// Dumps `heap` into memory and returns the summary and the bytes.
///
/// # Panics
///
/// Panics if the dump fails.
pub fn dump_to_memory(heap: &SyntheticHeap, config: &DumpConfig) -> (DumpSummary, Vec<u8>) {
    let sink = InMemorySink::new();
    let reader = sink.clone();
    let summary = dump_heap_to(config, heap, heap, Box::new(sink)).expect("dump failed");
    (summary, reader.data())
}

/// Dumps `heap` into memory and reads it back.
///
/// # Panics
///
/// Panics if the dump fails or the output does not parse.
pub fn dump_and_read(heap: &SyntheticHeap, config: &DumpConfig) -> HeapDumpView {
    let (_, bytes) = dump_to_memory(heap, config);
    HeapDumpView::read(&bytes).expect("dump does not parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_sink_counts_writes() {
        let mut sink = FailingSink::after_writes(1);
        let reader = sink.reader();
        sink.write_all(b"ok").unwrap();
        assert!(sink.write_all(b"no").is_err());
        assert_eq!(reader.data(), b"ok");
    }

    #[test]
    fn recording_transport_rejects() {
        let mut transport = RecordingTransport::rejecting_after(1);
        transport.send_chunk(Bytes::from_static(b"a")).unwrap();
        assert!(transport.send_chunk(Bytes::from_static(b"b")).is_err());
        assert_eq!(transport.data(), b"a");
    }
}
