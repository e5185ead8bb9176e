//! Record writer over a dump sink.

use crate::error::{Component, DumpError, DumpResult, Reason};
use hprof_codec::{encode_record_header, FileHeader, RecordBuffer, RecordTag};
use hprof_sink::DumpSink;
use tracing::trace;

/// Frames records and writes them to the sink.
///
/// The writer owns the sink handle. When the sink wraps a borrowed
/// debugger transport, releasing the writer drops the wrapper but leaves
/// the transport open.
pub struct RecordWriter<'a> {
    sink: Option<Box<dyn DumpSink + 'a>>,
    records_written: u64,
}

impl<'a> RecordWriter<'a> {
    /// Creates a writer over `sink`.
    pub fn new(sink: Box<dyn DumpSink + 'a>) -> Self {
        Self {
            sink: Some(sink),
            records_written: 0,
        }
    }

    fn sink(&mut self) -> DumpResult<&mut Box<dyn DumpSink + 'a>> {
        self.sink
            .as_mut()
            .ok_or_else(|| DumpError::misuse(Component::RecordWriter, Reason::ContextReleased))
    }

    /// Writes the file header.
    pub fn write_file_header(&mut self, header: &FileHeader) -> DumpResult<()> {
        self.sink()?
            .write_all(&header.encode())
            .map_err(|e| DumpError::io(Component::RecordWriter, Reason::SinkWrite, e))
    }

    /// Writes one record: header with the exact body length, then the body.
    pub fn write_record(&mut self, tag: RecordTag, time: u32, body: &RecordBuffer) -> DumpResult<()> {
        let length = body
            .length_field()
            .map_err(|e| DumpError::from_codec(Component::RecordWriter, e))?;
        let header = encode_record_header(tag.as_byte(), time, length);

        let sink = self.sink()?;
        sink.write_all(&header)
            .and_then(|()| sink.write_all(body.as_bytes()))
            .map_err(|e| {
                DumpError::io(Component::RecordWriter, Reason::SinkWrite, e)
                    .with_tag(format!("{tag:?}"))
            })?;

        self.records_written += 1;
        trace!(?tag, time, length, "record written");
        Ok(())
    }

    /// Flushes the sink.
    pub fn flush(&mut self) -> DumpResult<()> {
        self.sink()?
            .flush()
            .map_err(|e| DumpError::io(Component::RecordWriter, Reason::SinkFlush, e))
    }

    /// Flushes and closes the sink.
    pub fn close(&mut self) -> DumpResult<()> {
        self.sink()?
            .close()
            .map_err(|e| DumpError::io(Component::RecordWriter, Reason::SinkFlush, e))
    }

    /// Drops the sink handle without closing it explicitly.
    pub fn release(&mut self) {
        self.sink = None;
    }

    /// Returns `true` until [`RecordWriter::release`] is called.
    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Number of records written.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Number of bytes accepted by the sink, header included.
    pub fn bytes_written(&self) -> u64 {
        self.sink.as_ref().map_or(0, |s| s.bytes_written())
    }

    /// Description of the sink for log messages.
    pub fn describe(&self) -> String {
        self.sink
            .as_ref()
            .map_or_else(|| "released sink".to_string(), |s| s.describe())
    }
}

impl std::fmt::Debug for RecordWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWriter")
            .field("sink", &self.describe())
            .field("records_written", &self.records_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hprof_sink::InMemorySink;

    #[test]
    fn record_length_matches_body() {
        let sink = InMemorySink::new();
        let mut writer = RecordWriter::new(Box::new(sink.clone()));

        let mut body = RecordBuffer::new();
        body.add_id(0x40_0000).unwrap();
        body.add_utf8("name").unwrap();
        writer.write_record(RecordTag::String, 3, &body).unwrap();

        let data = sink.data();
        assert_eq!(data[0], 0x01);
        assert_eq!(&data[1..5], &3u32.to_be_bytes());
        assert_eq!(&data[5..9], &8u32.to_be_bytes());
        assert_eq!(&data[9..], &[0, 0x40, 0, 0, b'n', b'a', b'm', b'e']);
        assert_eq!(writer.records_written(), 1);
        assert_eq!(writer.bytes_written(), 17);
    }

    #[test]
    fn empty_body_record() {
        let sink = InMemorySink::new();
        let mut writer = RecordWriter::new(Box::new(sink.clone()));
        writer
            .write_record(RecordTag::HeapDumpEnd, 0, &RecordBuffer::new())
            .unwrap();
        assert_eq!(sink.data(), vec![0x2C, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn write_after_close_is_io_failure() {
        let sink = InMemorySink::new();
        let mut writer = RecordWriter::new(Box::new(sink));
        writer.close().unwrap();
        let err = writer
            .write_record(RecordTag::HeapDumpEnd, 0, &RecordBuffer::new())
            .unwrap_err();
        assert!(matches!(err, DumpError::IoFailure { .. }));
    }

    #[test]
    fn released_writer_is_misuse() {
        let mut writer = RecordWriter::new(Box::new(InMemorySink::new()));
        writer.release();
        assert!(!writer.is_open());
        let err = writer.flush().unwrap_err();
        assert_eq!(err.site().reason, Reason::ContextReleased);
        assert_eq!(writer.bytes_written(), 0);
    }
}
