//! Sink trait definition.

use crate::error::SinkResult;

/// A byte sink for one heap dump.
///
/// Sinks are **opaque byte streams**. The dump writer hands them fully
/// framed records and never reads anything back.
///
/// # Invariants
///
/// - `write_all` either accepts every byte or fails
/// - `bytes_written` counts bytes accepted so far, flushed or not
/// - `close` flushes pending bytes; writes after `close` fail with
///   [`crate::SinkError::Closed`]
/// - Closing never closes a resource the sink only borrows
///
/// # Implementors
///
/// - [`super::InMemorySink`] - For testing
/// - [`super::FileSink`] - For dump files
/// - [`super::DebuggerSink`] - For a live debugger connection
pub trait DumpSink {
    /// Writes all of `data` to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink is closed or the underlying write fails.
    fn write_all(&mut self, data: &[u8]) -> SinkResult<()>;

    /// Pushes buffered bytes to the underlying destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> SinkResult<()>;

    /// Returns the number of bytes accepted by `write_all` so far.
    fn bytes_written(&self) -> u64;

    /// Flushes and finalizes the sink.
    ///
    /// Calling `close` twice is allowed; the second call does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or sync fails.
    fn close(&mut self) -> SinkResult<()>;

    /// Short human-readable description used in log messages.
    fn describe(&self) -> String;
}

impl<S: DumpSink + ?Sized> DumpSink for Box<S> {
    fn write_all(&mut self, data: &[u8]) -> SinkResult<()> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> SinkResult<()> {
        (**self).flush()
    }

    fn bytes_written(&self) -> u64 {
        (**self).bytes_written()
    }

    fn close(&mut self) -> SinkResult<()> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
