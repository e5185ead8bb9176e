//! File-based sink for dump artifacts.

use crate::error::{SinkError, SinkResult};
use crate::sink::DumpSink;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A file-based sink.
///
/// The file is created (or truncated) when the sink is opened. Writes go
/// through a buffered writer.
///
/// # Durability
///
/// - `flush()` pushes buffered bytes to the OS
/// - `close()` flushes and calls `File::sync_all()`
///
/// A failed dump leaves the partially written file in place; removing it
/// is the caller's job.
///
/// # Example
///
/// ```no_run
/// use hprof_sink::{DumpSink, FileSink};
/// use std::path::Path;
///
/// let mut sink = FileSink::create(Path::new("heap.hprof")).unwrap();
/// sink.write_all(b"JAVA PROFILE 1.0.3\0").unwrap();
/// sink.close().unwrap();
/// ```
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileSink {
    /// Creates the file at `path`, truncating any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> SinkResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Creates the file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be created.
    pub fn create_with_dirs(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::create(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DumpSink for FileSink {
    fn write_all(&mut self, data: &[u8]) -> SinkResult<()> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.flush()?;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn close(&mut self) -> SinkResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
