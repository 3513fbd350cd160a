//! Record sinks.
//!
//! Every sink serializes `append` calls behind a mutex so generator workers
//! can share one instance, and refuses any call once `close` has run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use pubsubgen_core::Record;

use crate::errors::SinkError;

mod json;
mod text;

pub use json::{JsonArraySink, JsonLinesSink};
pub use text::TextSink;

/// Destination for generated records.
pub trait RecordSink: Send + Sync {
    /// Write one record. Each call is atomic with respect to other callers.
    fn append(&self, record: &Record) -> Result<(), SinkError>;

    /// Flush and release the sink. A second call fails with
    /// [`SinkError::Closed`].
    fn close(&self) -> Result<(), SinkError>;
}

/// Output encodings for file sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    JsonLines,
    JsonArray,
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::JsonLines => "ndjson",
            OutputFormat::JsonArray => "json",
            OutputFormat::Text => "txt",
        }
    }

    /// Create a file sink of this format at `path`.
    pub fn create_sink(&self, path: &Path) -> Result<Box<dyn RecordSink>, SinkError> {
        Ok(match self {
            OutputFormat::JsonLines => Box::new(JsonLinesSink::create(path)?),
            OutputFormat::JsonArray => Box::new(JsonArraySink::create(path)?),
            OutputFormat::Text => Box::new(TextSink::create(path)?),
        })
    }
}

pub(crate) fn create_file(path: &Path) -> Result<BufWriter<File>, SinkError> {
    Ok(BufWriter::new(File::create(path)?))
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, SinkError> {
    mutex.lock().map_err(|_| SinkError::Poisoned)
}

/// Writer wrapper tracking how many bytes went through it.
#[derive(Debug)]
pub(crate) struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

struct WriterState<W: Write> {
    writer: Option<CountingWriter<W>>,
    records: u64,
    bytes: u64,
}

/// Mutex-guarded writer shared by the file sinks.
pub(crate) struct SharedWriter<W: Write> {
    state: Mutex<WriterState<W>>,
}

impl<W: Write> SharedWriter<W> {
    pub(crate) fn new(writer: CountingWriter<W>) -> Self {
        Self {
            state: Mutex::new(WriterState {
                writer: Some(writer),
                records: 0,
                bytes: 0,
            }),
        }
    }

    /// Run `write` with the writer and the number of records written before
    /// this one.
    pub(crate) fn append<F>(&self, write: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut CountingWriter<W>, u64) -> Result<(), SinkError>,
    {
        let mut state = lock(&self.state)?;
        let records = state.records;
        let writer = state.writer.as_mut().ok_or(SinkError::Closed)?;
        write(writer, records)?;
        state.records += 1;
        Ok(())
    }

    /// Run `finish` once, flush, and drop the writer.
    pub(crate) fn close<F>(&self, finish: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut CountingWriter<W>) -> Result<(), SinkError>,
    {
        let mut state = lock(&self.state)?;
        let mut writer = state.writer.take().ok_or(SinkError::Closed)?;
        let result = finish(&mut writer).and_then(|()| writer.flush().map_err(SinkError::from));
        state.bytes = writer.bytes_written();
        result
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.state.lock().map_or(0, |state| match &state.writer {
            Some(writer) => writer.bytes_written(),
            None => state.bytes,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    closed: bool,
    close_calls: usize,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records appended so far.
    pub fn records(&self) -> Vec<Record> {
        self.state
            .lock()
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |state| state.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.closed)
    }

    /// Number of `close` calls, including rejected ones.
    pub fn close_calls(&self) -> usize {
        self.state.lock().map_or(0, |state| state.close_calls)
    }
}

impl RecordSink for MemorySink {
    fn append(&self, record: &Record) -> Result<(), SinkError> {
        let mut state = lock(&self.state)?;
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.records.push(record.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        let mut state = lock(&self.state)?;
        state.close_calls += 1;
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}
