use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use pubsubgen_core::Record;

use crate::errors::SinkError;
use crate::output::{CountingWriter, RecordSink, SharedWriter, create_file};

/// One JSON object per line.
pub struct JsonLinesSink<W: Write + Send = BufWriter<File>> {
    inner: SharedWriter<W>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Ok(Self::new(create_file(path)?))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: SharedWriter::new(CountingWriter::new(writer)),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn append(&self, record: &Record) -> Result<(), SinkError> {
        let line = serde_json::to_vec(record)?;
        self.inner.append(|writer, _| {
            writer.write_all(&line)?;
            writer.write_all(b"\n")?;
            Ok(())
        })
    }

    fn close(&self) -> Result<(), SinkError> {
        self.inner.close(|_| Ok(()))
    }
}

/// A single JSON array; `[` is written on open and `]` on close.
pub struct JsonArraySink<W: Write + Send = BufWriter<File>> {
    inner: SharedWriter<W>,
}

impl JsonArraySink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Self::new(create_file(path)?)
    }
}

impl<W: Write + Send> JsonArraySink<W> {
    pub fn new(writer: W) -> Result<Self, SinkError> {
        let mut writer = CountingWriter::new(writer);
        writer.write_all(b"[")?;
        Ok(Self {
            inner: SharedWriter::new(writer),
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }
}

impl<W: Write + Send> RecordSink for JsonArraySink<W> {
    fn append(&self, record: &Record) -> Result<(), SinkError> {
        let item = serde_json::to_vec(record)?;
        self.inner.append(|writer, written| {
            writer.write_all(if written == 0 { b"\n" } else { b",\n" })?;
            writer.write_all(&item)?;
            Ok(())
        })
    }

    fn close(&self) -> Result<(), SinkError> {
        self.inner.close(|writer| {
            writer.write_all(b"\n]\n")?;
            Ok(())
        })
    }
}
