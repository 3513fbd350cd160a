use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use pubsubgen_core::Record;

use crate::errors::SinkError;
use crate::output::{CountingWriter, RecordSink, SharedWriter, create_file};

/// Compact pub/sub text form, one record per line:
/// `{(city,=,"Cluj");(temp,>=,10)}`.
pub struct TextSink<W: Write + Send = BufWriter<File>> {
    inner: SharedWriter<W>,
}

impl TextSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Ok(Self::new(create_file(path)?))
    }
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: SharedWriter::new(CountingWriter::new(writer)),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }
}

impl<W: Write + Send> RecordSink for TextSink<W> {
    fn append(&self, record: &Record) -> Result<(), SinkError> {
        let line = format!("{record}\n");
        self.inner.append(|writer, _| {
            writer.write_all(line.as_bytes())?;
            Ok(())
        })
    }

    fn close(&self) -> Result<(), SinkError> {
        self.inner.close(|_| Ok(()))
    }
}
