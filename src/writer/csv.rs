//! CSV writer with RFC 4180 escaping

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float64Type, Int32Type, Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;

use super::{BatchWriter, OutputFormat, OutputSink, SchemaLock, SinkTarget};
use crate::async_io::SharedIo;
use crate::converter::ColumnarBatch;
use crate::error::{Error, Result};

/// Append a value from an Arrow array in CSV form
fn push_value(out: &mut String, array: &ArrayRef, row: usize) {
    if array.is_null(row) {
        return;
    }

    // Writing into a String cannot fail
    match array.data_type() {
        DataType::Int64 => {
            let _ = write!(out, "{}", array.as_primitive::<Int64Type>().value(row));
        }
        DataType::Int32 => {
            let _ = write!(out, "{}", array.as_primitive::<Int32Type>().value(row));
        }
        DataType::Float64 => {
            let _ = write!(out, "{}", array.as_primitive::<Float64Type>().value(row));
        }
        DataType::Utf8 => push_escaped(out, array.as_string::<i32>().value(row)),
        other => {
            let _ = write!(out, "<{:?}>", other);
        }
    }
}

/// Escape a CSV value according to RFC 4180
fn push_escaped(out: &mut String, value: &str) {
    if value.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

fn push_header(out: &mut String, schema: &SchemaRef) {
    for (i, field) in schema.fields().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_escaped(out, field.name());
    }
    out.push('\n');
}

fn push_rows(out: &mut String, batch: &RecordBatch) {
    for row in 0..batch.num_rows() {
        for (i, column) in batch.columns().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            push_value(out, column, row);
        }
        out.push('\n');
    }
}

pub struct CsvWriter {
    path: PathBuf,
    target: SinkTarget,
    sink: Option<OutputSink>,
    schema: SchemaLock,
    empty_schema: SchemaRef,
    scratch: String,
    rows: u64,
    closed: bool,
}

impl CsvWriter {
    pub fn new(path: &Path, empty_schema: SchemaRef) -> Self {
        Self {
            path: path.to_path_buf(),
            target: SinkTarget::new(path),
            sink: None,
            schema: SchemaLock::new("csv"),
            empty_schema,
            scratch: String::new(),
            rows: 0,
            closed: false,
        }
    }

    fn open(&mut self, schema: &SchemaRef) -> Result<&mut OutputSink> {
        if self.sink.is_none() {
            let mut sink = self.target.open()?;
            let mut header = String::new();
            push_header(&mut header, schema);
            sink.write_all(header.as_bytes())
                .map_err(|e| Error::io(&self.path, e))?;
            self.sink = Some(sink);
        }
        self.sink
            .as_mut()
            .ok_or(Error::InvalidState("csv sink missing after open"))
    }
}

impl BatchWriter for CsvWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Csv
    }

    fn write_batch(&mut self, batch: &ColumnarBatch) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("write to a closed csv writer"));
        }
        let record_batch = batch.record_batch();
        let schema = record_batch.schema();
        self.schema.check(&schema)?;
        if record_batch.num_rows() == 0 {
            return Ok(());
        }

        let mut text = std::mem::take(&mut self.scratch);
        text.clear();
        push_rows(&mut text, record_batch);

        let path = self.path.clone();
        let written = self.open(&schema)?.write_all(text.as_bytes());
        self.scratch = text;
        written.map_err(|e| Error::io(path, e))?;

        self.rows += record_batch.num_rows() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.sink.is_none() {
            let schema = self.empty_schema.clone();
            self.open(&schema)?;
        }
        match self.sink.take() {
            Some(sink) => sink.finish(),
            None => Ok(()),
        }
    }

    fn set_async_context(&mut self, ctx: SharedIo) -> Result<()> {
        self.target.set_async_context(ctx)
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }
}
