//! Output writers: columnar batches to files.
//!
//! A writer either owns a buffered file or, after
//! [`BatchWriter::set_async_context`], registers its path with a shared I/O
//! context and enqueues its bytes there. Every writer locks the schema of its
//! first batch and rejects later batches with a different layout.
//!
//! CSV, Parquet and Arrow IPC produce one file per table. Iceberg produces a
//! table directory with parquet data files and JSON metadata.

pub mod csv;
pub mod iceberg;
pub mod ipc;
pub mod parquet;

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use arrow::datatypes::SchemaRef;

use crate::async_io::{AsyncSink, SharedIo};
use crate::constants::SINK_CHUNK_SIZE;
use crate::converter::ColumnarBatch;
use crate::error::{Error, Result};
use crate::tables::Table;

pub use self::csv::CsvWriter;
pub use self::iceberg::IcebergWriter;
pub use self::ipc::IpcWriter;
pub use self::parquet::ParquetWriter;

/// A sink for the columnar batches of one table
///
/// Writers open their output lazily on the first non-empty batch, so a
/// context attached with `set_async_context` before that point receives every
/// byte. Nothing is guaranteed on disk until `close` returns.
pub trait BatchWriter: Send {
    fn format(&self) -> OutputFormat;

    /// Append one batch
    ///
    /// The first batch locks the schema. A managed batch is only borrowed for
    /// the call; the writer keeps no reference to its buffers afterwards.
    ///
    /// # Arguments
    /// * `batch` - Rows to append; an empty batch only checks the schema
    ///
    /// # Returns
    /// `SchemaMismatch` if the layout differs from the locked one,
    /// `InvalidState` after close, or the error of the underlying sink
    fn write_batch(&mut self, batch: &ColumnarBatch) -> Result<()>;

    /// Finish the output and release its file.
    ///
    /// Writes the footer or metadata, flushes, and with a shared context waits
    /// for this output's pending writes. A writer that saw no rows still
    /// produces a valid empty output. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Route output through `ctx`. Only allowed before the first batch.
    ///
    /// # Returns
    /// `InvalidState` once the output has been opened
    fn set_async_context(&mut self, ctx: SharedIo) -> Result<()>;

    fn rows_written(&self) -> u64;
}

/// Output format, parsed from the CLI as `csv`, `parquet`, `arrow` (or `ipc`)
/// and `iceberg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Csv,
    #[default]
    Parquet,
    ArrowIpc,
    Iceberg,
}

impl OutputFormat {
    /// Suffix of the table's output path. For Iceberg it names a directory.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
            OutputFormat::ArrowIpc => "arrow",
            OutputFormat::Iceberg => "iceberg",
        }
    }

    /// Whether the output is a directory rather than a single file
    pub fn is_directory(self) -> bool {
        matches!(self, OutputFormat::Iceberg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            "arrow" | "ipc" => Ok(OutputFormat::ArrowIpc),
            "iceberg" => Ok(OutputFormat::Iceberg),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Where a table's output goes
///
/// # Arguments
/// * `dir` - Output directory of the run
/// * `table` - Table being written
/// * `format` - Decides the extension
///
/// # Returns
/// `<dir>/<table>.<ext>`, a file or (for Iceberg) a directory
pub fn output_path(dir: &Path, table: Table, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", table.name(), format.extension()))
}

/// Build a writer for `path`
///
/// Nothing is created on disk until the first batch or `close`.
///
/// # Arguments
/// * `format` - Which writer to build
/// * `path` - Output file, or table directory for Iceberg
/// * `schema` - Table schema, used only when no batch arrives
///
/// # Returns
/// The writer, boxed so callers can pick the format at runtime
pub fn create_writer(format: OutputFormat, path: &Path, schema: SchemaRef) -> Box<dyn BatchWriter> {
    match format {
        OutputFormat::Csv => Box::new(CsvWriter::new(path, schema)),
        OutputFormat::Parquet => Box::new(ParquetWriter::new(path, schema)),
        OutputFormat::ArrowIpc => Box::new(IpcWriter::new(path, schema)),
        OutputFormat::Iceberg => Box::new(IcebergWriter::new(path, schema)),
    }
}

/// Bytes on disk under `path`: the file size, or the sum over a table directory.
pub fn output_size(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path).map_err(|e| Error::io(path, e))? {
        let entry = entry.map_err(|e| Error::io(path, e))?;
        total += output_size(&entry.path())?;
    }
    Ok(total)
}

/// Holds the schema seen first and compares later ones against it
pub(crate) struct SchemaLock {
    writer: &'static str,
    locked: Option<SchemaRef>,
}

impl SchemaLock {
    pub(crate) fn new(writer: &'static str) -> Self {
        Self {
            writer,
            locked: None,
        }
    }

    pub(crate) fn locked(&self) -> Option<&SchemaRef> {
        self.locked.as_ref()
    }

    pub(crate) fn check(&mut self, schema: &SchemaRef) -> Result<()> {
        match &self.locked {
            None => {
                self.locked = Some(schema.clone());
                Ok(())
            }
            Some(locked) if locked.fields() == schema.fields() => Ok(()),
            Some(locked) => Err(Error::SchemaMismatch {
                writer: self.writer,
                expected: describe(locked),
                found: describe(schema),
            }),
        }
    }
}

fn describe(schema: &SchemaRef) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}:{:?}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where a writer's bytes go, decided when the first batch arrives
pub(crate) struct SinkTarget {
    path: PathBuf,
    ctx: Option<SharedIo>,
    opened: bool,
}

impl SinkTarget {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ctx: None,
            opened: false,
        }
    }

    pub(crate) fn set_async_context(&mut self, ctx: SharedIo) -> Result<()> {
        if self.opened {
            return Err(Error::InvalidState(
                "async context must be set before the first batch",
            ));
        }
        self.ctx = Some(ctx);
        Ok(())
    }

    pub(crate) fn open(&mut self) -> Result<OutputSink> {
        self.opened = true;
        match &self.ctx {
            Some(ctx) => Ok(OutputSink::Async(AsyncSink::open(ctx.clone(), &self.path)?)),
            None => {
                let file = File::create(&self.path).map_err(|e| Error::io(&self.path, e))?;
                Ok(OutputSink::Blocking {
                    writer: BufWriter::with_capacity(SINK_CHUNK_SIZE, file),
                    path: self.path.clone(),
                })
            }
        }
    }
}

/// Byte destination of a writer: a buffered file, or a shared I/O context
///
/// `finish` must be called to surface errors. Dropping a sink flushes on a
/// best-effort basis and loses the error.
pub enum OutputSink {
    Blocking {
        writer: BufWriter<File>,
        path: PathBuf,
    },
    Async(AsyncSink),
}

impl OutputSink {
    /// Flush remaining bytes and close the file
    ///
    /// For the async variant this waits until the context has written every
    /// byte of this file and closes its handle.
    pub fn finish(self) -> Result<()> {
        match self {
            OutputSink::Blocking { writer, path } => {
                writer
                    .into_inner()
                    .map_err(|e| Error::io(&path, e.into_error()))?;
                Ok(())
            }
            OutputSink::Async(sink) => sink.finish(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Blocking { writer, .. } => writer.write(buf),
            OutputSink::Async(sink) => sink.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            OutputSink::Blocking { writer, .. } => writer.write_all(buf),
            OutputSink::Async(sink) => sink.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Blocking { writer, .. } => writer.flush(),
            OutputSink::Async(sink) => sink.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/data"), Table::LineItem, OutputFormat::Parquet);
        assert_eq!(path, PathBuf::from("/data/lineitem.parquet"));
        let path = output_path(Path::new("out"), Table::Region, OutputFormat::ArrowIpc);
        assert_eq!(path, PathBuf::from("out/region.arrow"));
    }

    #[test]
    fn test_schema_lock() {
        let a = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let b = Arc::new(Schema::new(vec![Field::new("x", DataType::Utf8, false)]));
        let mut lock = SchemaLock::new("test");
        lock.check(&a).unwrap();
        lock.check(&a.clone()).unwrap();
        let err = lock.check(&b).unwrap_err();
        match err {
            Error::SchemaMismatch { expected, found, .. } => {
                assert_eq!(expected, "x:Int64");
                assert_eq!(found, "x:Utf8");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("ipc".parse::<OutputFormat>().unwrap(), OutputFormat::ArrowIpc);
        assert_eq!("Iceberg".parse::<OutputFormat>().unwrap(), OutputFormat::Iceberg);
        assert!("orc".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_iceberg_output_is_a_directory() {
        let path = output_path(Path::new("out"), Table::Part, OutputFormat::Iceberg);
        assert_eq!(path, PathBuf::from("out/part.iceberg"));
        assert!(OutputFormat::Iceberg.is_directory());
        assert!(!OutputFormat::Csv.is_directory());
    }

    #[test]
    fn test_output_size_sums_directories() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("t.iceberg");
        fs::create_dir_all(table.join("data")).unwrap();
        fs::write(table.join("data/a.parquet"), [0u8; 100]).unwrap();
        fs::write(table.join("v.json"), [0u8; 23]).unwrap();
        assert_eq!(output_size(&table).unwrap(), 123);
        assert_eq!(output_size(&table.join("v.json")).unwrap(), 23);
        assert!(output_size(&dir.path().join("missing")).is_err());
    }
}
