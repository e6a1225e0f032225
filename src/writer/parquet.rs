//! Parquet writer built on `ArrowWriter`

use std::path::Path;

use ::parquet::arrow::ArrowWriter;
use ::parquet::basic::Compression;
use ::parquet::file::properties::WriterProperties;
use arrow::datatypes::SchemaRef;
use tracing::debug;

use super::{BatchWriter, OutputFormat, OutputSink, SchemaLock, SinkTarget};
use crate::async_io::SharedIo;
use crate::constants::PARQUET_ROW_GROUP_ROWS;
use crate::converter::ColumnarBatch;
use crate::error::{Error, Result};

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(PARQUET_ROW_GROUP_ROWS)
        .build()
}

pub struct ParquetWriter {
    target: SinkTarget,
    writer: Option<ArrowWriter<OutputSink>>,
    schema: SchemaLock,
    empty_schema: SchemaRef,
    rows: u64,
    closed: bool,
}

impl ParquetWriter {
    pub fn new(path: &Path, empty_schema: SchemaRef) -> Self {
        Self {
            target: SinkTarget::new(path),
            writer: None,
            schema: SchemaLock::new("parquet"),
            empty_schema,
            rows: 0,
            closed: false,
        }
    }

    fn open(&mut self, schema: SchemaRef) -> Result<&mut ArrowWriter<OutputSink>> {
        if self.writer.is_none() {
            let sink = self.target.open()?;
            self.writer = Some(ArrowWriter::try_new(sink, schema, Some(writer_properties()))?);
        }
        self.writer
            .as_mut()
            .ok_or(Error::InvalidState("parquet writer missing after open"))
    }
}

impl BatchWriter for ParquetWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Parquet
    }

    fn write_batch(&mut self, batch: &ColumnarBatch) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("write to a closed parquet writer"));
        }
        let record_batch = batch.record_batch();
        let schema = record_batch.schema();
        self.schema.check(&schema)?;
        if record_batch.num_rows() == 0 {
            return Ok(());
        }

        self.open(schema)?.write(record_batch)?;
        self.rows += record_batch.num_rows() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.writer.is_none() {
            let schema = self.empty_schema.clone();
            self.open(schema)?;
        }
        if let Some(writer) = self.writer.take() {
            // The footer is in the sink; finishing flushes it and, for async
            // output, waits for the handle to drain.
            writer.into_inner()?.finish()?;
            debug!("Parquet file closed after {} rows", self.rows);
        }
        Ok(())
    }

    fn set_async_context(&mut self, ctx: SharedIo) -> Result<()> {
        self.target.set_async_context(ctx)
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_io::{shared, BackendKind, IoContextConfig, SharedIoContext};
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]))
    }

    fn batch(start: i64, n: i64) -> ColumnarBatch {
        let ids: Vec<i64> = (start..start + n).collect();
        let names: Vec<String> = ids.iter().map(|i| format!("name-{}", i)).collect();
        ColumnarBatch::Owned(
            RecordBatch::try_new(
                schema(),
                vec![
                    Arc::new(Int64Array::from(ids)),
                    Arc::new(StringArray::from(names)),
                ],
            )
            .unwrap(),
        )
    }

    fn read_back(path: &Path) -> Vec<RecordBatch> {
        let file = File::open(path).unwrap();
        ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let mut writer = ParquetWriter::new(&path, schema());
        writer.write_batch(&batch(0, 100)).unwrap();
        writer.write_batch(&batch(100, 50)).unwrap();
        writer.close().unwrap();

        let batches = read_back(&path);
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 150);
        assert_eq!(writer.rows_written(), 150);
    }

    #[test]
    fn test_parquet_through_shared_context() {
        let dir = tempdir().unwrap();
        let blocking = dir.path().join("blocking.parquet");
        let queued = dir.path().join("queued.parquet");
        let ctx = shared(
            SharedIoContext::new(IoContextConfig::default().with_backend(BackendKind::Auto)).unwrap(),
        );

        let mut a = ParquetWriter::new(&blocking, schema());
        let mut b = ParquetWriter::new(&queued, schema());
        b.set_async_context(ctx.clone()).unwrap();
        for start in [0, 1000, 2000] {
            a.write_batch(&batch(start, 1000)).unwrap();
            b.write_batch(&batch(start, 1000)).unwrap();
        }
        a.close().unwrap();
        b.close().unwrap();

        assert_eq!(std::fs::read(&blocking).unwrap(), std::fs::read(&queued).unwrap());
        assert_eq!(crate::async_io::lock(&ctx).unwrap().pending_count(), 0);
    }

    #[test]
    fn test_async_context_after_first_batch_is_rejected() {
        let dir = tempdir().unwrap();
        let ctx = shared(
            SharedIoContext::new(IoContextConfig::default().with_backend(BackendKind::Sync)).unwrap(),
        );
        let mut writer = ParquetWriter::new(&dir.path().join("late.parquet"), schema());
        writer.write_batch(&batch(0, 3)).unwrap();
        assert!(matches!(
            writer.set_async_context(ctx),
            Err(Error::InvalidState(_))
        ));
        writer.close().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_device_fails_as_io_error() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let mut writer = ParquetWriter::new(full, schema());
        let err = writer
            .write_batch(&batch(0, 500))
            .and_then(|_| writer.close())
            .unwrap_err();
        assert_eq!(err.exit_code(), 4, "{}", err);
        assert_eq!(Error::describe_exit_code(err.exit_code()), "I/O error");
    }

    #[test]
    fn test_empty_parquet_has_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        let mut writer = ParquetWriter::new(&path, schema());
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.schema().fields().len(), 2);
        assert_eq!(builder.metadata().file_metadata().num_rows(), 0);
    }
}
