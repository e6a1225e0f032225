//! Arrow IPC file writer

use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::ipc::writer::FileWriter;

use super::{BatchWriter, OutputFormat, OutputSink, SchemaLock, SinkTarget};
use crate::async_io::SharedIo;
use crate::converter::ColumnarBatch;
use crate::error::{Error, Result};

pub struct IpcWriter {
    target: SinkTarget,
    writer: Option<FileWriter<OutputSink>>,
    schema: SchemaLock,
    empty_schema: SchemaRef,
    rows: u64,
    closed: bool,
}

impl IpcWriter {
    pub fn new(path: &Path, empty_schema: SchemaRef) -> Self {
        Self {
            target: SinkTarget::new(path),
            writer: None,
            schema: SchemaLock::new("arrow"),
            empty_schema,
            rows: 0,
            closed: false,
        }
    }

    fn open(&mut self, schema: &SchemaRef) -> Result<&mut FileWriter<OutputSink>> {
        if self.writer.is_none() {
            let sink = self.target.open()?;
            self.writer = Some(FileWriter::try_new(sink, schema)?);
        }
        self.writer
            .as_mut()
            .ok_or(Error::InvalidState("ipc writer missing after open"))
    }
}

impl BatchWriter for IpcWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::ArrowIpc
    }

    fn write_batch(&mut self, batch: &ColumnarBatch) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("write to a closed arrow writer"));
        }
        let record_batch = batch.record_batch();
        let schema = record_batch.schema();
        self.schema.check(&schema)?;
        if record_batch.num_rows() == 0 {
            return Ok(());
        }

        self.open(&schema)?.write(record_batch)?;
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
            self.open(&schema)?;
        }
        match self.writer.take() {
            // into_inner writes the footer before handing the sink back
            Some(writer) => writer.into_inner()?.finish(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_io::{shared, BackendKind, IoContextConfig, SharedIoContext};
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::reader::FileReader;
    use arrow::record_batch::RecordBatch;
    use std::fs::File;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_ipc_round_trip_through_context() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.arrow");
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        let ctx = shared(
            SharedIoContext::new(IoContextConfig::default().with_backend(BackendKind::Sync)).unwrap(),
        );

        let mut writer = IpcWriter::new(&path, schema.clone());
        writer.set_async_context(ctx).unwrap();
        for start in [0i64, 10] {
            let values: Vec<i64> = (start..start + 10).collect();
            let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(values))]).unwrap();
            writer.write_batch(&ColumnarBatch::Owned(batch)).unwrap();
        }
        writer.close().unwrap();

        let reader = FileReader::try_new(File::open(&path).unwrap(), None).unwrap();
        let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].num_rows(), 10);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_device_fails_as_io_error() {
        let full = std::path::Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from((0..1000).collect::<Vec<i64>>()))],
        )
        .unwrap();

        let mut writer = IpcWriter::new(full, schema);
        let err = writer
            .write_batch(&ColumnarBatch::Owned(batch))
            .and_then(|_| writer.close())
            .unwrap_err();
        assert_eq!(err.exit_code(), 4, "{}", err);
    }
}
