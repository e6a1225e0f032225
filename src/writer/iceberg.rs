//! Iceberg-style table directory: parquet data files plus JSON metadata.
//!
//! ```text
//! <table>.iceberg/
//!   data/data_00000.parquet
//!   data/data_00001.parquet
//!   metadata/manifest-1.json
//!   metadata/snap-<id>.manifest-list.json
//!   metadata/v1.metadata.json
//!   metadata/version-hint.text
//! ```
//!
//! Every data file is written by a [`ParquetWriter`], so data goes through the
//! shared I/O context when one is set. The metadata is written once, on close,
//! with one snapshot that appends all data files.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use arrow::datatypes::{DataType, Field, SchemaRef};
use serde::Serialize;
use tracing::debug;

use super::{BatchWriter, OutputFormat, ParquetWriter, SchemaLock, SinkTarget};
use crate::async_io::SharedIo;
use crate::constants::ICEBERG_ROWS_PER_FILE;
use crate::converter::ColumnarBatch;
use crate::error::{Error, Result};

const MANIFEST_PATH: &str = "metadata/manifest-1.json";

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct TableMetadata<'a> {
    format_version: u8,
    table_uuid: String,
    location: String,
    last_updated_ms: i64,
    last_column_id: usize,
    schema: TableSchema<'a>,
    current_snapshot_id: i64,
    snapshots: Vec<Snapshot>,
    snapshot_log: Vec<SnapshotLogEntry>,
    metadata_log: Vec<serde_json::Value>,
    sort_orders: Vec<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct TableSchema<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    schema_id: u32,
    fields: Vec<SchemaField<'a>>,
}

#[derive(Serialize)]
struct SchemaField<'a> {
    id: usize,
    name: &'a str,
    required: bool,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Snapshot {
    snapshot_id: i64,
    timestamp_ms: i64,
    summary: BTreeMap<&'static str, String>,
    manifest_list: String,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct SnapshotLogEntry {
    snapshot_id: i64,
    timestamp_ms: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Manifest<'a> {
    version: u8,
    manifest_path: &'static str,
    content: &'static str,
    files: Vec<ManifestEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestEntry<'a> {
    status: &'static str,
    snapshot_id: i64,
    data_file: DataFileEntry<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct DataFileEntry<'a> {
    file_path: String,
    file_format: &'static str,
    spec_id: u32,
    partition: BTreeMap<&'a str, String>,
    record_count: u64,
    file_size_in_bytes: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestList {
    version: u8,
    snapshot_id: i64,
    manifests: Vec<ManifestFile>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ManifestFile {
    manifest_path: &'static str,
    manifest_length: u64,
    partition_spec_id: u32,
    content: &'static str,
    added_snapshot_id: i64,
    added_files_count: usize,
    added_rows_count: u64,
}

/// Iceberg primitive type name for an Arrow field
fn iceberg_type(field: &Field) -> Result<&'static str> {
    match field.data_type() {
        DataType::Boolean => Ok("boolean"),
        DataType::Int32 => Ok("int"),
        DataType::Int64 => Ok("long"),
        DataType::Float32 => Ok("float"),
        DataType::Float64 => Ok("double"),
        DataType::Utf8 | DataType::LargeUtf8 => Ok("string"),
        DataType::Date32 => Ok("date"),
        other => Err(Error::UnsupportedType {
            format: "iceberg",
            column: field.name().clone(),
            data_type: format!("{:?}", other),
        }),
    }
}

fn table_uuid() -> String {
    let hex = format!("{:032x}", rand::random::<u128>());
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// A finished data file, as the manifest lists it
struct DataFile {
    name: String,
    rows: u64,
    bytes: u64,
}

pub struct IcebergWriter {
    table_path: PathBuf,
    ctx: Option<SharedIo>,
    schema: SchemaLock,
    empty_schema: SchemaRef,
    current: Option<(String, ParquetWriter)>,
    current_rows: u64,
    data_files: Vec<DataFile>,
    rows_per_file: u64,
    rows: u64,
    started: bool,
    closed: bool,
}

impl IcebergWriter {
    /// Write a table directory at `table_path`.
    ///
    /// Nothing touches the filesystem until the first batch, or `close` for a
    /// table with no rows. `empty_schema` describes the table in that case.
    pub fn new(table_path: &Path, empty_schema: SchemaRef) -> Self {
        Self {
            table_path: table_path.to_path_buf(),
            ctx: None,
            schema: SchemaLock::new("iceberg"),
            empty_schema,
            current: None,
            current_rows: 0,
            data_files: Vec::new(),
            rows_per_file: ICEBERG_ROWS_PER_FILE,
            rows: 0,
            started: false,
            closed: false,
        }
    }

    /// Start a new data file once the current one holds at least `rows`.
    /// Files only roll between batches.
    pub fn with_rows_per_file(mut self, rows: u64) -> Self {
        self.rows_per_file = rows.max(1);
        self
    }

    pub fn data_file_count(&self) -> usize {
        self.data_files.len() + usize::from(self.current.is_some())
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            for dir in ["data", "metadata"] {
                let path = self.table_path.join(dir);
                // A rerun must not leave data files the new manifest omits
                if path.is_dir() {
                    fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
                }
                fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            }
            self.started = true;
        }
        Ok(())
    }

    fn data_writer(&mut self) -> Result<&mut ParquetWriter> {
        if self.current.is_none() {
            let name = format!("data_{:05}.parquet", self.data_files.len());
            let path = self.table_path.join("data").join(&name);
            let mut writer = ParquetWriter::new(&path, self.empty_schema.clone());
            if let Some(ctx) = &self.ctx {
                writer.set_async_context(ctx.clone())?;
            }
            self.current = Some((name, writer));
            self.current_rows = 0;
        }
        self.current
            .as_mut()
            .map(|(_, writer)| writer)
            .ok_or(Error::InvalidState("iceberg data file missing after open"))
    }

    /// Close the open data file, if any, and record it for the manifest.
    fn roll(&mut self) -> Result<()> {
        if let Some((name, mut writer)) = self.current.take() {
            writer.close()?;
            let path = self.table_path.join("data").join(&name);
            let bytes = fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();
            debug!(
                "Iceberg data file {} done: {} rows, {} bytes",
                path.display(),
                writer.rows_written(),
                bytes
            );
            self.data_files.push(DataFile {
                name,
                rows: writer.rows_written(),
                bytes,
            });
        }
        Ok(())
    }

    fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        self.write_metadata_file(relative, &bytes)
    }

    fn write_metadata_file(&self, relative: &str, bytes: &[u8]) -> Result<()> {
        let path = self.table_path.join(relative);
        let mut target = SinkTarget::new(&path);
        if let Some(ctx) = &self.ctx {
            target.set_async_context(ctx.clone())?;
        }
        let mut sink = target.open()?;
        sink.write_all(bytes).map_err(|e| Error::io(&path, e))?;
        sink.finish()
    }

    fn write_metadata(&self) -> Result<()> {
        let schema = self
            .schema
            .locked()
            .cloned()
            .unwrap_or_else(|| self.empty_schema.clone());
        let fields = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                Ok(SchemaField {
                    id: i + 1,
                    name: field.name(),
                    required: !field.is_nullable(),
                    kind: iceberg_type(field)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let snapshot_id = now_ms;
        let manifest_list = format!("metadata/snap-{}.manifest-list.json", snapshot_id);

        let manifest = Manifest {
            version: 1,
            manifest_path: MANIFEST_PATH,
            content: "data",
            files: self
                .data_files
                .iter()
                .map(|file| ManifestEntry {
                    status: "ADDED",
                    snapshot_id,
                    data_file: DataFileEntry {
                        file_path: format!("data/{}", file.name),
                        file_format: "PARQUET",
                        spec_id: 0,
                        partition: BTreeMap::new(),
                        record_count: file.rows,
                        file_size_in_bytes: file.bytes,
                    },
                })
                .collect(),
        };
        self.write_json(MANIFEST_PATH, &manifest)?;

        let list = ManifestList {
            version: 1,
            snapshot_id,
            manifests: vec![ManifestFile {
                manifest_path: MANIFEST_PATH,
                manifest_length: 0,
                partition_spec_id: 0,
                content: "data",
                added_snapshot_id: snapshot_id,
                added_files_count: self.data_files.len(),
                added_rows_count: self.rows,
            }],
        };
        self.write_json(&manifest_list, &list)?;

        let mut summary = BTreeMap::new();
        summary.insert("operation", "append".to_string());
        summary.insert("added-data-files", self.data_files.len().to_string());
        summary.insert("added-records", self.rows.to_string());

        let last_column_id = fields.len();
        let metadata = TableMetadata {
            format_version: 1,
            table_uuid: table_uuid(),
            location: self.table_path.display().to_string(),
            last_updated_ms: now_ms,
            last_column_id,
            schema: TableSchema {
                kind: "struct",
                schema_id: 0,
                fields,
            },
            current_snapshot_id: snapshot_id,
            snapshots: vec![Snapshot {
                snapshot_id,
                timestamp_ms: now_ms,
                summary,
                manifest_list,
            }],
            snapshot_log: vec![SnapshotLogEntry {
                snapshot_id,
                timestamp_ms: now_ms,
            }],
            metadata_log: Vec::new(),
            sort_orders: Vec::new(),
        };
        self.write_json("metadata/v1.metadata.json", &metadata)?;
        self.write_metadata_file("metadata/version-hint.text", b"1\n")
    }
}

impl BatchWriter for IcebergWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Iceberg
    }

    fn write_batch(&mut self, batch: &ColumnarBatch) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("write to a closed iceberg writer"));
        }
        let record_batch = batch.record_batch();
        self.schema.check(&record_batch.schema())?;
        let n = record_batch.num_rows() as u64;
        if n == 0 {
            return Ok(());
        }

        self.start()?;
        self.data_writer()?.write_batch(batch)?;
        self.rows += n;
        self.current_rows += n;
        if self.current_rows >= self.rows_per_file {
            self.roll()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.start()?;
        self.roll()?;
        self.write_metadata()?;
        debug!(
            "Iceberg table {} closed: {} rows in {} data files",
            self.table_path.display(),
            self.rows,
            self.data_files.len()
        );
        Ok(())
    }

    fn set_async_context(&mut self, ctx: SharedIo) -> Result<()> {
        if self.started {
            return Err(Error::InvalidState(
                "async context must be set before the first batch",
            ));
        }
        self.ctx = Some(ctx);
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_io::{lock, shared, BackendKind, IoContextConfig, SharedIoContext};
    use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use arrow::array::{BinaryArray, Int64Array, StringArray};
    use arrow::datatypes::Schema;
    use arrow::record_batch::RecordBatch;
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
        let names: Vec<String> = ids.iter().map(|i| format!("row-{}", i)).collect();
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

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    fn parquet_rows(path: &Path) -> usize {
        ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum()
    }

    #[test]
    fn test_table_directory_layout() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("orders.iceberg");
        let mut writer = IcebergWriter::new(&table, schema()).with_rows_per_file(100);
        for start in [0, 60, 120] {
            writer.write_batch(&batch(start, 60)).unwrap();
        }
        writer.close().unwrap();

        // 60 + 60 reaches the limit, the last 60 go to a second file
        assert_eq!(writer.rows_written(), 180);
        assert_eq!(writer.data_file_count(), 2);
        assert_eq!(parquet_rows(&table.join("data/data_00000.parquet")), 120);
        assert_eq!(parquet_rows(&table.join("data/data_00001.parquet")), 60);
        assert!(!table.join("data/data_00002.parquet").exists());

        let metadata = read_json(&table.join("metadata/v1.metadata.json"));
        assert_eq!(metadata["format-version"], 1);
        assert_eq!(metadata["last-column-id"], 2);
        assert_eq!(metadata["schema"]["fields"][0]["name"], "id");
        assert_eq!(metadata["schema"]["fields"][0]["type"], "long");
        assert_eq!(metadata["schema"]["fields"][1]["type"], "string");
        assert_eq!(metadata["schema"]["fields"][1]["required"], true);
        assert_eq!(metadata["snapshots"][0]["summary"]["added-records"], "180");

        let manifest_list = metadata["snapshots"][0]["manifest-list"].as_str().unwrap();
        let list = read_json(&table.join(manifest_list));
        assert_eq!(list["manifests"][0]["added-files-count"], 2);

        let manifest = read_json(&table.join(MANIFEST_PATH));
        let files = manifest["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["data-file"]["file-path"], "data/data_00000.parquet");
        assert_eq!(files[0]["data-file"]["record-count"], 120);
        let size = fs::metadata(table.join("data/data_00001.parquet")).unwrap().len();
        assert_eq!(files[1]["data-file"]["file-size-in-bytes"], size);

        assert_eq!(
            fs::read_to_string(table.join("metadata/version-hint.text")).unwrap(),
            "1\n"
        );
    }

    #[test]
    fn test_rewrite_drops_stale_data_files() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("t.iceberg");
        let mut first = IcebergWriter::new(&table, schema()).with_rows_per_file(10);
        first.write_batch(&batch(0, 10)).unwrap();
        first.write_batch(&batch(10, 10)).unwrap();
        first.close().unwrap();
        assert!(table.join("data/data_00001.parquet").exists());

        let mut second = IcebergWriter::new(&table, schema());
        second.write_batch(&batch(0, 5)).unwrap();
        second.close().unwrap();
        assert!(!table.join("data/data_00001.parquet").exists());
        assert_eq!(parquet_rows(&table.join("data/data_00000.parquet")), 5);
        assert_eq!(fs::read_dir(table.join("metadata")).unwrap().count(), 4);
    }

    #[test]
    fn test_empty_table_still_has_metadata() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("empty.iceberg");
        let mut writer = IcebergWriter::new(&table, schema());
        writer.close().unwrap();

        assert!(table.join("data").is_dir());
        let metadata = read_json(&table.join("metadata/v1.metadata.json"));
        assert_eq!(metadata["schema"]["fields"].as_array().unwrap().len(), 2);
        let manifest = read_json(&table.join(MANIFEST_PATH));
        assert!(manifest["files"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_data_and_metadata_through_shared_context() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("queued.iceberg");
        let ctx = shared(
            SharedIoContext::new(IoContextConfig::default().with_backend(BackendKind::Sync)).unwrap(),
        );
        let mut writer = IcebergWriter::new(&table, schema()).with_rows_per_file(500);
        writer.set_async_context(ctx.clone()).unwrap();
        for start in [0, 400, 800] {
            writer.write_batch(&batch(start, 400)).unwrap();
        }
        assert!(matches!(
            writer.set_async_context(ctx.clone()),
            Err(Error::InvalidState(_))
        ));
        writer.close().unwrap();

        assert_eq!(parquet_rows(&table.join("data/data_00000.parquet")), 800);
        assert_eq!(parquet_rows(&table.join("data/data_00001.parquet")), 400);
        lock(&ctx).unwrap().drain().unwrap();
        let stats = lock(&ctx).unwrap().stats();
        assert!(stats.write_requests >= 6);
        assert_eq!(stats.outstanding_ops(), 0);
        let metadata = read_json(&table.join("metadata/v1.metadata.json"));
        assert_eq!(metadata["location"], table.display().to_string());
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let mut writer = IcebergWriter::new(&dir.path().join("t.iceberg"), schema());
        writer.write_batch(&batch(0, 5)).unwrap();

        let other = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let narrow = RecordBatch::try_new(other, vec![Arc::new(Int64Array::from(vec![1i64]))]).unwrap();
        let err = writer.write_batch(&ColumnarBatch::Owned(narrow)).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { writer: "iceberg", .. }));
    }

    #[test]
    fn test_unsupported_column_type() {
        let dir = tempdir().unwrap();
        let binary = Arc::new(Schema::new(vec![Field::new("blob", DataType::Binary, false)]));
        let rows = RecordBatch::try_new(
            binary.clone(),
            vec![Arc::new(BinaryArray::from(vec![&b"ab"[..]]))],
        )
        .unwrap();

        let mut writer = IcebergWriter::new(&dir.path().join("b.iceberg"), binary);
        writer.write_batch(&ColumnarBatch::Owned(rows)).unwrap();
        let err = writer.close().unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
        assert_eq!(err.exit_code(), 5);
    }
}
