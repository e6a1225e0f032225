//! Error taxonomy shared by the generator, converter, I/O context and scheduler

use std::io;
use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::tables::Table;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Column storage could not be reserved. Fatal for the current task.
    #[error("allocation of {requested} bytes for column {column} failed")]
    AllocationFailure {
        column: &'static str,
        requested: usize,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Os(#[from] io::Error),

    /// An earlier completion failed; the context refuses further work.
    #[error("shared I/O context is poisoned: {0}")]
    ContextPoisoned(String),

    #[error("unknown file handle {0}")]
    UnknownHandle(u32),

    #[error("worker for table {table} failed: {reason}")]
    WorkerFailure { table: Table, reason: String },

    #[error("{writer} writer schema mismatch: locked [{expected}], got [{found}]")]
    SchemaMismatch {
        writer: &'static str,
        expected: String,
        found: String,
    },

    /// A text field had no terminator or held invalid bytes.
    #[error("column {column} of {table} has an uninitialized text field at row {row}")]
    UninitializedField {
        table: Table,
        column: &'static str,
        row: usize,
    },

    #[error("column {column} holds {bytes} bytes of text, beyond 32-bit offsets")]
    ColumnTooLarge { column: &'static str, bytes: usize },

    /// A column type with no counterpart in a table format's type system.
    #[error("column {column} has type {data_type}, which {format} cannot represent")]
    UnsupportedType {
        format: &'static str,
        column: String,
        data_type: String,
    },

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    Parquet(#[from] ParquetError),

    #[error("table metadata encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code a worker uses to report this error to its parent.
    ///
    /// The Arrow and Parquet writers wrap failures of the sink underneath
    /// them. Those are classified by their cause, so a full disk under a
    /// Parquet file is still an I/O error once only the status survives.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::AllocationFailure { .. } | Error::ColumnTooLarge { .. } => 3,
            Error::Io { .. } | Error::Os(_) | Error::ContextPoisoned(_) => 4,
            Error::SchemaMismatch { .. } | Error::UnsupportedType { .. } => 5,
            Error::UninitializedField { .. } => 6,
            Error::Arrow(ArrowError::IoError(_, source)) => io_exit_code(source),
            Error::Arrow(ArrowError::ExternalError(source))
            | Error::Parquet(ParquetError::External(source)) => external_exit_code(source.as_ref()),
            _ => 1,
        }
    }

    /// Reverse of [`Error::exit_code`], used when only the status survives.
    pub fn describe_exit_code(code: i32) -> &'static str {
        match code {
            2 => "worker panicked",
            3 => "allocation failure",
            4 => "I/O error",
            5 => "schema mismatch",
            6 => "uninitialized field",
            _ => "task error",
        }
    }
}

/// An `io::Error` may carry one of ours, as `AsyncSink` does through `Write`.
fn io_exit_code(source: &io::Error) -> i32 {
    match source.get_ref().and_then(|inner| inner.downcast_ref::<Error>()) {
        Some(inner) => inner.exit_code(),
        None => 4,
    }
}

fn external_exit_code(source: &(dyn std::error::Error + Send + Sync + 'static)) -> i32 {
    if let Some(e) = source.downcast_ref::<io::Error>() {
        io_exit_code(e)
    } else if let Some(e) = source.downcast_ref::<Error>() {
        e.exit_code()
    } else {
        1
    }
}
