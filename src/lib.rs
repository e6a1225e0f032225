// Implementations
pub mod async_io;
pub mod constants;
pub mod converter;
pub mod error;
pub mod generator;
pub mod io_stats;
pub mod scheduler;
pub mod tables;
pub mod task;
pub mod writer;

// Export the main types
pub use async_io::{lock, shared, FileHandle, IoContextConfig, SharedIo, SharedIoContext};
pub use converter::{ColumnarBatch, ConversionTier, LifetimeHandle, ZeroCopyConverter};
pub use error::{Error, Result};
pub use generator::{GenerationConfig, GenerationContext, RowGenerator, TableRow};
pub use io_stats::{IoStats, IoStatsTracker};
pub use scheduler::{ExecutionMode, ParallelScheduler, ScheduleReport, SchedulerConfig};
pub use tables::Table;
pub use task::{GenerationTask, TaskState, TaskSummary};
pub use writer::{create_writer, BatchWriter, OutputFormat};
