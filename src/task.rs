//! One table's generation → conversion → write → close loop

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::async_io::SharedIo;
use crate::constants::DEFAULT_BATCH_ROWS;
use crate::converter::{ConversionTier, ZeroCopyConverter};
use crate::error::Result;
use crate::generator::{
    table_schema, CustomerRow, GenerationContext, LineItemRow, NationRow, OrderRow, PartRow,
    PartSuppRow, RegionRow, RowGenerator, SupplierRow, TableRow,
};
use crate::tables::Table;
use crate::writer::{create_writer, output_size, OutputFormat};

/// Lifecycle of a task. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Spawned,
    SkippingInit,
    Generating,
    Writing,
    Closed,
    Exited(i32),
}

impl TaskState {
    fn rank(self) -> u8 {
        match self {
            TaskState::Spawned => 0,
            TaskState::SkippingInit => 1,
            TaskState::Generating => 2,
            TaskState::Writing => 3,
            TaskState::Closed => 4,
            TaskState::Exited(_) => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Exited(_))
    }
}

#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub format: OutputFormat,
    pub tier: ConversionTier,
    pub row_cap: Option<u64>,
    pub batch_rows: usize,
    /// Upper bound on any single column allocation
    pub allocation_limit: Option<usize>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            tier: ConversionTier::default(),
            row_cap: None,
            batch_rows: DEFAULT_BATCH_ROWS,
            allocation_limit: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub table: Table,
    pub output_path: PathBuf,
    /// Unknown when the task ran in another process
    pub rows: Option<u64>,
    pub batches: Option<u64>,
    pub bytes: u64,
    pub elapsed: Duration,
}

pub struct GenerationTask<'ctx> {
    ctx: &'ctx GenerationContext,
    table: Table,
    output_path: PathBuf,
    options: TaskOptions,
    state: TaskState,
    history: Vec<TaskState>,
}

impl<'ctx> GenerationTask<'ctx> {
    pub fn new(
        ctx: &'ctx GenerationContext,
        table: Table,
        output_path: impl Into<PathBuf>,
        options: TaskOptions,
    ) -> Self {
        Self {
            ctx,
            table,
            output_path: output_path.into(),
            options,
            state: TaskState::Spawned,
            history: vec![TaskState::Spawned],
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn history(&self) -> &[TaskState] {
        &self.history
    }

    fn advance(&mut self, next: TaskState) {
        debug_assert!(
            next.rank() > self.state.rank(),
            "task state cannot move from {:?} to {:?}",
            self.state,
            next
        );
        debug!("{}: {:?} -> {:?}", self.table, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Run the table to completion and end in `Exited`.
    ///
    /// With `io`, the writer enqueues through the shared context instead of
    /// writing its own file.
    pub fn run(&mut self, io: Option<SharedIo>) -> Result<TaskSummary> {
        if self.state.is_terminal() {
            return Err(crate::error::Error::InvalidState("task already exited"));
        }
        let result = self.execute(io);
        let code = match &result {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        };
        self.advance(TaskState::Exited(code));
        result
    }

    fn execute(&mut self, io: Option<SharedIo>) -> Result<TaskSummary> {
        // Shared state was built before this task existed; only attach to it.
        self.advance(TaskState::SkippingInit);
        match self.table {
            Table::Part => self.drive::<PartRow>(io),
            Table::Supplier => self.drive::<SupplierRow>(io),
            Table::PartSupp => self.drive::<PartSuppRow>(io),
            Table::Customer => self.drive::<CustomerRow>(io),
            Table::Orders => self.drive::<OrderRow>(io),
            Table::LineItem => self.drive::<LineItemRow>(io),
            Table::Nation => self.drive::<NationRow>(io),
            Table::Region => self.drive::<RegionRow>(io),
        }
    }

    fn drive<R: TableRow>(&mut self, io: Option<SharedIo>) -> Result<TaskSummary> {
        let start = Instant::now();
        let mut writer = create_writer(self.options.format, &self.output_path, table_schema::<R>());
        if let Some(io) = io {
            writer.set_async_context(io)?;
        }

        let mut converter = ZeroCopyConverter::new(self.options.tier);
        if let Some(limit) = self.options.allocation_limit {
            converter = converter.with_allocation_limit(limit);
        }
        let mut generator =
            RowGenerator::<R>::new(self.ctx, self.options.row_cap, self.options.batch_rows);

        self.advance(TaskState::Generating);
        let mut batches = 0u64;
        while let Some(rows) = generator.next_batch() {
            let batch = converter.convert(rows)?;
            writer.write_batch(&batch)?;
            batches += 1;
            trace!("{}: batch {} ({} rows)", self.table, batches, batch.num_rows());
        }

        self.advance(TaskState::Writing);
        writer.close()?;
        self.advance(TaskState::Closed);

        let bytes = output_size(&self.output_path).unwrap_or(0);
        let summary = TaskSummary {
            table: self.table,
            output_path: self.output_path.clone(),
            rows: Some(writer.rows_written()),
            batches: Some(batches),
            bytes,
            elapsed: start.elapsed(),
        };
        info!(
            "{}: {} rows, {} bytes to {} in {:?}",
            self.table,
            writer.rows_written(),
            bytes,
            self.output_path.display(),
            summary.elapsed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::generator::GenerationConfig;
    use tempfile::tempdir;

    fn ctx() -> GenerationContext {
        GenerationContext::initialize(GenerationConfig::default().with_scale_factor(0.001)).unwrap()
    }

    #[test]
    fn test_successful_task_walks_every_state() {
        let ctx = ctx();
        let dir = tempdir().unwrap();
        let options = TaskOptions {
            format: OutputFormat::Csv,
            row_cap: Some(120),
            batch_rows: 50,
            ..Default::default()
        };
        let mut task = GenerationTask::new(&ctx, Table::Customer, dir.path().join("customer.csv"), options);
        let summary = task.run(None).unwrap();

        assert_eq!(summary.rows, Some(120));
        assert_eq!(summary.batches, Some(3));
        assert_eq!(
            task.history(),
            &[
                TaskState::Spawned,
                TaskState::SkippingInit,
                TaskState::Generating,
                TaskState::Writing,
                TaskState::Closed,
                TaskState::Exited(0),
            ]
        );
        let content = std::fs::read_to_string(dir.path().join("customer.csv")).unwrap();
        assert_eq!(content.lines().count(), 121);
        assert!(content.starts_with("c_custkey,c_name,c_address"));
    }

    #[test]
    fn test_failed_task_exits_with_error_code() {
        let ctx = ctx();
        let dir = tempdir().unwrap();
        let options = TaskOptions {
            allocation_limit: Some(0),
            ..Default::default()
        };
        let mut task = GenerationTask::new(&ctx, Table::Nation, dir.path().join("nation.parquet"), options);
        let err = task.run(None).unwrap_err();

        assert!(matches!(err, Error::AllocationFailure { .. }));
        assert_eq!(task.state(), TaskState::Exited(3));
        assert!(!task.history().contains(&TaskState::Closed));
        assert!(task.run(None).is_err());
    }
}
