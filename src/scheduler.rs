//! Runs table tasks side by side and collects per-table outcomes

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::async_io::{lock, shared, IoContextConfig, SharedIo, SharedIoContext};
use crate::constants::DEFAULT_BATCH_ROWS;
use crate::converter::ConversionTier;
use crate::error::{Error, Result};
use crate::generator::{GenerationConfig, GenerationContext};
use crate::tables::Table;
use crate::task::{GenerationTask, TaskOptions, TaskSummary};
use crate::writer::{output_path, output_size, OutputFormat};

const PANIC_EXIT_CODE: i32 = 2;

/// How long the process scheduler sleeps when no worker has exited yet
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One table after another in the calling thread, sharing one I/O context
    #[default]
    Sequential,
    /// One OS thread per worker slot
    Threads,
    /// One forked process per table
    Processes,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Threads => "threads",
            ExecutionMode::Processes => "processes",
        })
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutionMode::Sequential),
            "threads" | "thread" => Ok(ExecutionMode::Threads),
            "processes" | "process" | "fork" => Ok(ExecutionMode::Processes),
            other => Err(format!("unknown execution mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tables: Vec<Table>,
    pub generation: GenerationConfig,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// Per-table row cap
    pub max_rows: Option<u64>,
    pub batch_rows: usize,
    pub tier: ConversionTier,
    pub async_io: bool,
    pub io: IoContextConfig,
    pub mode: ExecutionMode,
    pub max_workers: usize,
    /// Force an allocation failure in this table's converter
    pub inject_alloc_failure: Option<Table>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tables: Table::ALL.to_vec(),
            generation: GenerationConfig::default(),
            output_dir: PathBuf::from("tpch_output"),
            format: OutputFormat::default(),
            max_rows: None,
            batch_rows: DEFAULT_BATCH_ROWS,
            tier: ConversionTier::default(),
            async_io: false,
            io: IoContextConfig::default(),
            mode: ExecutionMode::default(),
            max_workers: num_cpus::get(),
            inject_alloc_failure: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_tables(mut self, tables: Vec<Table>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_max_rows(mut self, max_rows: Option<u64>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows;
        self
    }

    pub fn with_tier(mut self, tier: ConversionTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_async_io(mut self, enabled: bool) -> Self {
        self.async_io = enabled;
        self
    }

    pub fn with_io(mut self, io: IoContextConfig) -> Self {
        self.io = io;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_injected_alloc_failure(mut self, table: Option<Table>) -> Self {
        self.inject_alloc_failure = table;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(Error::Config("no tables selected".to_string()));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.batch_rows == 0 {
            return Err(Error::Config("batch_rows must be at least 1".to_string()));
        }
        self.generation.validate()?;
        self.io.validate()
    }
}

#[derive(Debug)]
pub struct TableOutcome {
    pub table: Table,
    pub elapsed: Duration,
    pub status: Result<TaskSummary>,
}

impl TableOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

#[derive(Debug)]
pub struct ScheduleReport {
    pub mode: ExecutionMode,
    pub init_elapsed: Duration,
    pub elapsed: Duration,
    /// In the order the tables were requested
    pub outcomes: Vec<TableOutcome>,
}

impl ScheduleReport {
    pub fn succeeded(&self) -> Vec<Table> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.table)
            .collect()
    }

    pub fn failed(&self) -> Vec<Table> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.table)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TableOutcome::is_success)
    }

    /// Number of failed tables, saturated to a valid process status.
    pub fn exit_code(&self) -> i32 {
        self.failed().len().min(255) as i32
    }

    pub fn outcome(&self, table: Table) -> Option<&TableOutcome> {
        self.outcomes.iter().find(|o| o.table == table)
    }

    pub fn total_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.status.as_ref().ok())
            .map(|s| s.bytes)
            .sum()
    }
}

impl fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} mode: {}/{} tables succeeded in {:.2}s (init {:.2}s)",
            self.mode,
            self.succeeded().len(),
            self.outcomes.len(),
            self.elapsed.as_secs_f64(),
            self.init_elapsed.as_secs_f64()
        )?;
        for outcome in &self.outcomes {
            match &outcome.status {
                Ok(summary) => {
                    let rows = summary
                        .rows
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    writeln!(
                        f,
                        "  {:<10} ok     {:>12} rows {:>10.2} MB {:>8.2}s  {}",
                        outcome.table.name(),
                        rows,
                        summary.bytes as f64 / (1024.0 * 1024.0),
                        outcome.elapsed.as_secs_f64(),
                        summary.output_path.display()
                    )?;
                }
                Err(e) => {
                    writeln!(f, "  {:<10} FAILED {}", outcome.table.name(), e)?;
                }
            }
        }
        Ok(())
    }
}

pub struct ParallelScheduler {
    config: SchedulerConfig,
}

impl ParallelScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build shared state once, then run every table.
    pub fn run(&self) -> Result<ScheduleReport> {
        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| Error::io(&self.config.output_dir, e))?;
        let ctx = GenerationContext::initialize(self.config.generation.clone())?;
        self.run_with_context(&ctx)
    }

    pub fn run_with_context(&self, ctx: &GenerationContext) -> Result<ScheduleReport> {
        let start = Instant::now();
        info!(
            "Scheduling {} tables in {} mode with up to {} workers",
            self.config.tables.len(),
            self.config.mode,
            self.config.max_workers
        );

        let mut outcomes = match self.config.mode {
            ExecutionMode::Sequential => self.run_sequential(ctx)?,
            ExecutionMode::Threads => self.run_threads(ctx)?,
            ExecutionMode::Processes => self.run_processes(ctx)?,
        };
        let order = &self.config.tables;
        outcomes.sort_by_key(|o| order.iter().position(|t| *t == o.table));

        for outcome in &outcomes {
            if let Err(e) = &outcome.status {
                error!("{} failed: {}", outcome.table, e);
            }
        }

        Ok(ScheduleReport {
            mode: self.config.mode,
            init_elapsed: ctx.init_elapsed(),
            elapsed: start.elapsed(),
            outcomes,
        })
    }

    fn task_options(&self, table: Table) -> TaskOptions {
        TaskOptions {
            format: self.config.format,
            tier: self.config.tier,
            row_cap: self.config.max_rows,
            batch_rows: self.config.batch_rows,
            allocation_limit: (self.config.inject_alloc_failure == Some(table)).then_some(0),
        }
    }

    fn new_io_context(&self) -> Result<SharedIo> {
        Ok(shared(SharedIoContext::new(self.config.io.clone())?))
    }

    /// Runs one table, creating a private I/O context when async output is on
    /// and none is shared.
    fn execute_table(
        &self,
        ctx: &GenerationContext,
        table: Table,
        shared_io: Option<SharedIo>,
    ) -> Result<TaskSummary> {
        let own_io = match (&shared_io, self.config.async_io) {
            (None, true) => Some(self.new_io_context()?),
            _ => None,
        };
        let io = shared_io.or_else(|| own_io.clone());

        let path = output_path(&self.config.output_dir, table, self.config.format);
        let mut task = GenerationTask::new(ctx, table, path, self.task_options(table));
        let summary = task.run(io)?;

        if let Some(io) = own_io {
            lock(&io)?.close_all()?;
        }
        Ok(summary)
    }

    fn run_isolated(
        &self,
        ctx: &GenerationContext,
        table: Table,
        shared_io: Option<SharedIo>,
    ) -> TableOutcome {
        let start = Instant::now();
        let status =
            match catch_unwind(AssertUnwindSafe(|| self.execute_table(ctx, table, shared_io))) {
                Ok(Ok(summary)) => Ok(summary),
                Ok(Err(e)) => Err(Error::WorkerFailure {
                    table,
                    reason: e.to_string(),
                }),
                Err(_) => Err(Error::WorkerFailure {
                    table,
                    reason: Error::describe_exit_code(PANIC_EXIT_CODE).to_string(),
                }),
            };
        TableOutcome {
            table,
            elapsed: start.elapsed(),
            status,
        }
    }

    fn run_sequential(&self, ctx: &GenerationContext) -> Result<Vec<TableOutcome>> {
        let io = if self.config.async_io {
            Some(self.new_io_context()?)
        } else {
            None
        };

        let outcomes = self
            .config
            .tables
            .iter()
            .map(|&table| self.run_isolated(ctx, table, io.clone()))
            .collect();

        if let Some(io) = io {
            // Handles left open by failed tables.
            if let Err(e) = lock(&io).and_then(|mut io| io.close_all()) {
                warn!("Closing shared I/O context failed: {}", e);
            }
        }
        Ok(outcomes)
    }

    fn run_threads(&self, ctx: &GenerationContext) -> Result<Vec<TableOutcome>> {
        let (work_tx, work_rx) = crossbeam::channel::unbounded::<Table>();
        let (done_tx, done_rx) = crossbeam::channel::unbounded::<TableOutcome>();
        for &table in &self.config.tables {
            work_tx
                .send(table)
                .map_err(|_| Error::InvalidState("work queue closed"))?;
        }
        drop(work_tx);

        let workers = self.config.max_workers.min(self.config.tables.len());
        crossbeam::thread::scope(|scope| {
            for worker in 0..workers {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move |_| {
                    for table in work_rx.iter() {
                        debug!("Thread worker {} took {}", worker, table);
                        let outcome = self.run_isolated(ctx, table, None);
                        if done_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .map_err(|_| Error::InvalidState("worker thread panicked"))?;
        drop(done_tx);

        Ok(done_rx.iter().collect())
    }

    fn run_processes(&self, ctx: &GenerationContext) -> Result<Vec<TableOutcome>> {
        let mut pending: VecDeque<Table> = self.config.tables.iter().copied().collect();
        let mut running: HashMap<libc::pid_t, (Table, Instant)> = HashMap::new();
        let mut outcomes = Vec::with_capacity(pending.len());

        loop {
            while running.len() < self.config.max_workers {
                let Some(table) = pending.pop_front() else {
                    break;
                };
                match self.spawn_worker(ctx, table) {
                    Ok(pid) => {
                        running.insert(pid, (table, Instant::now()));
                    }
                    Err(e) => outcomes.push(TableOutcome {
                        table,
                        elapsed: Duration::ZERO,
                        status: Err(Error::WorkerFailure {
                            table,
                            reason: format!("fork failed: {}", e),
                        }),
                    }),
                }
            }
            if running.is_empty() {
                break;
            }

            let finished = poll_workers(running.keys().copied());
            if finished.is_empty() {
                thread::sleep(WORKER_POLL_INTERVAL);
                continue;
            }
            for (pid, status) in finished {
                let Some((table, started)) = running.remove(&pid) else {
                    continue;
                };
                let outcome = match status {
                    Ok(status) => self.process_outcome(table, status, started.elapsed()),
                    Err(e) => TableOutcome {
                        table,
                        elapsed: started.elapsed(),
                        status: Err(Error::WorkerFailure {
                            table,
                            reason: format!("lost worker {} status: {}", pid, e),
                        }),
                    },
                };
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn spawn_worker(&self, ctx: &GenerationContext, table: Table) -> io::Result<libc::pid_t> {
        // SAFETY: the child only runs this table's task and leaves through _exit,
        // never returning into the caller's stack.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(io::Error::last_os_error());
        }
        if pid == 0 {
            let code = self.child_main(ctx, table);
            // SAFETY: terminates the child without running the parent's destructors.
            unsafe { libc::_exit(code) };
        }
        debug!("Spawned worker {} for {}", pid, table);
        Ok(pid)
    }

    fn child_main(&self, ctx: &GenerationContext, table: Table) -> i32 {
        match catch_unwind(AssertUnwindSafe(|| self.execute_table(ctx, table, None))) {
            Ok(Ok(_)) => 0,
            Ok(Err(e)) => {
                error!("{} worker failed: {}", table, e);
                e.exit_code()
            }
            Err(_) => PANIC_EXIT_CODE,
        }
    }

    fn process_outcome(&self, table: Table, status: libc::c_int, elapsed: Duration) -> TableOutcome {
        let failure = |reason: String| Err(Error::WorkerFailure { table, reason });
        let status = if libc::WIFEXITED(status) {
            match libc::WEXITSTATUS(status) {
                0 => {
                    let path = output_path(&self.config.output_dir, table, self.config.format);
                    let bytes = output_size(&path).unwrap_or(0);
                    Ok(TaskSummary {
                        table,
                        output_path: path,
                        rows: None,
                        batches: None,
                        bytes,
                        elapsed,
                    })
                }
                code => failure(format!(
                    "exited with code {} ({})",
                    code,
                    Error::describe_exit_code(code)
                )),
            }
        } else if libc::WIFSIGNALED(status) {
            failure(format!("killed by signal {}", libc::WTERMSIG(status)))
        } else {
            failure(format!("unexpected wait status {:#x}", status))
        };
        TableOutcome {
            table,
            elapsed,
            status,
        }
    }
}

/// Check each tracked worker without blocking.
///
/// Only pids this scheduler forked are waited on, so other children of the
/// host process keep their exit status for whoever owns them. A pid whose
/// status cannot be collected is reported with its error so the caller can
/// fail that table instead of waiting on it forever.
fn poll_workers(
    pids: impl Iterator<Item = libc::pid_t>,
) -> Vec<(libc::pid_t, io::Result<libc::c_int>)> {
    pids.filter_map(|pid| match wait_worker(pid) {
        Ok(Some(status)) => Some((pid, Ok(status))),
        Ok(None) => None,
        Err(e) => Some((pid, Err(e))),
    })
    .collect()
}

fn wait_worker(pid: libc::pid_t) -> io::Result<Option<libc::c_int>> {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: status points to a live c_int for the duration of the call.
        let reaped = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if reaped == pid {
            return Ok(Some(status));
        }
        if reaped == 0 {
            return Ok(None);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config(dir: &std::path::Path) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_generation(GenerationConfig::default().with_scale_factor(0.001))
            .with_output_dir(dir)
            .with_max_rows(Some(200))
            .with_batch_rows(64)
            .with_format(OutputFormat::Csv)
    }

    #[test]
    fn test_sequential_run_writes_every_table() {
        let dir = tempdir().unwrap();
        let scheduler = ParallelScheduler::new(small_config(dir.path())).unwrap();
        let report = scheduler.run().unwrap();

        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.succeeded(), Table::ALL.to_vec());
        for table in Table::ALL {
            assert!(dir.path().join(format!("{}.csv", table.name())).exists());
        }
        let nation = report.outcome(Table::Nation).unwrap().status.as_ref().unwrap();
        assert_eq!(nation.rows, Some(25));
    }

    #[test]
    fn test_sequential_shared_context_survives_a_failed_table() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path())
            .with_tables(vec![Table::Region, Table::Supplier, Table::Nation])
            .with_async_io(true)
            .with_injected_alloc_failure(Some(Table::Supplier));
        let report = ParallelScheduler::new(config).unwrap().run().unwrap();

        assert_eq!(report.failed(), vec![Table::Supplier]);
        assert_eq!(report.succeeded(), vec![Table::Region, Table::Nation]);
        assert_eq!(report.exit_code(), 1);
        let text = report.to_string();
        assert!(text.contains("supplier"));
        assert!(text.contains("FAILED"));

        let region = std::fs::read_to_string(dir.path().join("region.csv")).unwrap();
        assert_eq!(region.lines().count(), 6);
    }

    #[test]
    fn test_thread_workers_limit_and_ordering() {
        let dir = tempdir().unwrap();
        let tables = vec![Table::Orders, Table::Region, Table::Part, Table::Nation];
        let config = small_config(dir.path())
            .with_tables(tables.clone())
            .with_mode(ExecutionMode::Threads)
            .with_max_workers(2);
        let report = ParallelScheduler::new(config).unwrap().run().unwrap();

        assert!(report.is_success());
        let order: Vec<Table> = report.outcomes.iter().map(|o| o.table).collect();
        assert_eq!(order, tables);
    }

    #[test]
    fn test_config_validation() {
        let dir = tempdir().unwrap();
        assert!(ParallelScheduler::new(small_config(dir.path()).with_tables(vec![])).is_err());
        assert!(ParallelScheduler::new(small_config(dir.path()).with_max_workers(0)).is_err());
        assert!(ParallelScheduler::new(
            small_config(dir.path())
                .with_generation(GenerationConfig::default().with_scale_factor(-1.0))
        )
        .is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fork".parse::<ExecutionMode>().unwrap(), ExecutionMode::Processes);
        assert_eq!("Threads".parse::<ExecutionMode>().unwrap(), ExecutionMode::Threads);
        assert!("gpu".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Sequential.to_string(), "sequential");
    }

    #[test]
    fn test_exit_code_saturates() {
        let outcomes = (0..300)
            .map(|_| TableOutcome {
                table: Table::Region,
                elapsed: Duration::ZERO,
                status: Err(Error::Config("x".to_string())),
            })
            .collect();
        let report = ScheduleReport {
            mode: ExecutionMode::Sequential,
            init_elapsed: Duration::ZERO,
            elapsed: Duration::ZERO,
            outcomes,
        };
        assert_eq!(report.exit_code(), 255);
    }

    #[test]
    fn test_polling_leaves_other_children_alone() {
        let ours = std::process::Command::new("true").spawn().unwrap();
        let mut foreign = std::process::Command::new("true").spawn().unwrap();
        let pid = ours.id() as libc::pid_t;

        let status = loop {
            let mut finished = poll_workers(std::iter::once(pid));
            if let Some((reaped, status)) = finished.pop() {
                assert_eq!(reaped, pid);
                break status.unwrap();
            }
            thread::sleep(WORKER_POLL_INTERVAL);
        };
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), 0);
        assert!(foreign.wait().unwrap().success());
    }

    #[test]
    fn test_lost_worker_is_reported_not_awaited() {
        // Nothing with this pid is our child, so waitpid fails with ECHILD.
        let finished = poll_workers(std::iter::once(i32::MAX));
        assert_eq!(finished.len(), 1);
        assert!(finished[0].1.is_err());
    }
}
