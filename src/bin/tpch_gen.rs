use anyhow::{Context, Result};
use clap::Parser;
use tpch_columnar::async_io::BackendKind;
use tpch_columnar::{
    ConversionTier, ExecutionMode, GenerationConfig, IoContextConfig, OutputFormat,
    ParallelScheduler, SchedulerConfig, Table,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tpch_gen")]
#[command(about = "Generate TPC-H style tables straight into columnar files")]
struct Cli {
    /// Tables to generate: "all" or a comma separated list
    #[arg(short, long, default_value = "all")]
    tables: String,

    #[arg(short, long, default_value_t = 1.0)]
    scale_factor: f64,

    #[arg(short, long, default_value = "tpch_output")]
    output_dir: String,

    /// csv, parquet, arrow or iceberg (a table directory)
    #[arg(short, long, default_value = "parquet")]
    format: OutputFormat,

    /// Cap on rows per table
    #[arg(long)]
    max_rows: Option<u64>,

    #[arg(long, default_value_t = tpch_columnar::constants::DEFAULT_BATCH_ROWS)]
    batch_rows: usize,

    #[arg(long, default_value_t = tpch_columnar::constants::DEFAULT_SEED)]
    seed: u64,

    /// Run each table in its own process (same as --mode processes)
    #[arg(short, long)]
    parallel: bool,

    /// sequential, threads or processes
    #[arg(long)]
    mode: Option<ExecutionMode>,

    /// standard or zero-copy
    #[arg(long, default_value = "standard")]
    tier: ConversionTier,

    /// Write through the shared async I/O context
    #[arg(long)]
    async_io: bool,

    /// auto, io_uring or sync
    #[arg(long, default_value = "auto")]
    backend: BackendKind,

    #[arg(long, default_value_t = tpch_columnar::constants::DEFAULT_QUEUE_DEPTH)]
    queue_depth: u32,

    /// Concurrent workers (default: number of CPU cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Force an allocation failure while converting this table
    #[arg(long, hide = true)]
    inject_alloc_failure: Option<Table>,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn build_config(cli: &Cli) -> Result<SchedulerConfig> {
    let tables = Table::parse_list(&cli.tables).map_err(anyhow::Error::msg)?;
    let mode = match (cli.mode, cli.parallel) {
        (Some(mode), _) => mode,
        (None, true) => ExecutionMode::Processes,
        (None, false) => ExecutionMode::Sequential,
    };

    let mut config = SchedulerConfig::default()
        .with_tables(tables)
        .with_generation(
            GenerationConfig::default()
                .with_scale_factor(cli.scale_factor)
                .with_seed(cli.seed),
        )
        .with_output_dir(&cli.output_dir)
        .with_format(cli.format)
        .with_max_rows(cli.max_rows)
        .with_batch_rows(cli.batch_rows)
        .with_tier(cli.tier)
        .with_async_io(cli.async_io)
        .with_io(
            IoContextConfig::default()
                .with_queue_depth(cli.queue_depth)
                .with_backend(cli.backend),
        )
        .with_mode(mode)
        .with_injected_alloc_failure(cli.inject_alloc_failure);
    if let Some(workers) = cli.workers {
        config = config.with_max_workers(workers);
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli)?;
    println!(
        "Generating {} table(s) at scale factor {} into {} ({:?}, {} mode)",
        config.tables.len(),
        cli.scale_factor,
        cli.output_dir,
        config.format,
        config.mode
    );

    let scheduler = ParallelScheduler::new(config).context("invalid configuration")?;
    let report = scheduler.run().context("generation run failed")?;

    println!("\n{}", report);

    let elapsed = report.elapsed.as_secs_f64();
    let total_mb = report.total_bytes() as f64 / 1_048_576.0;
    let total_rows: u64 = report
        .outcomes
        .iter()
        .filter_map(|o| o.status.as_ref().ok())
        .filter_map(|s| s.rows)
        .sum();
    println!("Time: {:.2}s", elapsed);
    println!("Output size: {:.2} MB ({} bytes)", total_mb, report.total_bytes());
    if elapsed > 0.0 {
        println!("Throughput: {:.2} MB/s", total_mb / elapsed);
        if total_rows > 0 {
            println!("Rows/second: {:.0}", total_rows as f64 / elapsed);
        }
    }

    if !report.is_success() {
        let failed: Vec<&str> = report.failed().iter().map(|t| t.name()).collect();
        eprintln!("Failed tables: {}", failed.join(", "));
    }
    std::process::exit(report.exit_code());
}
