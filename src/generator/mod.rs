//! Row generation: one-time shared initialization and per-table row producers.
//!
//! [`GenerationContext::initialize`] does every expensive, shared step once:
//! reference data, the date cache, the comment text pool, and one seeded RNG
//! stream per table. Workers only ever read it. A [`RowGenerator`] clones its
//! table's stream and produces fixed-shape rows in reusable batches.

pub mod reference;
pub mod rows;
pub mod text;

use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, info};

use crate::constants::{DEFAULT_BATCH_ROWS, DEFAULT_SEED};
use crate::error::{Error, Result};
use crate::tables::Table;

pub use rows::{
    CustomerRow, LineItemRow, NationRow, OrderRow, PartRow, PartSuppRow, RegionRow, SupplierRow,
};
pub use text::{terminated_str, FixedText};

/// Size of the comment text pool (1MB)
const TEXT_POOL_SIZE: usize = 1024 * 1024;

/// Generation parameters shared by every table
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub scale_factor: f64,
    pub seed: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl GenerationConfig {
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(Error::Config(format!(
                "scale factor must be positive, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

/// Shared, read-only state built once before any table is generated
pub struct GenerationContext {
    config: GenerationConfig,
    dates: Vec<String>,
    text_pool: String,
    streams: Vec<Xoshiro256PlusPlus>,
    init_elapsed: Duration,
}

impl GenerationContext {
    pub fn initialize(config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();

        let base = Xoshiro256PlusPlus::seed_from_u64(config.seed);

        // Table streams live 2^128 steps apart; the text pool sits past all of them.
        let mut streams = Vec::with_capacity(Table::COUNT);
        let mut stream = base.clone();
        for _ in Table::ALL {
            streams.push(stream.clone());
            stream.jump();
        }
        let mut pool_rng = base;
        pool_rng.long_jump();

        let dates = build_date_cache()?;
        let text_pool = build_text_pool(&mut pool_rng, TEXT_POOL_SIZE);

        let init_elapsed = start.elapsed();
        info!(
            "Shared generation state ready: sf={}, seed={}, {} dates, {} KB text pool in {:?}",
            config.scale_factor,
            config.seed,
            dates.len(),
            text_pool.len() / 1024,
            init_elapsed
        );

        Ok(Self {
            config,
            dates,
            text_pool,
            streams,
            init_elapsed,
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn scale_factor(&self) -> f64 {
        self.config.scale_factor
    }

    pub fn init_elapsed(&self) -> Duration {
        self.init_elapsed
    }

    pub fn row_count(&self, table: Table) -> u64 {
        table.row_count(self.config.scale_factor)
    }

    /// A private copy of the table's pre-seeded stream.
    pub fn stream(&self, table: Table) -> Xoshiro256PlusPlus {
        self.streams[table.index()].clone()
    }

    pub fn date(&self, index: usize) -> &str {
        &self.dates[index.min(self.dates.len() - 1)]
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    /// A slice of the text pool with a length drawn from `min..=max`.
    pub fn text(&self, rng: &mut Xoshiro256PlusPlus, min: usize, max: usize) -> &str {
        let len = rng.random_range(min..=max);
        let start = rng.random_range(0..self.text_pool.len() - len);
        // Pool is ASCII, any byte offset is a char boundary
        &self.text_pool[start..start + len]
    }
}

fn build_date_cache() -> Result<Vec<String>> {
    let (y, m, d) = reference::START_DATE;
    let start = NaiveDate::from_ymd_opt(y, m, d).ok_or(Error::InvalidState("bad start date"))?;
    let (y, m, d) = reference::END_DATE;
    let end = NaiveDate::from_ymd_opt(y, m, d).ok_or(Error::InvalidState("bad end date"))?;

    Ok(start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| day.format("%Y-%m-%d").to_string())
        .collect())
}

fn build_text_pool(rng: &mut Xoshiro256PlusPlus, size: usize) -> String {
    let mut pool = String::with_capacity(size + 32);
    while pool.len() < size {
        pool.push_str(reference::pick(rng, &reference::TEXT_WORDS));
        pool.push(if rng.random_range(0..12) == 0 { '.' } else { ' ' });
    }
    pool
}

/// How a row field maps onto an output column
pub enum ColumnKind<R> {
    /// Integer key or count
    Int(fn(&R) -> i64),
    /// Fixed-point integer cents, rescaled to a float
    Money(fn(&R) -> i64),
    /// Single byte flag
    Char(fn(&R) -> &u8),
    /// NUL-terminated text, length taken from the terminator
    Text(fn(&R) -> &[u8]),
}

pub struct Column<R> {
    pub name: &'static str,
    pub kind: ColumnKind<R>,
}

impl<R> Column<R> {
    pub const fn int(name: &'static str, get: fn(&R) -> i64) -> Self {
        Self {
            name,
            kind: ColumnKind::Int(get),
        }
    }

    pub const fn money(name: &'static str, get: fn(&R) -> i64) -> Self {
        Self {
            name,
            kind: ColumnKind::Money(get),
        }
    }

    pub const fn char(name: &'static str, get: fn(&R) -> &u8) -> Self {
        Self {
            name,
            kind: ColumnKind::Char(get),
        }
    }

    pub const fn text(name: &'static str, get: fn(&R) -> &[u8]) -> Self {
        Self {
            name,
            kind: ColumnKind::Text(get),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self.kind {
            ColumnKind::Int(_) => DataType::Int64,
            ColumnKind::Money(_) => DataType::Float64,
            ColumnKind::Char(_) | ColumnKind::Text(_) => DataType::Utf8,
        }
    }
}

/// A fixed-shape row of one table
pub trait TableRow: Sized + Send + Sync + 'static {
    const TABLE: Table;

    /// Output columns in schema order.
    fn columns() -> &'static [Column<Self>];

    /// Build the row with 1-based `key` from the table's stream.
    fn generate(ctx: &GenerationContext, key: u64, rng: &mut Xoshiro256PlusPlus) -> Self;
}

/// Arrow schema for a row type
pub fn table_schema<R: TableRow>() -> SchemaRef {
    let fields: Vec<Field> = R::columns()
        .iter()
        .map(|c| Field::new(c.name, c.data_type(), false))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Arrow schema for a table chosen at runtime
pub fn schema_for(table: Table) -> SchemaRef {
    match table {
        Table::Part => table_schema::<PartRow>(),
        Table::Supplier => table_schema::<SupplierRow>(),
        Table::PartSupp => table_schema::<PartSuppRow>(),
        Table::Customer => table_schema::<CustomerRow>(),
        Table::Orders => table_schema::<OrderRow>(),
        Table::LineItem => table_schema::<LineItemRow>(),
        Table::Nation => table_schema::<NationRow>(),
        Table::Region => table_schema::<RegionRow>(),
    }
}

/// Produces one table's rows in batches from the shared context.
///
/// Construction never re-runs shared initialization; it only clones the table's
/// stream. Each batch borrows the generator's buffer, so a view is gone once
/// the generator advances.
pub struct RowGenerator<'ctx, R: TableRow> {
    ctx: &'ctx GenerationContext,
    rng: Xoshiro256PlusPlus,
    next_key: u64,
    end_key: u64,
    batch_rows: usize,
    batch: Vec<R>,
}

impl<'ctx, R: TableRow> RowGenerator<'ctx, R> {
    pub fn new(ctx: &'ctx GenerationContext, row_cap: Option<u64>, batch_rows: usize) -> Self {
        let mut rows = ctx.row_count(R::TABLE);
        if let Some(cap) = row_cap {
            rows = rows.min(cap);
        }
        let batch_rows = if batch_rows == 0 {
            DEFAULT_BATCH_ROWS
        } else {
            batch_rows
        };
        debug!(
            "Generator for {} attached to shared state: {} rows, batches of {}",
            R::TABLE,
            rows,
            batch_rows
        );
        Self {
            ctx,
            rng: ctx.stream(R::TABLE),
            next_key: 1,
            end_key: rows + 1,
            batch_rows,
            batch: Vec::new(),
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.end_key - 1
    }

    pub fn remaining_rows(&self) -> u64 {
        self.end_key - self.next_key
    }

    /// Next batch of rows, or `None` when the table is exhausted.
    pub fn next_batch(&mut self) -> Option<&[R]> {
        let remaining = self.remaining_rows();
        if remaining == 0 {
            return None;
        }
        let n = remaining.min(self.batch_rows as u64);
        self.batch.clear();
        self.batch.reserve(n as usize);
        for key in self.next_key..self.next_key + n {
            self.batch.push(R::generate(self.ctx, key, &mut self.rng));
        }
        self.next_key += n;
        Some(&self.batch)
    }
}
