//! Row-to-columnar conversion.
//!
//! Two tiers:
//! * [`ConversionTier::Standard`] extracts each numeric column in one pass into
//!   a reused scratch vector and copies it once into an exactly sized Arrow
//!   buffer. The batch owns all of its memory.
//! * [`ConversionTier::TrueZeroCopy`] extracts numeric columns into a fresh
//!   [`ExtractionArena`] and hands Arrow buffers that point straight into it.
//!   Every such buffer holds a reference to the arena, so the memory cannot be
//!   freed or reused while any reader exists.
//!
//! Text columns are always captured as `&str` views and copied once, in bulk,
//! into a single values buffer plus one offsets buffer.

use std::fmt;
use std::ptr::NonNull;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use arrow::alloc::Allocation;
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::buffer::{Buffer, MutableBuffer, OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{ArrowNativeType, SchemaRef};
use arrow::record_batch::RecordBatch;
use tracing::trace;

use crate::constants::MONEY_SCALE;
use crate::error::{Error, Result};
use crate::generator::{table_schema, terminated_str, ColumnKind, TableRow};
use crate::tables::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionTier {
    #[default]
    Standard,
    TrueZeroCopy,
}

impl fmt::Display for ConversionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConversionTier::Standard => "standard",
            ConversionTier::TrueZeroCopy => "zero-copy",
        })
    }
}

impl FromStr for ConversionTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "copy" => Ok(ConversionTier::Standard),
            "zero-copy" | "zerocopy" | "true-zero-copy" => Ok(ConversionTier::TrueZeroCopy),
            other => Err(format!("unknown conversion tier '{}'", other)),
        }
    }
}

/// Numeric column storage shared by every buffer of one managed batch
#[derive(Debug, Default)]
pub struct ExtractionArena {
    ints: Vec<Vec<i64>>,
    floats: Vec<Vec<f64>>,
}

impl ExtractionArena {
    pub fn int_column(&self, index: usize) -> &[i64] {
        &self.ints[index]
    }

    pub fn float_column(&self, index: usize) -> &[f64] {
        &self.floats[index]
    }

    /// Mutable access; only reachable once the arena has been reclaimed.
    pub fn int_column_mut(&mut self, index: usize) -> &mut [i64] {
        &mut self.ints[index]
    }

    pub fn retained_bytes(&self) -> usize {
        self.ints.iter().map(|c| c.len() * 8).sum::<usize>()
            + self.floats.iter().map(|c| c.len() * 8).sum::<usize>()
    }
}

/// Keeps a managed batch's extraction memory alive.
#[derive(Debug, Clone)]
pub struct LifetimeHandle(Arc<ExtractionArena>);

impl LifetimeHandle {
    /// References held by this handle, its clones and every wrapped buffer.
    pub fn live_references(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn downgrade(&self) -> LifetimeObserver {
        LifetimeObserver(Arc::downgrade(&self.0))
    }

    pub fn retained_bytes(&self) -> usize {
        self.0.retained_bytes()
    }

    /// Take the arena back for reuse. Fails, returning the handle, while any
    /// buffer still points into it.
    pub fn try_reclaim(self) -> std::result::Result<ExtractionArena, LifetimeHandle> {
        Arc::try_unwrap(self.0).map_err(LifetimeHandle)
    }
}

/// Observes a lifetime handle without keeping it alive
#[derive(Debug, Clone)]
pub struct LifetimeObserver(Weak<ExtractionArena>);

impl LifetimeObserver {
    pub fn is_released(&self) -> bool {
        self.0.strong_count() == 0
    }
}

/// A batch whose numeric buffers borrow from an extraction arena
#[derive(Debug, Clone)]
pub struct ManagedBatch {
    batch: RecordBatch,
    lifetime: LifetimeHandle,
}

impl ManagedBatch {
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn lifetime(&self) -> &LifetimeHandle {
        &self.lifetime
    }

    pub fn into_parts(self) -> (RecordBatch, LifetimeHandle) {
        (self.batch, self.lifetime)
    }
}

#[derive(Debug, Clone)]
pub enum ColumnarBatch {
    Owned(RecordBatch),
    Managed(ManagedBatch),
}

impl ColumnarBatch {
    pub fn record_batch(&self) -> &RecordBatch {
        match self {
            ColumnarBatch::Owned(batch) => batch,
            ColumnarBatch::Managed(managed) => &managed.batch,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.record_batch().num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.record_batch().schema()
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, ColumnarBatch::Managed(_))
    }

    pub fn lifetime(&self) -> Option<&LifetimeHandle> {
        match self {
            ColumnarBatch::Owned(_) => None,
            ColumnarBatch::Managed(managed) => Some(&managed.lifetime),
        }
    }
}

enum Slot {
    Int(usize),
    Float(usize),
    Ready(ArrayRef),
}

/// Converts row views of one table into columnar batches
pub struct ZeroCopyConverter {
    tier: ConversionTier,
    allocation_limit: Option<usize>,
    int_scratch: Vec<i64>,
    float_scratch: Vec<f64>,
    schema: Option<(Table, SchemaRef)>,
}

impl ZeroCopyConverter {
    pub fn new(tier: ConversionTier) -> Self {
        Self {
            tier,
            allocation_limit: None,
            int_scratch: Vec::new(),
            float_scratch: Vec::new(),
            schema: None,
        }
    }

    /// Cap any single column allocation at `bytes`.
    pub fn with_allocation_limit(mut self, bytes: usize) -> Self {
        self.allocation_limit = Some(bytes);
        self
    }

    pub fn tier(&self) -> ConversionTier {
        self.tier
    }

    pub fn schema<R: TableRow>(&mut self) -> SchemaRef {
        match &self.schema {
            Some((table, schema)) if *table == R::TABLE => schema.clone(),
            _ => {
                let schema = table_schema::<R>();
                self.schema = Some((R::TABLE, schema.clone()));
                schema
            }
        }
    }

    /// Convert `rows` into a batch with the same row count and order.
    pub fn convert<R: TableRow>(&mut self, rows: &[R]) -> Result<ColumnarBatch> {
        let schema = self.schema::<R>();
        if rows.is_empty() {
            return Ok(ColumnarBatch::Owned(RecordBatch::new_empty(schema)));
        }
        trace!("Converting {} {} rows ({})", rows.len(), R::TABLE, self.tier);
        match self.tier {
            ConversionTier::Standard => self.convert_standard(rows, schema).map(ColumnarBatch::Owned),
            ConversionTier::TrueZeroCopy => {
                self.convert_wrapped(rows, schema).map(ColumnarBatch::Managed)
            }
        }
    }

    fn convert_standard<R: TableRow>(&mut self, rows: &[R], schema: SchemaRef) -> Result<RecordBatch> {
        let n = rows.len();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(R::columns().len());

        for column in R::columns() {
            let array: ArrayRef = match column.kind {
                ColumnKind::Int(get) => {
                    self.int_scratch.clear();
                    reserve(&mut self.int_scratch, n, self.allocation_limit, column.name)?;
                    self.int_scratch.extend(rows.iter().map(get));
                    let values = copy_to_buffer(&self.int_scratch, self.allocation_limit, column.name)?;
                    Arc::new(Int64Array::new(values, None))
                }
                ColumnKind::Money(get) => {
                    self.float_scratch.clear();
                    reserve(&mut self.float_scratch, n, self.allocation_limit, column.name)?;
                    self.float_scratch
                        .extend(rows.iter().map(|r| get(r) as f64 / MONEY_SCALE));
                    let values = copy_to_buffer(&self.float_scratch, self.allocation_limit, column.name)?;
                    Arc::new(Float64Array::new(values, None))
                }
                ColumnKind::Char(get) => {
                    let views = char_views::<R>(rows, get, self.allocation_limit, column.name)?;
                    Arc::new(build_string_array(&views, self.allocation_limit, column.name)?)
                }
                ColumnKind::Text(get) => {
                    let views = text_views::<R>(rows, get, self.allocation_limit, column.name)?;
                    Arc::new(build_string_array(&views, self.allocation_limit, column.name)?)
                }
            };
            arrays.push(array);
        }

        Ok(RecordBatch::try_new(schema, arrays)?)
    }

    fn convert_wrapped<R: TableRow>(&mut self, rows: &[R], schema: SchemaRef) -> Result<ManagedBatch> {
        let n = rows.len();
        let mut arena = ExtractionArena::default();
        let mut slots = Vec::with_capacity(R::columns().len());

        for column in R::columns() {
            let slot = match column.kind {
                ColumnKind::Int(get) => {
                    let mut values = Vec::new();
                    reserve(&mut values, n, self.allocation_limit, column.name)?;
                    values.extend(rows.iter().map(get));
                    arena.ints.push(values);
                    Slot::Int(arena.ints.len() - 1)
                }
                ColumnKind::Money(get) => {
                    let mut values = Vec::new();
                    reserve(&mut values, n, self.allocation_limit, column.name)?;
                    values.extend(rows.iter().map(|r| get(r) as f64 / MONEY_SCALE));
                    arena.floats.push(values);
                    Slot::Float(arena.floats.len() - 1)
                }
                ColumnKind::Char(get) => {
                    let views = char_views::<R>(rows, get, self.allocation_limit, column.name)?;
                    Slot::Ready(Arc::new(build_string_array(
                        &views,
                        self.allocation_limit,
                        column.name,
                    )?))
                }
                ColumnKind::Text(get) => {
                    let views = text_views::<R>(rows, get, self.allocation_limit, column.name)?;
                    Slot::Ready(Arc::new(build_string_array(
                        &views,
                        self.allocation_limit,
                        column.name,
                    )?))
                }
            };
            slots.push(slot);
        }

        // From here on the arena is frozen; buffers only read through it.
        let arena = Arc::new(arena);
        let arrays: Vec<ArrayRef> = slots
            .into_iter()
            .map(|slot| -> ArrayRef {
                match slot {
                    Slot::Int(i) => Arc::new(Int64Array::new(wrap(&arena, &arena.ints[i]), None)),
                    Slot::Float(i) => {
                        Arc::new(Float64Array::new(wrap(&arena, &arena.floats[i]), None))
                    }
                    Slot::Ready(array) => array,
                }
            })
            .collect();

        let batch = RecordBatch::try_new(schema, arrays)?;
        Ok(ManagedBatch {
            batch,
            lifetime: LifetimeHandle(arena),
        })
    }
}

fn check_limit(bytes: usize, limit: Option<usize>, column: &'static str) -> Result<()> {
    match limit {
        Some(limit) if bytes > limit => Err(Error::AllocationFailure {
            column,
            requested: bytes,
        }),
        _ => Ok(()),
    }
}

/// Reserve exactly `n` slots up front so extraction never reallocates.
fn reserve<T>(values: &mut Vec<T>, n: usize, limit: Option<usize>, column: &'static str) -> Result<()> {
    let requested = n.saturating_mul(std::mem::size_of::<T>());
    check_limit(requested, limit, column)?;
    values
        .try_reserve_exact(n)
        .map_err(|_| Error::AllocationFailure { column, requested })
}

fn copy_to_buffer<T: ArrowNativeType>(
    values: &[T],
    limit: Option<usize>,
    column: &'static str,
) -> Result<ScalarBuffer<T>> {
    check_limit(std::mem::size_of_val(values), limit, column)?;
    Ok(ScalarBuffer::new(Buffer::from_slice_ref(values), 0, values.len()))
}

/// Point an Arrow buffer at a column owned by `arena`.
fn wrap<T: ArrowNativeType>(arena: &Arc<ExtractionArena>, values: &[T]) -> ScalarBuffer<T> {
    let ptr = NonNull::from(values).cast::<u8>();
    let owner: Arc<dyn Allocation> = arena.clone();
    // SAFETY: `values` lives inside `arena`, which is never mutated after being
    // shared, and `owner` keeps it alive for as long as the buffer exists.
    let buffer = unsafe { Buffer::from_custom_allocation(ptr, std::mem::size_of_val(values), owner) };
    ScalarBuffer::new(buffer, 0, values.len())
}

fn text_views<'a, R: TableRow>(
    rows: &'a [R],
    get: fn(&R) -> &[u8],
    limit: Option<usize>,
    column: &'static str,
) -> Result<Vec<&'a str>> {
    let mut views = Vec::new();
    reserve(&mut views, rows.len(), limit, column)?;
    for (row, value) in rows.iter().enumerate() {
        let text = terminated_str(get(value)).ok_or(Error::UninitializedField {
            table: R::TABLE,
            column,
            row,
        })?;
        views.push(text);
    }
    Ok(views)
}

fn char_views<'a, R: TableRow>(
    rows: &'a [R],
    get: fn(&R) -> &u8,
    limit: Option<usize>,
    column: &'static str,
) -> Result<Vec<&'a str>> {
    let mut views = Vec::new();
    reserve(&mut views, rows.len(), limit, column)?;
    for (row, value) in rows.iter().enumerate() {
        let text = std::str::from_utf8(std::slice::from_ref(get(value))).map_err(|_| {
            Error::UninitializedField {
                table: R::TABLE,
                column,
                row,
            }
        })?;
        views.push(text);
    }
    Ok(views)
}

/// One values allocation, one offsets allocation, one copy pass.
fn build_string_array(views: &[&str], limit: Option<usize>, column: &'static str) -> Result<StringArray> {
    let total: usize = views.iter().map(|s| s.len()).sum();
    if total > i32::MAX as usize {
        return Err(Error::ColumnTooLarge {
            column,
            bytes: total,
        });
    }
    check_limit(total, limit, column)?;

    let mut offsets: Vec<i32> = Vec::new();
    reserve(&mut offsets, views.len() + 1, limit, column)?;
    let mut values = MutableBuffer::with_capacity(total);

    offsets.push(0);
    for view in views {
        values.extend_from_slice(view.as_bytes());
        offsets.push(values.len() as i32);
    }

    let offsets = OffsetBuffer::new(ScalarBuffer::from(offsets));
    Ok(StringArray::try_new(offsets, values.into(), None)?)
}
