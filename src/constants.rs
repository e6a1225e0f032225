//! Unified constants for write sizes, queue depths and batch shapes used throughout the codebase

/// Largest byte count a single kernel write may carry (2^31 - 1).
///
/// Requests above this are split exactly at this boundary before submission.
pub const MAX_WRITE_BYTES: usize = i32::MAX as usize;

/// Default submission queue depth for the shared I/O context
pub const DEFAULT_QUEUE_DEPTH: u32 = 256;

/// Default number of rows the generator hands out per batch
pub const DEFAULT_BATCH_ROWS: usize = 10_000;

/// Chunk size used by the async sink before a buffer is enqueued (4MB)
pub const SINK_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Fixed-point scale of money fields (integer cents)
pub const MONEY_SCALE: f64 = 100.0;

/// Default run seed, matching the classic dbgen base seed
pub const DEFAULT_SEED: u64 = 123_456_789;

/// Rows per parquet row group
pub const PARQUET_ROW_GROUP_ROWS: usize = 1024 * 1024;

/// Rows per iceberg data file before a new one is started
pub const ICEBERG_ROWS_PER_FILE: u64 = 10_000_000;

/// Split a write of `len` bytes at `offset` into kernel-sized pieces.
///
/// Each piece is `(file_offset, range_in_buffer)`. Offsets are cumulative so the
/// pieces land exactly where the unsplit write would have.
#[inline]
pub fn split_write(
    offset: u64,
    len: usize,
    ceiling: usize,
) -> impl Iterator<Item = (u64, std::ops::Range<usize>)> {
    debug_assert!(ceiling > 0, "Write ceiling must be positive");
    (0..len).step_by(ceiling.max(1)).map(move |start| {
        let end = (start + ceiling).min(len);
        (offset + start as u64, start..end)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_below_ceiling() {
        let pieces: Vec<_> = split_write(10, 100, MAX_WRITE_BYTES).collect();
        assert_eq!(pieces, vec![(10, 0..100)]);
    }

    #[test]
    fn test_split_at_real_ceiling() {
        // 5GB request, nothing is allocated
        let len = 5usize * 1024 * 1024 * 1024;
        let pieces: Vec<_> = split_write(0, len, MAX_WRITE_BYTES).collect();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], (0, 0..MAX_WRITE_BYTES));
        assert_eq!(
            pieces[1],
            (MAX_WRITE_BYTES as u64, MAX_WRITE_BYTES..2 * MAX_WRITE_BYTES)
        );
        assert_eq!(pieces[2].0, 2 * MAX_WRITE_BYTES as u64);
        assert_eq!(pieces[2].1.end, len);
        let total: usize = pieces.iter().map(|(_, r)| r.len()).sum();
        assert_eq!(total, len);
    }

    #[test]
    fn test_split_exact_multiple() {
        let pieces: Vec<_> = split_write(1000, 21, 7).collect();
        assert_eq!(pieces, vec![(1000, 0..7), (1007, 7..14), (1014, 14..21)]);
    }

    #[test]
    fn test_split_empty() {
        assert_eq!(split_write(0, 0, 7).count(), 0);
    }
}
