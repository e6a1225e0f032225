//! I/O statistics tracking for the shared I/O context

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks write-path statistics for debugging and performance analysis
#[derive(Debug, Clone)]
pub struct IoStatsTracker {
    // Caller-visible requests
    pub write_requests: Arc<AtomicU64>,
    pub write_bytes: Arc<AtomicU64>,
    // Kernel-visible operations
    pub kernel_ops: Arc<AtomicU64>,
    pub split_requests: Arc<AtomicU64>,
    pub completions: Arc<AtomicU64>,
    pub resubmissions: Arc<AtomicU64>,
}

impl Default for IoStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IoStatsTracker {
    pub fn new() -> Self {
        Self {
            write_requests: Arc::new(AtomicU64::new(0)),
            write_bytes: Arc::new(AtomicU64::new(0)),
            kernel_ops: Arc::new(AtomicU64::new(0)),
            split_requests: Arc::new(AtomicU64::new(0)),
            completions: Arc::new(AtomicU64::new(0)),
            resubmissions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add an enqueued request
    pub fn add_request(&self, bytes: u64) {
        self.write_requests.fetch_add(1, Ordering::Relaxed);
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add kernel operations issued for one request
    pub fn add_kernel_ops(&self, ops: u64) {
        self.kernel_ops.fetch_add(ops, Ordering::Relaxed);
        if ops > 1 {
            self.split_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn add_completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_resubmission(&self) {
        self.resubmissions.fetch_add(1, Ordering::Relaxed);
        self.kernel_ops.fetch_add(1, Ordering::Relaxed);
    }

    /// Get write statistics as (requests, bytes)
    pub fn get_write_stats(&self) -> (u64, u64) {
        (
            self.write_requests.load(Ordering::Relaxed),
            self.write_bytes.load(Ordering::Relaxed),
        )
    }

    /// Get detailed statistics
    pub fn get_detailed_stats(&self) -> IoStats {
        IoStats {
            write_requests: self.write_requests.load(Ordering::Relaxed),
            write_bytes: self.write_bytes.load(Ordering::Relaxed),
            kernel_ops: self.kernel_ops.load(Ordering::Relaxed),
            split_requests: self.split_requests.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            resubmissions: self.resubmissions.load(Ordering::Relaxed),
        }
    }
}

/// Detailed I/O statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub write_requests: u64,
    pub write_bytes: u64,
    pub kernel_ops: u64,
    pub split_requests: u64,
    pub completions: u64,
    pub resubmissions: u64,
}

impl IoStats {
    /// Kernel operations that have not reported a completion yet
    pub fn outstanding_ops(&self) -> u64 {
        self.kernel_ops.saturating_sub(self.completions + self.resubmissions)
    }
}
