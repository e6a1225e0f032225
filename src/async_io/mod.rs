//! Shared asynchronous I/O context.
//!
//! Many growing output files are multiplexed through one completion queue.
//! A file's write offset is reserved when a buffer is enqueued, never when it
//! completes, so bytes land in enqueue order whatever order the kernel finishes
//! them in. Requests larger than the kernel's single-write ceiling are split at
//! exactly that ceiling before submission.
//!
//! The context is driven by one caller at a time. Several writers in one
//! process share it through [`SharedIo`]; separate processes or threads that
//! want independence each build their own.

mod backend;
pub mod sink;

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, error, trace, warn};

use crate::constants::{split_write, DEFAULT_QUEUE_DEPTH, MAX_WRITE_BYTES};
use crate::error::{Error, Result};
use crate::io_stats::{IoStats, IoStatsTracker};

use backend::{Backend, Completion, SyncBackend, WriteOp};
pub use backend::{pwrite_all, pwrite_fd, BackendKind};
pub use sink::{AsyncSink, HandleCloser};

/// A context shared by every writer of one coordinating thread
pub type SharedIo = Arc<Mutex<SharedIoContext>>;

/// Wrap a context so several writers can hold it
pub fn shared(ctx: SharedIoContext) -> SharedIo {
    Arc::new(Mutex::new(ctx))
}

/// Lock a shared context for one call sequence
///
/// A panic while the lock was held leaves the mutex poisoned. That is reported
/// as `InvalidState` instead of handing out a context in an unknown state.
pub fn lock(ctx: &SharedIo) -> Result<MutexGuard<'_, SharedIoContext>> {
    ctx.lock()
        .map_err(|_| Error::InvalidState("shared I/O context lock poisoned"))
}

/// Opaque id of a registered file, valid until `close` or `close_all`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u32);

impl FileHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Settings for [`SharedIoContext::new`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoContextConfig {
    /// Most kernel operations in flight at once
    pub queue_depth: u32,
    /// Largest single kernel write. Only tests lower it.
    pub max_write_bytes: usize,
    /// `Auto` tries io_uring and falls back to synchronous writes
    pub backend: BackendKind,
}

impl Default for IoContextConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_write_bytes: MAX_WRITE_BYTES,
            backend: BackendKind::Auto,
        }
    }
}

impl IoContextConfig {
    pub fn with_queue_depth(mut self, depth: u32) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_max_write_bytes(mut self, bytes: usize) -> Self {
        self.max_write_bytes = bytes;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Reject a zero queue depth and a write ceiling outside `1..=MAX_WRITE_BYTES`
    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(Error::Config("queue depth must be at least 1".into()));
        }
        if self.max_write_bytes == 0 || self.max_write_bytes > MAX_WRITE_BYTES {
            return Err(Error::Config(format!(
                "max write size must be in 1..={}, got {}",
                MAX_WRITE_BYTES, self.max_write_bytes
            )));
        }
        Ok(())
    }
}

fn open_backend(config: &IoContextConfig) -> Result<Box<dyn Backend>> {
    match config.backend {
        BackendKind::Sync => Ok(Box::new(SyncBackend::default())),
        #[cfg(target_os = "linux")]
        BackendKind::Uring => Ok(Box::new(backend::UringBackend::new(config.queue_depth)?)),
        #[cfg(target_os = "linux")]
        BackendKind::Auto => match backend::UringBackend::new(config.queue_depth) {
            Ok(ring) => Ok(Box::new(ring)),
            Err(e) => {
                warn!("io_uring unavailable ({}), falling back to synchronous writes", e);
                Ok(Box::new(SyncBackend::default()))
            }
        },
        #[cfg(not(target_os = "linux"))]
        BackendKind::Uring => Err(Error::Config("io_uring requires Linux".into())),
        #[cfg(not(target_os = "linux"))]
        BackendKind::Auto => Ok(Box::new(SyncBackend::default())),
    }
}

struct FileRegistration {
    file: File,
    path: PathBuf,
    offset: u64,
}

struct WriteRequest {
    handle: FileHandle,
    data: Bytes,
    offset: u64,
}

struct InFlight {
    handle: FileHandle,
    data: Bytes,
    offset: u64,
}

/// One completion queue shared by many output files
///
/// Each registered file has its own offset, reserved when data is enqueued.
/// Buffers are owned as `Bytes` until their completion is reaped, so callers
/// can drop their copies right after `enqueue`.
pub struct SharedIoContext {
    backend: Box<dyn Backend>,
    files: HashMap<FileHandle, FileRegistration>,
    next_handle: u32,
    queued: VecDeque<WriteRequest>,
    in_flight: HashMap<u64, InFlight>,
    next_op: u64,
    queue_depth: usize,
    max_write_bytes: usize,
    stats: IoStatsTracker,
    poisoned: Option<String>,
}

impl SharedIoContext {
    /// Create a context with the configured backend
    ///
    /// # Arguments
    /// * `config` - Queue depth, write ceiling and backend choice
    ///
    /// # Returns
    /// The context, or `Config` for invalid settings. An explicit `Uring`
    /// request fails when the ring cannot be created; `Auto` falls back.
    pub fn new(config: IoContextConfig) -> Result<Self> {
        config.validate()?;
        let backend = open_backend(&config)?;
        Ok(Self::with_backend(&config, backend))
    }

    fn with_backend(config: &IoContextConfig, backend: Box<dyn Backend>) -> Self {
        debug!(
            "I/O context using {} backend, depth {}, write ceiling {}",
            backend.name(),
            config.queue_depth,
            config.max_write_bytes
        );
        Self {
            backend,
            files: HashMap::new(),
            next_handle: 0,
            queued: VecDeque::new(),
            in_flight: HashMap::new(),
            next_op: 0,
            queue_depth: config.queue_depth as usize,
            max_write_bytes: config.max_write_bytes,
            stats: IoStatsTracker::new(),
            poisoned: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_async(&self) -> bool {
        self.backend.is_async()
    }

    /// Create or truncate `path` and start tracking its offset at 0.
    ///
    /// The descriptor stays open until the handle is closed. Registering the
    /// same path twice gives two handles with independent offsets, which
    /// overwrite each other; callers register each output once.
    ///
    /// # Arguments
    /// * `path` - File to create
    ///
    /// # Returns
    /// A fresh handle, `Io` if the file cannot be opened, or
    /// `ContextPoisoned` after an earlier failed write
    pub fn register(&mut self, path: impl AsRef<Path>) -> Result<FileHandle> {
        self.ensure_healthy()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        let handle = FileHandle(self.next_handle);
        self.next_handle += 1;
        debug!("Registered {} as handle {}", path.display(), handle.0);
        self.files.insert(
            handle,
            FileRegistration {
                file,
                path,
                offset: 0,
            },
        );
        Ok(handle)
    }

    /// Reserve space for `data` at the handle's current offset and queue it.
    ///
    /// The offset advances now, before any submission, so the bytes of one
    /// handle land in enqueue order whatever order completions arrive in.
    /// With the synchronous backend the write happens before this returns.
    ///
    /// # Arguments
    /// * `handle` - A registered handle
    /// * `data` - Bytes to write; empty data reserves nothing
    ///
    /// # Returns
    /// The file offset reserved for `data`, `UnknownHandle` for a closed or
    /// foreign handle, or `ContextPoisoned`
    pub fn enqueue(&mut self, handle: FileHandle, data: impl Into<Bytes>) -> Result<u64> {
        self.ensure_healthy()?;
        let data = data.into();
        let registration = self
            .files
            .get_mut(&handle)
            .ok_or(Error::UnknownHandle(handle.0))?;

        let offset = registration.offset;
        if data.is_empty() {
            return Ok(offset);
        }
        registration.offset += data.len() as u64;
        self.stats.add_request(data.len() as u64);
        trace!("Enqueued {} bytes for handle {} at {}", data.len(), handle.0, offset);
        self.queued.push_back(WriteRequest {
            handle,
            data,
            offset,
        });

        if !self.backend.is_async() {
            self.submit()?;
            self.reap(0)?;
        }
        Ok(offset)
    }

    /// Push every queued request to the kernel, splitting oversized ones.
    ///
    /// Requests above the write ceiling become several operations at
    /// consecutive offsets. Blocks only when the queue depth is exhausted and a
    /// completion must be reaped first.
    ///
    /// # Returns
    /// The number of kernel operations issued
    pub fn submit(&mut self) -> Result<usize> {
        self.ensure_healthy()?;
        let mut ops = 0;
        while let Some(request) = self.queued.pop_front() {
            let pieces = request.data.len().div_ceil(self.max_write_bytes);
            for (offset, range) in split_write(request.offset, request.data.len(), self.max_write_bytes) {
                self.push_op(request.handle, request.data.slice(range), offset)?;
            }
            self.stats.add_kernel_ops(pieces as u64);
            ops += pieces;
        }
        self.backend_submit()?;
        Ok(ops)
    }

    /// Block until at least `min_count` operations complete.
    ///
    /// `min_count` is clamped to what is in flight. A short completion is
    /// resubmitted for its remainder and does not count. Any failed or
    /// zero-byte completion poisons the context and is returned as an error.
    ///
    /// # Arguments
    /// * `min_count` - Completions to wait for; 0 only reaps what is ready
    ///
    /// # Returns
    /// The number of completions reaped
    pub fn await_some(&mut self, min_count: usize) -> Result<usize> {
        self.ensure_healthy()?;
        self.reap(min_count)
    }

    /// Submit anything queued and wait until nothing is pending.
    ///
    /// Handles stay registered and can take more writes afterwards.
    pub fn drain(&mut self) -> Result<()> {
        self.ensure_healthy()?;
        self.submit()?;
        while !self.in_flight.is_empty() {
            let outstanding = self.in_flight.len();
            self.reap(outstanding)?;
        }
        Ok(())
    }

    /// Finish the handle's outstanding writes, then close its descriptor.
    ///
    /// Writes of other handles are submitted too but only this handle's are
    /// awaited. A later use of `handle` fails with `UnknownHandle`.
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        if !self.files.contains_key(&handle) {
            return Err(Error::UnknownHandle(handle.0));
        }
        if self.has_outstanding(handle) {
            self.ensure_healthy()?;
            self.submit()?;
            while self.in_flight.values().any(|op| op.handle == handle) {
                self.reap(1)?;
            }
        }
        match self.files.remove(&handle) {
            Some(registration) => close_registration(registration),
            None => Err(Error::UnknownHandle(handle.0)),
        }
    }

    /// Drain, then close every registered descriptor.
    ///
    /// Every descriptor is closed even if one fails; the first failure is
    /// returned.
    pub fn close_all(&mut self) -> Result<()> {
        self.drain()?;
        let mut handles: Vec<FileHandle> = self.files.keys().copied().collect();
        handles.sort();

        let mut first_error = None;
        for handle in handles {
            if let Some(registration) = self.files.remove(&handle) {
                if let Err(e) = close_registration(registration) {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Queued plus in-flight operations
    pub fn pending_count(&self) -> usize {
        self.queued.len() + self.in_flight.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Next offset that will be reserved for `handle`
    pub fn offset(&self, handle: FileHandle) -> Option<u64> {
        self.files.get(&handle).map(|r| r.offset)
    }

    pub fn path(&self, handle: FileHandle) -> Option<&Path> {
        self.files.get(&handle).map(|r| r.path.as_path())
    }

    pub fn stats(&self) -> IoStats {
        self.stats.get_detailed_stats()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn ensure_healthy(&self) -> Result<()> {
        match &self.poisoned {
            Some(reason) => Err(Error::ContextPoisoned(reason.clone())),
            None => Ok(()),
        }
    }

    fn poison(&mut self, err: Error) -> Error {
        error!("Shared I/O context failed: {}", err);
        self.poisoned.get_or_insert_with(|| err.to_string());
        err
    }

    fn has_outstanding(&self, handle: FileHandle) -> bool {
        self.queued.iter().any(|r| r.handle == handle)
            || self.in_flight.values().any(|op| op.handle == handle)
    }

    fn path_of(&self, handle: FileHandle) -> PathBuf {
        self.files
            .get(&handle)
            .map(|r| r.path.clone())
            .unwrap_or_default()
    }

    fn backend_submit(&mut self) -> Result<()> {
        if let Err(e) = self.backend.submit() {
            return Err(self.poison(Error::Os(e)));
        }
        Ok(())
    }

    fn push_op(&mut self, handle: FileHandle, data: Bytes, offset: u64) -> Result<()> {
        let fd = self
            .files
            .get(&handle)
            .ok_or(Error::UnknownHandle(handle.0))?
            .file
            .as_raw_fd();

        while self.in_flight.len() >= self.queue_depth {
            self.backend_submit()?;
            self.reap(1)?;
        }

        let id = self.next_op;
        self.next_op += 1;
        loop {
            let op = WriteOp {
                id,
                fd,
                data: &data,
                offset,
            };
            match self.backend.push(op) {
                Ok(true) => break,
                // Submitting empties the submission queue
                Ok(false) => self.backend_submit()?,
                Err(e) => {
                    let path = self.path_of(handle);
                    return Err(self.poison(Error::io(path, e)));
                }
            }
        }
        self.in_flight.insert(
            id,
            InFlight {
                handle,
                data,
                offset,
            },
        );
        Ok(())
    }

    /// Collect completions until `min` requests have fully finished.
    fn reap(&mut self, min: usize) -> Result<usize> {
        let target = min.min(self.in_flight.len());
        let mut done = 0;
        let mut completions = Vec::new();
        loop {
            let want = target.saturating_sub(done);
            if let Err(e) = self.backend.wait(want, &mut completions) {
                return Err(self.poison(Error::Os(e)));
            }
            for completion in completions.drain(..) {
                done += self.complete(completion)?;
            }
            if done >= target || self.in_flight.is_empty() {
                return Ok(done);
            }
        }
    }

    fn complete(&mut self, completion: Completion) -> Result<usize> {
        let Some(op) = self.in_flight.remove(&completion.id) else {
            warn!("Completion for unknown operation {}", completion.id);
            return Ok(0);
        };

        if completion.result < 0 {
            let source = io::Error::from_raw_os_error(-completion.result);
            let path = self.path_of(op.handle);
            return Err(self.poison(Error::io(path, source)));
        }

        let written = completion.result as usize;
        if written >= op.data.len() {
            self.stats.add_completion();
            return Ok(1);
        }
        if written == 0 {
            let path = self.path_of(op.handle);
            return Err(self.poison(Error::io(path, io::ErrorKind::WriteZero.into())));
        }

        // Short write: the rest goes back in at the advanced offset
        self.stats.add_resubmission();
        self.push_op(op.handle, op.data.slice(written..), op.offset + written as u64)?;
        self.backend_submit()?;
        Ok(0)
    }
}

fn close_registration(registration: FileRegistration) -> Result<()> {
    let fd = registration.file.into_raw_fd();
    let result = unsafe { libc::close(fd) };
    if result < 0 {
        return Err(Error::io(registration.path, io::Error::last_os_error()));
    }
    Ok(())
}

impl Drop for SharedIoContext {
    fn drop(&mut self) {
        if self.pending_count() > 0 && self.poisoned.is_none() {
            if let Err(e) = self.drain() {
                warn!("Failed to drain I/O context on drop: {}", e);
            }
        }
        if !self.in_flight.is_empty() {
            // The kernel may still read these buffers
            warn!("Leaking {} unfinished write buffers", self.in_flight.len());
            std::mem::forget(std::mem::take(&mut self.in_flight));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Holds every write until `wait`, then performs them newest first.
    #[derive(Default)]
    struct ReversingBackend {
        held: Vec<(u64, i32, Vec<u8>, u64)>,
    }

    impl Backend for ReversingBackend {
        fn name(&self) -> &'static str {
            "reversing"
        }

        fn is_async(&self) -> bool {
            true
        }

        fn push(&mut self, op: WriteOp<'_>) -> io::Result<bool> {
            self.held.push((op.id, op.fd, op.data.to_vec(), op.offset));
            Ok(true)
        }

        fn submit(&mut self) -> io::Result<usize> {
            Ok(self.held.len())
        }

        fn wait(&mut self, _min: usize, out: &mut Vec<Completion>) -> io::Result<()> {
            while let Some((id, fd, data, offset)) = self.held.pop() {
                pwrite_all(fd, &data, offset)?;
                out.push(Completion {
                    id,
                    result: data.len() as i32,
                });
            }
            Ok(())
        }
    }

    /// Completes every write short by one byte the first time it is seen.
    #[derive(Default)]
    struct ShortWriteBackend {
        held: Vec<Completion>,
    }

    impl Backend for ShortWriteBackend {
        fn name(&self) -> &'static str {
            "short"
        }

        fn is_async(&self) -> bool {
            true
        }

        fn push(&mut self, op: WriteOp<'_>) -> io::Result<bool> {
            let len = if op.data.len() > 1 { op.data.len() - 1 } else { op.data.len() };
            pwrite_all(op.fd, &op.data[..len], op.offset)?;
            self.held.push(Completion {
                id: op.id,
                result: len as i32,
            });
            Ok(true)
        }

        fn submit(&mut self) -> io::Result<usize> {
            Ok(0)
        }

        fn wait(&mut self, _min: usize, out: &mut Vec<Completion>) -> io::Result<()> {
            out.append(&mut self.held);
            Ok(())
        }
    }

    /// Fails every write with the given errno.
    struct FailingBackend(i32, Vec<Completion>);

    impl Backend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn is_async(&self) -> bool {
            true
        }

        fn push(&mut self, op: WriteOp<'_>) -> io::Result<bool> {
            self.1.push(Completion {
                id: op.id,
                result: -self.0,
            });
            Ok(true)
        }

        fn submit(&mut self) -> io::Result<usize> {
            Ok(0)
        }

        fn wait(&mut self, _min: usize, out: &mut Vec<Completion>) -> io::Result<()> {
            out.append(&mut self.1);
            Ok(())
        }
    }

    fn context_with(backend: Box<dyn Backend>, max_write_bytes: usize) -> SharedIoContext {
        let config = IoContextConfig::default().with_max_write_bytes(max_write_bytes);
        SharedIoContext::with_backend(&config, backend)
    }

    #[test]
    fn test_offsets_reserved_at_enqueue() {
        let dir = tempdir().unwrap();
        let mut ctx = context_with(Box::new(ReversingBackend::default()), MAX_WRITE_BYTES);
        let handle = ctx.register(dir.path().join("a.bin")).unwrap();

        assert_eq!(ctx.enqueue(handle, vec![b'a'; 100]).unwrap(), 0);
        assert_eq!(ctx.enqueue(handle, vec![b'b'; 200]).unwrap(), 100);
        assert_eq!(ctx.enqueue(handle, vec![b'c'; 50]).unwrap(), 300);
        assert_eq!(ctx.offset(handle), Some(350));
        assert_eq!(ctx.queued_count(), 3);
        assert_eq!(ctx.in_flight_count(), 0);
    }

    #[test]
    fn test_reversed_completion_order_keeps_enqueue_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reversed.bin");
        let mut ctx = context_with(Box::new(ReversingBackend::default()), MAX_WRITE_BYTES);
        let handle = ctx.register(&path).unwrap();

        let mut expected = Vec::new();
        for i in 0..20u8 {
            let chunk = vec![i; 10 + i as usize];
            expected.extend_from_slice(&chunk);
            ctx.enqueue(handle, chunk).unwrap();
        }
        assert_eq!(ctx.submit().unwrap(), 20);
        ctx.drain().unwrap();
        assert_eq!(ctx.pending_count(), 0);
        ctx.close_all().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }

    #[test]
    fn test_split_pieces_complete_out_of_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("split.bin");
        let mut ctx = context_with(Box::new(ReversingBackend::default()), 7);
        let handle = ctx.register(&path).unwrap();

        let data: Vec<u8> = (0..100u8).collect();
        ctx.enqueue(handle, data.clone()).unwrap();
        assert_eq!(ctx.submit().unwrap(), 15);
        ctx.drain().unwrap();
        ctx.close(handle).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), data);
        let stats = ctx.stats();
        assert_eq!(stats.kernel_ops, 15);
        assert_eq!(stats.split_requests, 1);
        assert_eq!(stats.completions, 15);
    }

    #[test]
    fn test_short_writes_are_resubmitted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let mut ctx = context_with(Box::new(ShortWriteBackend::default()), MAX_WRITE_BYTES);
        let handle = ctx.register(&path).unwrap();

        ctx.enqueue(handle, &b"hello "[..]).unwrap();
        ctx.enqueue(handle, &b"world"[..]).unwrap();
        ctx.drain().unwrap();
        ctx.close_all().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
        assert!(ctx.stats().resubmissions >= 2);
    }

    #[test]
    fn test_failed_completion_poisons_context() {
        let dir = tempdir().unwrap();
        let mut ctx = context_with(Box::new(FailingBackend(libc::ENOSPC, Vec::new())), MAX_WRITE_BYTES);
        let handle = ctx.register(dir.path().join("full.bin")).unwrap();

        ctx.enqueue(handle, vec![0u8; 16]).unwrap();
        ctx.submit().unwrap();
        let err = ctx.await_some(1).unwrap_err();
        assert!(matches!(err, Error::Io { ref source, .. } if source.raw_os_error() == Some(libc::ENOSPC)));
        assert!(ctx.is_poisoned());

        assert!(matches!(ctx.enqueue(handle, vec![1u8]), Err(Error::ContextPoisoned(_))));
        assert!(matches!(ctx.drain(), Err(Error::ContextPoisoned(_))));
    }

    #[test]
    fn test_unknown_handle() {
        let mut ctx = context_with(Box::new(SyncBackend::default()), MAX_WRITE_BYTES);
        assert!(matches!(
            ctx.enqueue(FileHandle(42), vec![1u8]),
            Err(Error::UnknownHandle(42))
        ));
        assert!(matches!(ctx.close(FileHandle(42)), Err(Error::UnknownHandle(42))));
    }

    #[test]
    fn test_queue_depth_bounds_in_flight() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("depth.bin");
        let config = IoContextConfig::default().with_queue_depth(2);
        let mut ctx = SharedIoContext::with_backend(&config, Box::new(ReversingBackend::default()));
        let handle = ctx.register(&path).unwrap();

        for i in 0..9u8 {
            ctx.enqueue(handle, vec![i; 3]).unwrap();
        }
        ctx.submit().unwrap();
        assert!(ctx.in_flight_count() <= 2);
        ctx.close_all().unwrap();

        let expected: Vec<u8> = (0..9u8).flat_map(|i| [i; 3]).collect();
        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }

    #[test]
    fn test_config_validation() {
        assert!(IoContextConfig::default().validate().is_ok());
        assert!(IoContextConfig::default().with_queue_depth(0).validate().is_err());
        assert!(IoContextConfig::default()
            .with_max_write_bytes(MAX_WRITE_BYTES + 1)
            .validate()
            .is_err());
    }
}
