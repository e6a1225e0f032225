//! Completion backends behind the shared I/O context

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::str::FromStr;

use libc::{c_void, off_t, pwrite};

/// One kernel write. `data` is owned by the context until `id` completes.
pub(crate) struct WriteOp<'a> {
    pub id: u64,
    pub fd: RawFd,
    pub data: &'a [u8],
    pub offset: u64,
}

/// Kernel-style result: bytes written, or a negated errno
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    pub id: u64,
    pub result: i32,
}

pub(crate) trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Whether writes overlap with the caller. Synchronous backends finish
    /// every write inside `push`.
    fn is_async(&self) -> bool;

    /// Queue one write. `Ok(false)` means the submission queue is full.
    fn push(&mut self, op: WriteOp<'_>) -> io::Result<bool>;

    /// Hand queued writes to the kernel in one call.
    fn submit(&mut self) -> io::Result<usize>;

    /// Block until at least `min` completions are available, then collect
    /// every available completion into `out`.
    fn wait(&mut self, min: usize, out: &mut Vec<Completion>) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// io_uring when the kernel allows it, synchronous otherwise
    #[default]
    Auto,
    Uring,
    Sync,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Auto => "auto",
            BackendKind::Uring => "io_uring",
            BackendKind::Sync => "sync",
        })
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "uring" | "io_uring" | "io-uring" => Ok(BackendKind::Uring),
            "sync" | "pwrite" => Ok(BackendKind::Sync),
            other => Err(format!("unknown I/O backend '{}'", other)),
        }
    }
}

/// Perform pwrite using raw file descriptor
///
/// Writes at a specific offset without changing the file position.
pub fn pwrite_fd(fd: RawFd, buf: &[u8], offset: u64) -> io::Result<usize> {
    let result = unsafe {
        pwrite(
            fd,
            buf.as_ptr() as *const c_void,
            buf.len(),
            offset as off_t,
        )
    };

    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result as usize)
    }
}

/// pwrite until every byte of `buf` is at `offset..offset + buf.len()`.
pub fn pwrite_all(fd: RawFd, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match pwrite_fd(fd, buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Writes immediately in `push` and replays the results on `wait`
#[derive(Debug, Default)]
pub(crate) struct SyncBackend {
    done: Vec<Completion>,
}

impl Backend for SyncBackend {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn is_async(&self) -> bool {
        false
    }

    fn push(&mut self, op: WriteOp<'_>) -> io::Result<bool> {
        let result = match pwrite_all(op.fd, op.data, op.offset) {
            Ok(()) => op.data.len() as i32,
            Err(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        };
        self.done.push(Completion { id: op.id, result });
        Ok(true)
    }

    fn submit(&mut self) -> io::Result<usize> {
        Ok(0)
    }

    fn wait(&mut self, _min: usize, out: &mut Vec<Completion>) -> io::Result<()> {
        out.append(&mut self.done);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub(crate) use uring::UringBackend;

#[cfg(target_os = "linux")]
mod uring {
    use super::{Backend, Completion, WriteOp};
    use io_uring::{opcode, types, IoUring};
    use std::io;

    pub(crate) struct UringBackend {
        ring: IoUring,
    }

    impl UringBackend {
        pub(crate) fn new(entries: u32) -> io::Result<Self> {
            Ok(Self {
                ring: IoUring::new(entries.next_power_of_two())?,
            })
        }
    }

    fn retry_interrupted<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        loop {
            match f() {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    impl Backend for UringBackend {
        fn name(&self) -> &'static str {
            "io_uring"
        }

        fn is_async(&self) -> bool {
            true
        }

        fn push(&mut self, op: WriteOp<'_>) -> io::Result<bool> {
            // Chunks never exceed i32::MAX, so the length fits
            let entry = opcode::Write::new(types::Fd(op.fd), op.data.as_ptr(), op.data.len() as u32)
                .offset(op.offset)
                .build()
                .user_data(op.id);
            // SAFETY: the context owns the buffer behind `op.data` until the
            // completion for `op.id` has been reaped.
            let pushed = unsafe { self.ring.submission().push(&entry) }.is_ok();
            Ok(pushed)
        }

        fn submit(&mut self) -> io::Result<usize> {
            retry_interrupted(|| self.ring.submit())
        }

        fn wait(&mut self, min: usize, out: &mut Vec<Completion>) -> io::Result<()> {
            if min > 0 {
                retry_interrupted(|| self.ring.submit_and_wait(min))?;
            }
            out.extend(self.ring.completion().map(|cqe| Completion {
                id: cqe.user_data(),
                result: cqe.result(),
            }));
            Ok(())
        }
    }
}
