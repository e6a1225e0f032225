//! `std::io::Write` adapter that feeds a registered file of a shared context

use std::io::{self, Write};
use std::path::Path;

use bytes::BytesMut;
use tracing::warn;

use super::{lock, FileHandle, SharedIo};
use crate::constants::SINK_CHUNK_SIZE;
use crate::error::Result;

/// Buffers writes into chunks and enqueues each full chunk without waiting.
pub struct AsyncSink {
    ctx: SharedIo,
    handle: FileHandle,
    buffer: BytesMut,
    chunk_size: usize,
}

impl AsyncSink {
    /// Register `path` with `ctx` and write to it through the context.
    pub fn open(ctx: SharedIo, path: &Path) -> Result<Self> {
        let handle = lock(&ctx)?.register(path)?;
        Ok(Self {
            ctx,
            handle,
            buffer: BytesMut::with_capacity(SINK_CHUNK_SIZE),
            chunk_size: SINK_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn handle(&self) -> FileHandle {
        self.handle
    }

    /// Closes this sink's file once its writer is done with the sink.
    pub fn closer(&self) -> HandleCloser {
        HandleCloser {
            ctx: self.ctx.clone(),
            handle: self.handle,
        }
    }

    fn dispatch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        self.buffer.reserve(self.chunk_size);

        let mut ctx = lock(&self.ctx)?;
        ctx.enqueue(self.handle, chunk)?;
        ctx.submit()?;
        // Reap whatever already finished, never block here
        ctx.await_some(0)?;
        Ok(())
    }

    /// Enqueue the tail and close the file once its writes complete.
    pub fn finish(mut self) -> Result<()> {
        self.dispatch()?;
        self.closer().close()
    }
}

impl Write for AsyncSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.chunk_size {
            self.dispatch().map_err(io::Error::other)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.dispatch().map_err(io::Error::other)
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        // Best effort: hand off anything a writer forgot to flush
        if !self.buffer.is_empty() {
            if let Err(e) = self.dispatch() {
                warn!("Dropping {} unflushed bytes: {}", self.buffer.len(), e);
            }
        }
    }
}

/// Completes and closes one registered file of a shared context
pub struct HandleCloser {
    ctx: SharedIo,
    handle: FileHandle,
}

impl HandleCloser {
    pub fn close(self) -> Result<()> {
        lock(&self.ctx)?.close(self.handle)
    }
}
