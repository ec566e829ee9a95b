#![forbid(unsafe_code)]

//! Reusable byte buffers.
//!
//! Every decompressed archive member lives in a [`PooledBuffer`]. Dropping
//! the guard clears the buffer and hands it back to its pool, so buffers
//! are returned on every exit path including early error returns.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;

/// Number of idle buffers kept by the shared pool.
const SHARED_IDLE: usize = 64;

static SHARED: Lazy<Arc<BufferPool>> = Lazy::new(|| Arc::new(BufferPool::new(SHARED_IDLE)));

/// A bounded free list of byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
}

impl BufferPool {
    /// Create a pool that keeps at most `max_idle` released buffers.
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// The process-wide pool.
    pub fn shared() -> Arc<BufferPool> {
        Arc::clone(&SHARED)
    }

    /// Take an empty buffer from the pool, allocating if none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self.free.lock().pop().unwrap_or_default();
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Return the buffer to its pool now.
    pub fn release(self) {}
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}
