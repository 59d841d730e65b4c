//! Reusable read buffers for the upload path.
//!
//! Every served chunk needs a buffer of up to one chunk size. The pool keeps a
//! bounded stack of idle buffers so steady-state serving does not allocate.
//! Buffers that grew past the configured size are freed instead of pooled.
//! It is safe to share between threads; the engine itself only rents a buffer
//! for the duration of a single read-and-reply.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
pub struct BufferPool {
    /// Capacity of freshly allocated buffers and the largest capacity kept idle.
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            buffer_size,
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Rent a zeroed buffer of exactly `len` bytes.
    pub fn acquire(self: &Arc<Self>, len: usize) -> PooledBuffer {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut buf = reused.unwrap_or_else(|| Vec::with_capacity(self.buffer_size.max(len)));
        buf.clear();
        buf.resize(len, 0);
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of buffers currently waiting to be reused.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, buf: Vec<u8>) {
        if buf.capacity() > self.buffer_size {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// A rented buffer. Returns to its pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
