//! Fixed-size pool of frame buffers.
//!
//! Every received frame lives in a buffer taken from the pool. The [`Frame`]
//! handle gives it back when dropped, so a frame is released exactly once no
//! matter which path its processing took. An exhausted pool refuses new
//! frames instead of growing.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Largest frame a pool buffer holds.
pub const MAX_FRAME_SIZE: usize = 2048;

type Slots = Arc<Mutex<Vec<Vec<u8>>>>;

/// A received frame backed by a pooled buffer.
pub struct Frame {
    data: Vec<u8>,
    pool: Slots,
}

impl Frame {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.data);
        buffer.clear();
        self.pool.lock().push(buffer);
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.data.len()).finish()
    }
}

/// A pool of reusable frame buffers. Clones share the same buffers.
#[derive(Clone)]
pub struct BufferPool {
    slots: Slots,
    size: usize,
}

impl BufferPool {
    /// Create a pool with `size` pre-allocated buffers of [`MAX_FRAME_SIZE`].
    pub fn new(size: usize) -> Self {
        let buffers = (0..size)
            .map(|_| Vec::with_capacity(MAX_FRAME_SIZE))
            .collect();

        Self {
            slots: Arc::new(Mutex::new(buffers)),
            size,
        }
    }

    /// Copy `bytes` into a free buffer.
    ///
    /// Returns `None` when the pool is exhausted or `bytes` does not fit in a
    /// buffer.
    pub fn frame_from(&self, bytes: &[u8]) -> Option<Frame> {
        if bytes.len() > MAX_FRAME_SIZE {
            return None;
        }
        let mut data = self.slots.lock().pop()?;
        data.extend_from_slice(bytes);

        Some(Frame {
            data,
            pool: Arc::clone(&self.slots),
        })
    }

    /// Number of buffers currently free.
    pub fn available(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of buffers currently held by live frames.
    pub fn in_use(&self) -> usize {
        self.size - self.available()
    }

    /// Total number of buffers owned by the pool.
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}
