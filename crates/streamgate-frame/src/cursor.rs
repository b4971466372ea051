use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Bounds-checked read cursor over a datagram buffer.
///
/// Every read either succeeds completely or fails with
/// [`FrameError::OutOfBounds`] and leaves the position untouched.
/// Slices handed out share the underlying allocation.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    buf: Bytes,
    pos: usize,
}

impl ByteCursor {
    /// Create a cursor positioned at the start of `buf`.
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Current read offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or(FrameError::OutOfBounds {
            wanted: 1,
            remaining: 0,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<Bytes> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(FrameError::OutOfBounds {
                wanted: n,
                remaining,
            });
        }
        let out = self.buf.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(out)
    }

    /// Bytes between `start` and the current position.
    ///
    /// `start` must be an offset previously returned by [`position`](Self::position).
    pub fn since(&self, start: usize) -> Bytes {
        self.buf.slice(start.min(self.pos)..self.pos)
    }

    /// Everything from `start` to the end of the buffer, without advancing.
    pub fn rest_from(&self, start: usize) -> Bytes {
        self.buf.slice(start.min(self.buf.len())..)
    }

    /// Consume and return everything left.
    pub fn take_rest(&mut self) -> Bytes {
        let out = self.buf.slice(self.pos..);
        self.pos = self.buf.len();
        out
    }
}
