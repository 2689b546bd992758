//! Fixed-capacity circular buffer with overwrite-on-full semantics.
//! Storage is allocated once at construction and never grows.
//! One slot is reserved so that `head == tail` always means empty.

use thiserror::Error;

/// Returned by [`RingBuffer::pop`] when there is nothing to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ring buffer is empty")]
pub struct EmptyBufferError;

/// Circular buffer holding at most `capacity` elements. Pushing into a full
/// buffer evicts the oldest element.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Box<[T]>,
    /// Next slot to write.
    head: usize,
    /// Oldest retained element.
    tail: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring buffer retaining the last `capacity` pushed elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be > 0");
        Self {
            buffer: vec![T::default(); capacity + 1].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Append an element. Never fails; evicts the oldest element when full.
    #[inline]
    pub fn push(&mut self, item: T) {
        let slots = self.buffer.len();
        self.buffer[self.head] = item;
        self.head = (self.head + 1) % slots;
        if self.head == self.tail {
            self.tail = (self.tail + 1) % slots;
        }
    }

    /// Remove and return the oldest element.
    #[inline]
    pub fn pop(&mut self) -> Result<T, EmptyBufferError> {
        if self.is_empty() {
            return Err(EmptyBufferError);
        }
        let item = self.buffer[self.tail];
        self.tail = (self.tail + 1) % self.buffer.len();
        Ok(item)
    }

    /// Copy up to `out.len()` of the oldest elements into `out`, oldest
    /// first, without removing them. Returns the number copied, which is
    /// clamped to the current size.
    ///
    /// Copies in at most two contiguous segments: from the read cursor to
    /// the end of storage, then from the start of storage.
    pub fn peek_into(&self, out: &mut [T]) -> usize {
        let count = out.len().min(self.len());
        let to_end = self.buffer.len() - self.tail;
        let first = count.min(to_end);
        let second = count - first;

        out[..first].copy_from_slice(&self.buffer[self.tail..self.tail + first]);
        if second > 0 {
            out[first..count].copy_from_slice(&self.buffer[..second]);
        }
        count
    }

    /// Return up to `count` of the oldest elements, oldest first.
    pub fn peek(&self, count: usize) -> Vec<T> {
        let mut out = vec![T::default(); count.min(self.len())];
        self.peek_into(&mut out);
        out
    }

    /// Drop everything currently held.
    pub fn clear(&mut self) {
        self.tail = self.head;
    }
}

impl<T> RingBuffer<T> {
    /// Number of retained elements.
    #[inline]
    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.buffer.len() - (self.tail - self.head)
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        (self.head + 1) % self.buffer.len() == self.tail
    }

    /// Logical capacity (excludes the reserved slot).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }
}
