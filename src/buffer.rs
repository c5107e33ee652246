//! Fixed-capacity circular history of the most recent samples.
//!
//! Appends overwrite the oldest slot in O(1). Windows are returned newest
//! first, and slots that were never written are reported as `None` so early
//! fill-up never exposes stale data.

use thiserror::Error;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("history buffer capacity must be positive")]
    ZeroCapacity,
    #[error("history buffer is empty")]
    EmptyBuffer,
    #[error("cannot retrieve {requested} elements from a buffer of capacity {capacity}")]
    InvalidArgument { requested: usize, capacity: usize },
}

#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    slots: Vec<Option<T>>,
    cursor: usize,
    len: usize,
}

impl<T: Clone> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            cursor: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots, saturating at the capacity.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn append(&mut self, item: T) {
        self.slots[self.cursor] = Some(item);
        self.cursor = (self.cursor + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
    }

    pub fn last(&self) -> Result<&T, BufferError> {
        self.slots[self.index_back(0)]
            .as_ref()
            .ok_or(BufferError::EmptyBuffer)
    }

    /// The `n` most recent entries, index 0 being the newest.
    pub fn last_n(&self, n: usize) -> Result<Vec<Option<T>>, BufferError> {
        if n > self.capacity() {
            return Err(BufferError::InvalidArgument {
                requested: n,
                capacity: self.capacity(),
            });
        }

        Ok((0..n)
            .map(|offset| {
                if offset < self.len {
                    self.slots[self.index_back(offset)].clone()
                } else {
                    None
                }
            })
            .collect())
    }

    /// The `n` most recent entries in arrival order, or `None` while fewer
    /// than `n` samples have been appended.
    pub fn window(&self, n: usize) -> Result<Option<Vec<T>>, BufferError> {
        let mut newest_first = self.last_n(n)?;
        newest_first.reverse();
        Ok(newest_first.into_iter().collect())
    }

    fn index_back(&self, offset: usize) -> usize {
        let capacity = self.capacity();
        (self.cursor + capacity - 1 - offset % capacity) % capacity
    }
}
