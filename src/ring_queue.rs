//! Fixed-capacity circular queue guarded by a spinlock.
//!
//! Reads and writes never block: a full queue rejects the write and an
//! empty queue rejects the read. The lock is taken explicitly with
//! [`RingQueue::lock`] so a caller can run several operations (or check
//! some other state) atomically with respect to the queue.

use std::fmt;

use crate::error::{PipelineError, Result};
use crate::spin::{SpinGuard, SpinLock};

/// Returned by [`RingQueueGuard::try_write`] when every slot is taken.
/// Carries the rejected item back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is empty")
    }
}

struct Ring<T> {
    slots: Box<[Option<T>]>,
    len: usize,
    write_i: usize,
    read_i: usize,
}

pub struct RingQueue<T> {
    capacity: usize,
    ring: SpinLock<Ring<T>>,
}

impl<T> RingQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }

        let mut slots: Vec<Option<T>> = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| PipelineError::Allocation {
                what: "ring queue",
                bytes: capacity.saturating_mul(std::mem::size_of::<Option<T>>()),
            })?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            capacity,
            ring: SpinLock::new(Ring {
                slots: slots.into_boxed_slice(),
                len: 0,
                write_i: 0,
                read_i: 0,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of a single slot in bytes.
    pub fn item_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    pub fn lock(&self) -> RingQueueGuard<'_, T> {
        RingQueueGuard {
            ring: self.ring.lock(),
        }
    }
}

/// Exclusive access to the queue. The lock is released when the guard drops.
pub struct RingQueueGuard<'a, T> {
    ring: SpinGuard<'a, Ring<T>>,
}

impl<T> RingQueueGuard<'_, T> {
    pub fn try_write(&mut self, item: T) -> std::result::Result<(), Full<T>> {
        let ring = &mut *self.ring;
        if ring.len == ring.slots.len() {
            return Err(Full(item));
        }

        ring.slots[ring.write_i] = Some(item);
        ring.len += 1;
        ring.write_i += 1;
        if ring.write_i == ring.slots.len() {
            ring.write_i = 0;
        }
        Ok(())
    }

    pub fn try_read(&mut self) -> std::result::Result<T, Empty> {
        let ring = &mut *self.ring;
        if ring.len == 0 {
            return Err(Empty);
        }

        let item = ring.slots[ring.read_i].take().ok_or(Empty)?;
        ring.len -= 1;
        ring.read_i += 1;
        if ring.read_i == ring.slots.len() {
            ring.read_i = 0;
        }
        Ok(item)
    }

    /// Removes every queued item, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.ring.len);
        while let Ok(item) = self.try_read() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.ring.len
    }

    pub fn is_empty(&self) -> bool {
        self.ring.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.ring.len == self.ring.slots.len()
    }

    pub fn write_index(&self) -> usize {
        self.ring.write_i
    }

    pub fn read_index(&self) -> usize {
        self.ring.read_i
    }
}
