//! Lock-Free Ring Buffer Implementation

use crate::RingBufferError;
use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared storage behind the two handles
struct RingBuffer<T: Copy + Default> {
    /// Pre-allocated storage, one slot more than the usable capacity
    storage: Box<[UnsafeCell<T>]>,
    /// Head position (write pointer)
    head: AtomicUsize,
    /// Tail position (read pointer)
    tail: AtomicUsize,
}

// SAFETY: the ring is only reachable through one `Producer` and one
// `Consumer`. Neither handle is `Sync` and both mutate through `&mut self`,
// so at most one thread writes slots and one thread reads them; slot
// hand-off is ordered through the head/tail atomics.
unsafe impl<T: Copy + Default + Send> Send for RingBuffer<T> {}
unsafe impl<T: Copy + Default + Send> Sync for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        let slots = capacity.max(1) + 1;
        let storage: Vec<UnsafeCell<T>> = (0..slots).map(|_| UnsafeCell::new(T::default())).collect();
        Self {
            storage: storage.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    fn slots(&self) -> usize {
        self.storage.len()
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            self.slots() - tail + head
        }
    }

    fn capacity(&self) -> usize {
        self.slots() - 1
    }
}

/// Create a queue holding up to `capacity` items
pub fn channel<T: Copy + Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let ring = Arc::new(RingBuffer::new(capacity));
    (
        Producer {
            ring: Arc::clone(&ring),
            _not_sync: PhantomData,
        },
        Consumer {
            ring,
            _not_sync: PhantomData,
        },
    )
}

/// Writing end of the queue
pub struct Producer<T: Copy + Default> {
    ring: Arc<RingBuffer<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Copy + Default> Producer<T> {
    /// Push an item. Fails when the buffer is full.
    pub fn push(&mut self, item: T) -> Result<(), RingBufferError> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let next_head = (head + 1) % ring.slots();
        if next_head == ring.tail.load(Ordering::Acquire) {
            return Err(RingBufferError::Full);
        }

        // SAFETY: this handle is the only writer, and the consumer never
        // reads the slot at `head` until the store below publishes it
        unsafe {
            *ring.storage[head].get() = item;
        }

        ring.head.store(next_head, Ordering::Release);
        Ok(())
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.ring.len() == self.ring.capacity()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Reading end of the queue
pub struct Consumer<T: Copy + Default> {
    ring: Arc<RingBuffer<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Copy + Default> Consumer<T> {
    /// Pop the oldest item
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        if tail == ring.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the slot was published by the producer's release store and
        // is not rewritten until `tail` moves past it
        let item = unsafe { *ring.storage[tail].get() };

        ring.tail.store((tail + 1) % ring.slots(), Ordering::Release);
        Some(item)
    }

    /// Get the number of items currently in the buffer
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Copy + Default> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.ring.len())
            .field("capacity", &self.ring.capacity())
            .finish()
    }
}

impl<T: Copy + Default> std::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.ring.len())
            .field("capacity", &self.ring.capacity())
            .finish()
    }
}
