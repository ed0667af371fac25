use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use std::sync::Arc;

use crate::sync::{AtomicUsize, Ordering};

/// Result of a push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Ok,
    /// The ring is full; the entry was dropped.
    WouldBlock,
}

impl PushResult {
    #[inline]
    pub fn is_would_block(self) -> bool {
        matches!(self, PushResult::WouldBlock)
    }
}

/// A bounded single-producer / single-consumer ring.
///
/// Indices advance modulo `cap`; one slot is kept open to distinguish full
/// from empty, so a ring of capacity `cap` holds at most `cap - 1` entries.
/// The producer publishes with a release store on `head` and the consumer
/// acknowledges with a release store on `tail`; each side reads the other's
/// index with acquire, so a `try_push` happens-before the `try_pop` that
/// observes it.
///
/// A full ring drops the pushed entry (`PushResult::WouldBlock`). There is no
/// blocking variant.
pub struct SpscRing<T> {
    /// Producer publication index (written by producer, read by consumer).
    head: AtomicUsize,
    /// Consumer index (written by consumer, read by producer).
    tail: AtomicUsize,
    cap: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T: Copy> SpscRing<T> {
    /// Allocate a ring with room for `cap - 1` entries.
    ///
    /// # Panics
    ///
    /// Panics if `cap < 2`.
    pub fn with_capacity(cap: usize) -> Self {
        assert!(cap >= 2, "ring capacity must be at least 2");
        let slots = (0..cap)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            cap,
            slots,
        }
    }

    /// Try to push an entry.
    ///
    /// Must only be called from the single producer.
    pub fn try_push(&self, value: T) -> PushResult {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % self.cap;
        if next == self.tail.load(Ordering::Acquire) {
            return PushResult::WouldBlock;
        }
        unsafe { (*self.slots[head].get()).write(value) };
        self.head.store(next, Ordering::Release);
        PushResult::Ok
    }

    /// Try to pop an entry.
    ///
    /// Must only be called from the single consumer.
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { (*self.slots[tail].get()).assume_init_read() };
        self.tail.store((tail + 1) % self.cap, Ordering::Release);
        Some(value)
    }

    /// Returns true if the ring appears empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    /// Number of entries currently buffered (approximate under concurrency).
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + self.cap - tail) % self.cap
    }

    /// Slot count; the ring holds at most `capacity() - 1` entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }
}

/// Producer half of an SPSC channel. Not cloneable.
pub struct SpscProducer<T> {
    ring: Arc<SpscRing<T>>,
}

/// Consumer half of an SPSC channel. Not cloneable.
pub struct SpscConsumer<T> {
    ring: Arc<SpscRing<T>>,
}

impl<T: Copy> SpscProducer<T> {
    /// Try to push an entry; drops it when the ring is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> PushResult {
        self.ring.try_push(value)
    }

    /// Returns the number of entries that can still be pushed.
    #[inline]
    pub fn available_capacity(&self) -> usize {
        self.ring.capacity() - 1 - self.ring.len()
    }
}

impl<T: Copy> SpscConsumer<T> {
    /// Try to pop an entry.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        self.ring.try_pop()
    }

    /// Returns true if the ring appears empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Create a producer/consumer pair over a fresh ring of the given capacity.
pub fn spsc_channel<T: Copy>(cap: usize) -> (SpscProducer<T>, SpscConsumer<T>) {
    let ring = Arc::new(SpscRing::with_capacity(cap));
    (
        SpscProducer { ring: ring.clone() },
        SpscConsumer { ring },
    )
}

// ── tests ─────────────────────────────────────────────────────────────────────
