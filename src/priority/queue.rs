use crate::priority::error::{QueueError, QueueResult};
use crate::priority::types::QueueStats;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

struct Slot<T> {
    key: i64,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.sequence == other.sequence
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smaller key first, then insertion order.
        // Reversed for max-heap behavior
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Slot<T>>,
    next_sequence: u64,
}

/// Bounded priority queue shared between producers and consumers.
///
/// Items with a smaller key dequeue first; equal keys dequeue in insertion
/// order. The capacity check and the insertion happen under one lock so
/// concurrent producers can never overfill it.
pub struct PriorityQueue<T> {
    inner: Arc<Mutex<Inner<T>>>,
    stats: Arc<RwLock<QueueStats>>,
    max_capacity: usize,
}

impl<T> PriorityQueue<T> {
    pub fn new(max_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_sequence: 0,
            })),
            stats: Arc::new(RwLock::new(QueueStats::default())),
            max_capacity,
        }
    }

    /// Enqueue item under `key`
    pub fn enqueue(&self, key: i64, item: T) -> QueueResult<()> {
        let pending = {
            let mut inner = self.inner.lock();

            if inner.heap.len() >= self.max_capacity {
                drop(inner);
                self.stats.write().total_rejected += 1;
                return Err(QueueError::QueueFull(self.max_capacity));
            }

            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.heap.push(Slot {
                key,
                sequence,
                item,
            });
            inner.heap.len()
        };

        let mut stats = self.stats.write();
        stats.total_enqueued += 1;
        stats.pending = pending;

        Ok(())
    }

    /// Enqueue in arrival order
    pub fn push_back(&self, item: T) -> QueueResult<()> {
        self.enqueue(0, item)
    }

    /// Dequeue the item with the smallest key, oldest first
    pub fn dequeue(&self) -> QueueResult<T> {
        let (slot, pending) = {
            let mut inner = self.inner.lock();
            let slot = inner.heap.pop().ok_or(QueueError::QueueEmpty)?;
            (slot, inner.heap.len())
        };

        let mut stats = self.stats.write();
        stats.total_processed += 1;
        stats.pending = pending;

        Ok(slot.item)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_capacity
    }

    pub fn capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.read().clone()
    }
}

impl<T> Clone for PriorityQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            stats: self.stats.clone(),
            max_capacity: self.max_capacity,
        }
    }
}
