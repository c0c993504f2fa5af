use parking_lot::Mutex;
use std::collections::TryReserveError;

/// A lock-protected, append-only buffer shared by many producers and drained
/// by one consumer.
///
/// Appends happen in batches under a single lock acquisition. Once the
/// buffer holds `capacity` entries the next overflowing append stores one
/// copy of `sentinel` and every append after that is dropped, until the
/// consumer calls [`Aggregator::clear`].
#[derive(Debug)]
pub struct Aggregator<T> {
    entries: Mutex<Vec<T>>,
    capacity: usize,
    sentinel: T,
}

impl<T: Clone> Aggregator<T> {
    pub fn new(capacity: usize, sentinel: T) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
            sentinel,
        }
    }

    /// Appends as much of `batch` as fits.
    ///
    /// Fails only when memory for the batch cannot be reserved; in that case
    /// nothing from the batch is stored.
    pub fn append_batch(&self, batch: &[T]) -> Result<(), TryReserveError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock();
        let room = self.capacity.saturating_sub(entries.len());
        if room == 0 {
            // Exactly at capacity means the sentinel has not been written yet.
            if entries.len() == self.capacity {
                entries.try_reserve(1)?;
                entries.push(self.sentinel.clone());
            }
            return Ok(());
        }

        let take = room.min(batch.len());
        let overflow = take < batch.len();
        entries.try_reserve(take + usize::from(overflow))?;
        entries.extend_from_slice(&batch[..take]);
        if overflow {
            entries.push(self.sentinel.clone());
        }
        Ok(())
    }

    pub fn push(&self, entry: T) -> Result<(), TryReserveError> {
        self.append_batch(std::slice::from_ref(&entry))
    }

    /// Copy of every entry, left in place
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().clone()
    }

    /// Copy of at most `count` leading entries, left in place
    pub fn prefix(&self, count: usize) -> Vec<T> {
        let entries = self.entries.lock();
        entries[..count.min(entries.len())].to_vec()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Removes and returns at most `count` leading entries in one step, so
    /// nothing appended concurrently is lost between a read and a clear.
    pub fn drain(&self, count: usize) -> Vec<T> {
        let mut entries = self.entries.lock();
        let take = count.min(entries.len());
        entries.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
