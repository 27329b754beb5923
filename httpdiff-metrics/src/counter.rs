use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter that can be shared between threads without locking.
///
/// Each counter sits on its own cache line so that neighbouring counters updated by
/// different workers don't contend with each other.
#[derive(Debug, Default)]
pub struct Counter {
    value: CachePadded<AtomicU64>,
}

impl Counter {
    /// Create a counter starting at zero
    pub fn new() -> Counter {
        Counter::starting_at(0)
    }

    /// Create a counter starting at the given value
    pub fn starting_at(value: u64) -> Counter {
        Counter {
            value: CachePadded::new(AtomicU64::new(value)),
        }
    }

    /// Increment the counter by the given value, returning the new value.
    pub fn increment_by(&self, val: u64) -> u64 {
        self.value.fetch_add(val, Ordering::AcqRel) + val
    }

    /// Increment the counter by one, returning the new value.
    pub fn increment(&self) -> u64 {
        self.increment_by(1)
    }

    /// Get the current value of the counter
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}
