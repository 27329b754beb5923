use crate::counter::Counter;
use crate::snapshot::StatisticsSnapshot;
use crossbeam::atomic::AtomicCell;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RateSample {
    at: Instant,
    processed: u64,
}

/// Per-task comparison counters.
///
/// `total` is fixed when the task is created. Every payload that reaches a verdict bumps
/// exactly one of `same`, `diff` or `failed`, so in a correct run
/// `same + diff + failed <= total` holds at every point and equality holds once the task
/// has drained.
#[derive(Debug)]
pub struct Statistics {
    total: u64,
    same: Counter,
    diff: Counter,
    failed: Counter,
    last_sample: AtomicCell<RateSample>,
}

impl Statistics {
    pub fn new(total: u64) -> Statistics {
        Statistics {
            total,
            same: Counter::new(),
            diff: Counter::new(),
            failed: Counter::new(),
            last_sample: AtomicCell::new(RateSample {
                at: Instant::now(),
                processed: 0,
            }),
        }
    }

    pub fn add_same(&self) {
        self.same.increment();
    }

    pub fn add_diff(&self) {
        self.diff.increment();
    }

    pub fn add_failed(&self) {
        self.failed.increment();
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn same(&self) -> u64 {
        self.same.get()
    }

    pub fn diff(&self) -> u64 {
        self.diff.get()
    }

    pub fn failed(&self) -> u64 {
        self.failed.get()
    }

    pub fn processed(&self) -> u64 {
        self.same() + self.diff() + self.failed()
    }

    /// Share of `total` that has reached a verdict, as a percentage.
    ///
    /// An empty workload is reported as complete.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed() as f64 / self.total as f64 * 100.0
    }

    /// Payloads processed per second since the previous call, resetting the sample.
    pub fn sample_rate(&self) -> f64 {
        let now = RateSample {
            at: Instant::now(),
            processed: self.processed(),
        };
        let previous = self.last_sample.swap(now);
        let elapsed = now.at.duration_since(previous.at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        now.processed.saturating_sub(previous.processed) as f64 / elapsed
    }

    /// Capture every counter plus the derived progress and rate.
    ///
    /// Taking a snapshot resets the rate sample.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let same = self.same();
        let diff = self.diff();
        let failed = self.failed();
        StatisticsSnapshot::new(self.total, same, diff, failed, self.sample_rate())
    }
}
