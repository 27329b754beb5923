use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsSnapshot {
    total: u64,
    same: u64,
    diff: u64,
    failed: u64,
    rate: f64,
}

impl StatisticsSnapshot {
    pub fn new(total: u64, same: u64, diff: u64, failed: u64, rate: f64) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total,
            same,
            diff,
            failed,
            rate,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn same(&self) -> u64 {
        self.same
    }

    pub fn diff(&self) -> u64 {
        self.diff
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn processed(&self) -> u64 {
        self.same + self.diff + self.failed
    }

    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed() as f64 / self.total as f64 * 100.0
        }
    }

    /// Payloads per second over the sampling window that produced this snapshot
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total
    }
}

impl Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "total {}/same {}/diff {}/failed {}/progress {:.2}%/rate {:.1}/s",
            self.total,
            self.same,
            self.diff,
            self.failed,
            self.progress(),
            self.rate
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_every_counter() {
        let s = StatisticsSnapshot::new(8, 4, 2, 2, 1.5);
        assert!(s.is_complete());
        assert_eq!(
            s.to_string(),
            "total 8/same 4/diff 2/failed 2/progress 100.00%/rate 1.5/s"
        );
    }
}
