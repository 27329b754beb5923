mod counter;
mod snapshot;
mod statistics;
mod stopwatch;

pub use self::counter::Counter;
pub use self::snapshot::StatisticsSnapshot;
pub use self::statistics::Statistics;
pub use self::stopwatch::Stopwatch;
