use crate::task::signal::Signal;
use crate::task::TaskError;
use httpdiff_metrics::{Statistics, StatisticsSnapshot};
use slog::{info, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

pub const LOG_INTERVAL: Duration = Duration::from_secs(1);

pub fn log_snapshot(logger: &Logger, snapshot: &StatisticsSnapshot) {
    info!(logger, "statistics";
        "total" => snapshot.total(),
        "same" => snapshot.same(),
        "diff" => snapshot.diff(),
        "failed" => snapshot.failed(),
        "progress" => format!("{:.2}%", snapshot.progress()),
        "rate" => format!("{:.1}/s", snapshot.rate()));
}

/// Log a snapshot on every tick until the task stops.
pub async fn log_periodically(
    statistics: Arc<Statistics>,
    period: Duration,
    stop: Signal,
    logger: Logger,
) -> Result<(), TaskError> {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.fired() => return Ok(()),
            _ = ticker.tick() => log_snapshot(&logger, &statistics.snapshot()),
        }
    }
}
