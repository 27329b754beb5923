//! One comparison workload: a reader, a worker pool and two writers joined by bounded
//! queues, stopped by the first of natural drain, a unit fault or external shutdown.

pub mod condition;
pub mod pending;
pub mod reader;
pub mod signal;
pub mod supervise;
pub mod worker;

use self::condition::{InvalidCondition, SuccessConditions};
use self::pending::PendingWork;
use self::reader::{count_lines, Reader};
use self::signal::{shutdown_requested, Signal};
use self::supervise::{spawn_unit, FaultSlot};
use self::worker::{Comparison, Worker};
use crate::config::TaskConfig;
use crate::reporting::records::{FailureRecord, OutputRecord, Payload};
use crate::reporting::statistics::{log_periodically, log_snapshot, LOG_INTERVAL};
use crate::reporting::writer::RecordWriter;
use crate::request::{EndpointInfo, RequestExecutor};
use crossbeam::atomic::AtomicCell;
use futures::future::join_all;
use httpdiff_client::HttpClient;
use httpdiff_metrics::{Statistics, StatisticsSnapshot};
use slog::{error, info, o, Logger};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Condition(#[from] InvalidCondition),
    #[error("unit {unit} crashed: {message}")]
    UnitCrashed { unit: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Stopping,
    Done,
}

/// Read-only view of a task that stays valid while the task runs.
#[derive(Debug, Clone)]
pub struct TaskMonitor {
    name: String,
    statistics: Arc<Statistics>,
    state: Arc<AtomicCell<TaskState>>,
}

impl TaskMonitor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    pub fn state(&self) -> TaskState {
        self.state.load()
    }
}

pub struct Task {
    config: TaskConfig,
    conditions: SuccessConditions,
    client: Arc<dyn HttpClient>,
    monitor: TaskMonitor,
    logger: Logger,
}

impl Task {
    /// Validate the task and count its payload lines. No file is opened for processing yet.
    pub fn new(
        config: TaskConfig,
        client: Arc<dyn HttpClient>,
        logger: &Logger,
    ) -> Result<Task, TaskError> {
        let logger = logger.new(o!("task" => config.name.clone()));
        let conditions = SuccessConditions::parse(&config.success_conditions)?;

        let mut total = 0;
        for path in config.payload_paths() {
            total += count_lines(&path).map_err(|source| TaskError::Io {
                path: path.clone(),
                source,
            })?;
        }
        info!(logger, "task created"; "total" => total, "files" => config.payload_files.len());

        let monitor = TaskMonitor {
            name: config.name.clone(),
            statistics: Arc::new(Statistics::new(total)),
            state: Arc::new(AtomicCell::new(TaskState::Created)),
        };
        Ok(Task {
            config,
            conditions,
            client,
            monitor,
            logger,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn total(&self) -> u64 {
        self.monitor.statistics.total()
    }

    pub fn monitor(&self) -> TaskMonitor {
        self.monitor.clone()
    }

    /// Run until every payload has been written, a unit faults or `shutdown` flips to
    /// true. On shutdown, payloads still queued are dropped.
    pub async fn run(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<StatisticsSnapshot, TaskError> {
        let Task {
            config,
            conditions,
            client,
            monitor,
            logger,
        } = self;
        let statistics = monitor.statistics.clone();
        monitor.state.store(TaskState::Running);
        info!(logger, "task running"; "concurrency" => config.concurrency);

        let stop = Signal::new();
        let faults = FaultSlot::default();
        let pending = Arc::new(PendingWork::new());
        let (input_tx, input_rx) = mpsc::channel::<Arc<Payload>>(config.queue_capacity);
        let (output_tx, output_rx) = mpsc::channel::<OutputRecord>(config.queue_capacity);
        let (failure_tx, failure_rx) = mpsc::channel::<FailureRecord>(config.queue_capacity);
        let mut units = Vec::new();

        let reader = Reader::new(
            config.payload_paths(),
            statistics.clone(),
            pending.clone(),
            input_tx,
            stop.clone(),
            &logger,
        );
        units.push(spawn_unit("reader".into(), &logger, &stop, &faults, reader.run()));

        let output = RecordWriter::new(
            config.output_path(),
            output_rx,
            pending.clone(),
            stop.clone(),
            &logger,
        );
        let output = if config.output_show_no_diff_line {
            output
        } else {
            output.filter(OutputRecord::has_diff)
        };
        units.push(spawn_unit("output-writer".into(), &logger, &stop, &faults, output.run()));

        let failures = RecordWriter::new(
            config.failure_path(),
            failure_rx,
            pending.clone(),
            stop.clone(),
            &logger,
        );
        units.push(spawn_unit("failure-writer".into(), &logger, &stop, &faults, failures.run()));

        if config.log_statistics {
            let ticker =
                log_periodically(statistics.clone(), LOG_INTERVAL, stop.clone(), logger.clone());
            units.push(spawn_unit("statistics".into(), &logger, &stop, &faults, ticker));
        }

        let completion = {
            let pending = pending.clone();
            let stop = stop.clone();
            async move {
                tokio::select! {
                    _ = pending.drained() => stop.fire(),
                    _ = stop.fired() => {}
                }
                Ok::<(), TaskError>(())
            }
        };
        units.push(spawn_unit("completion".into(), &logger, &stop, &faults, completion));

        // soft start, lets the reader fill the queue before the pool fans out
        tokio::select! {
            _ = stop.fired() => {}
            _ = shutdown_requested(shutdown.clone()) => stop.fire(),
            _ = tokio::time::sleep(config.warm_up) => {}
        }

        if !stop.is_fired() {
            let content_type = config.content_type.as_str();
            let comparison = Arc::new(Comparison::new(
                RequestExecutor::new(client, &logger),
                EndpointInfo::new(config.method, config.url_a.as_str(), content_type),
                EndpointInfo::new(config.method, config.url_b.as_str(), content_type),
                config.wait_time,
                config.ignore_fields.clone(),
                conditions,
                &logger,
            ));
            let input = Arc::new(Mutex::new(input_rx));
            for id in 0..config.concurrency {
                let worker = Worker::new(
                    id,
                    comparison.clone(),
                    statistics.clone(),
                    input.clone(),
                    output_tx.clone(),
                    failure_tx.clone(),
                    stop.clone(),
                    &logger,
                );
                let name = format!("worker-{}", id);
                units.push(spawn_unit(name, &logger, &stop, &faults, worker.run()));
            }
        }
        drop(output_tx);
        drop(failure_tx);

        tokio::select! {
            _ = stop.fired() => {}
            _ = shutdown_requested(shutdown) => info!(logger, "shutdown requested"),
        }
        monitor.state.store(TaskState::Stopping);
        stop.fire();

        for joined in join_all(units).await {
            if let Err(e) = joined {
                error!(logger, "unit supervisor failed"; "error" => %e);
            }
        }

        let snapshot = statistics.snapshot();
        if config.log_statistics {
            log_snapshot(&logger, &snapshot);
        }
        monitor.state.store(TaskState::Done);
        match faults.take() {
            Some(e) => {
                error!(logger, "task failed"; "error" => %e, "statistics" => %snapshot);
                Err(e)
            }
            None => {
                info!(logger, "task finished"; "statistics" => %snapshot);
                Ok(snapshot)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::Method;
    use futures::future::{self, FutureExt};
    use httpdiff_client::{ClientError, FutureResponse, Headers, RequestBody};
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Constant(Value);

    impl HttpClient for Constant {
        fn get(&self, _url: &str, _headers: &Headers) -> FutureResponse<Value, ClientError> {
            future::ok(self.0.clone()).boxed()
        }

        fn post(
            &self,
            url: &str,
            _body: RequestBody,
            headers: &Headers,
        ) -> FutureResponse<Value, ClientError> {
            self.get(url, headers)
        }
    }

    fn logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn config(dir: &std::path::Path, lines: &str) -> TaskConfig {
        std::fs::write(dir.join("payload.txt"), lines).unwrap();
        let mut c = TaskConfig::new(
            "t",
            dir.to_path_buf(),
            vec!["payload.txt".into()],
            "http://a.test/",
            "http://b.test/",
            Method::Get,
        );
        c.warm_up = Duration::from_millis(0);
        c.concurrency = 3;
        c
    }

    #[test]
    fn counts_lines_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(Constant(json!({})));
        let task = Task::new(config(dir.path(), "{}\n\n{}\n"), client, &logger()).unwrap();
        assert_eq!(task.total(), 3);
        assert_eq!(task.name(), "t");
        assert_eq!(task.monitor().state(), TaskState::Created);
    }

    #[test]
    fn bad_condition_fails_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), "{}\n");
        c.success_conditions = vec!["code".into()];
        assert!(matches!(
            Task::new(c, Arc::new(Constant(json!({}))), &logger()),
            Err(TaskError::Condition(_))
        ));
    }

    #[tokio::test]
    async fn drains_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), "{}\n{}\nbroken\n\n{}\n");
        c.output_show_no_diff_line = true;
        let task = Task::new(c, Arc::new(Constant(json!({"ok": true}))), &logger()).unwrap();
        let monitor = task.monitor();
        let (_tx, rx) = watch::channel(false);
        let snapshot = tokio::time::timeout(Duration::from_secs(5), task.run(rx))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.total(), 5);
        assert_eq!(snapshot.same(), 3);
        assert_eq!(snapshot.failed(), 2);
        assert!(snapshot.is_complete());
        assert_eq!(monitor.state(), TaskState::Done);
        let output = std::fs::read_to_string(dir.path().join("t_output.txt")).unwrap();
        assert_eq!(output.lines().count(), 3);
        assert!(dir.path().join("t_failed_payload.txt").exists());
    }

    #[tokio::test]
    async fn empty_workload_completes() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(Constant(json!({})));
        let task = Task::new(config(dir.path(), ""), client, &logger()).unwrap();
        let (_tx, rx) = watch::channel(false);
        let snapshot = tokio::time::timeout(Duration::from_secs(5), task.run(rx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.total(), 0);
    }

    #[tokio::test]
    async fn shutdown_during_warm_up_stops_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = config(dir.path(), "{}\n{}\n");
        c.warm_up = Duration::from_secs(60);
        let task = Task::new(c, Arc::new(Constant(json!({}))), &logger()).unwrap();
        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(task.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send_replace(true);
        let snapshot = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.processed(), 0);
    }
}
