use crate::config::TaskConfig;
use crate::task::signal::Signal;
use crate::task::supervise::join_error_message;
use crate::task::{Task, TaskError, TaskMonitor};
use futures::future::join_all;
use httpdiff_client::HttpClient;
use httpdiff_metrics::StatisticsSnapshot;
use slog::{error, info, o, Logger};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task name is duplicated: {0}")]
    DuplicateTask(String),
    #[error("task {name} failed to initialize: {source}")]
    Task {
        name: String,
        #[source]
        source: TaskError,
    },
}

/// How one task ended.
#[derive(Debug)]
pub struct TaskReport {
    pub name: String,
    pub result: Result<StatisticsSnapshot, TaskError>,
}

/// Owns every task of a run and supervises them. It never compares anything itself.
pub struct Dispatcher {
    tasks: Vec<Task>,
    monitors: Vec<TaskMonitor>,
    done: Signal,
    logger: Logger,
}

impl Dispatcher {
    /// Initialize every task up front; the first failure aborts the whole run.
    pub fn create(
        configs: Vec<TaskConfig>,
        client: Arc<dyn HttpClient>,
        logger: &Logger,
    ) -> Result<Dispatcher, DispatchError> {
        let logger = logger.new(o!("component" => "dispatcher"));
        let mut names = HashSet::new();
        let mut tasks = Vec::with_capacity(configs.len());
        for config in configs {
            if !names.insert(config.name.clone()) {
                return Err(DispatchError::DuplicateTask(config.name));
            }
            let name = config.name.clone();
            let task = Task::new(config, client.clone(), &logger)
                .map_err(|source| DispatchError::Task { name, source })?;
            tasks.push(task);
        }
        let monitors = tasks.iter().map(Task::monitor).collect();
        Ok(Dispatcher {
            tasks,
            monitors,
            done: Signal::new(),
            logger,
        })
    }

    pub fn monitors(&self) -> &[TaskMonitor] {
        &self.monitors
    }

    /// Fires once every task has finished, however it finished.
    pub fn done(&self) -> Signal {
        self.done.clone()
    }

    /// Launch every task concurrently. A panic inside one task ends only that task.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Vec<TaskReport>> {
        let Dispatcher {
            tasks, done, logger, ..
        } = self;
        info!(logger, "starting tasks"; "count" => tasks.len());
        let (names, runs): (Vec<String>, Vec<_>) = tasks
            .into_iter()
            .map(|task| {
                let name = task.name().to_string();
                (name, tokio::spawn(task.run(shutdown.clone())))
            })
            .unzip();

        tokio::spawn(async move {
            let joined = join_all(runs).await;
            let reports: Vec<TaskReport> = names
                .into_iter()
                .zip(joined)
                .map(|(name, joined)| {
                    let result = joined.unwrap_or_else(|e| {
                        Err(TaskError::UnitCrashed {
                            unit: "task".into(),
                            message: join_error_message(e),
                        })
                    });
                    match &result {
                        Ok(s) => info!(logger, "task summary"; "task" => &name, "statistics" => %s),
                        Err(e) => error!(logger, "task failed"; "task" => &name, "error" => %e),
                    }
                    TaskReport { name, result }
                })
                .collect();
            info!(logger, "all tasks finished";
                "failed" => reports.iter().filter(|r| r.result.is_err()).count());
            done.fire();
            reports
        })
    }
}
