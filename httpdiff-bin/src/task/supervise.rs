use super::signal::Signal;
use super::TaskError;
use slog::{debug, error, Logger};
use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::{JoinError, JoinHandle};

/// First fault raised by any unit of a task.
#[derive(Debug, Clone, Default)]
pub struct FaultSlot(Arc<Mutex<Option<TaskError>>>);

impl FaultSlot {
    fn record(&self, e: TaskError) {
        if let Ok(mut slot) = self.0.lock() {
            if slot.is_none() {
                *slot = Some(e);
            }
        }
    }

    pub fn take(&self) -> Option<TaskError> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        panic_message(&*e.into_panic())
    } else {
        e.to_string()
    }
}

/// Spawn one concurrent unit of a task.
///
/// An error return or a panic inside the unit is logged, recorded in `faults` and fires
/// `stop`, so the owning task winds down while the rest of the process carries on.
pub fn spawn_unit<F>(
    unit: String,
    logger: &Logger,
    stop: &Signal,
    faults: &FaultSlot,
    fut: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    let logger = logger.new(slog::o!("unit" => unit.clone()));
    let stop = stop.clone();
    let faults = faults.clone();
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        let fault = match inner.await {
            Ok(Ok(())) => {
                debug!(logger, "unit finished");
                return;
            }
            Ok(Err(e)) => e,
            Err(e) => TaskError::UnitCrashed {
                unit,
                message: join_error_message(e),
            },
        };
        error!(logger, "unit failed, stopping task"; "error" => %fault);
        faults.record(fault);
        stop.fire();
    })
}
