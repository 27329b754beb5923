use super::condition::SuccessConditions;
use super::signal::Signal;
use super::TaskError;
use crate::diff::diff;
use crate::mask::{self, MaskError};
use crate::reporting::records::{FailureRecord, OutputRecord, Payload};
use crate::request::{EndpointInfo, RequestExecutor};
use httpdiff_metrics::Statistics;
use serde_json::Value;
use slog::{debug, o, warn, Logger};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub type SharedInput = Arc<Mutex<mpsc::Receiver<Arc<Payload>>>>;

/// Terminal classification of one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Same(OutputRecord),
    Diff(OutputRecord),
    Failed(FailureRecord),
}

fn error_slot<T, E: Display>(r: &Result<T, E>) -> String {
    match r {
        Ok(_) => String::new(),
        Err(e) => e.to_string(),
    }
}

type Masked<'f> = Vec<(&'f str, Option<Value>)>;

fn unmask(doc: &mut Value, masked: Masked<'_>) -> Result<(), MaskError> {
    for (field, original) in masked.into_iter().rev() {
        mask::restore(doc, field, original)?;
    }
    Ok(())
}

/// The per-payload A/B algorithm, shared by every worker of a task.
pub struct Comparison {
    executor: RequestExecutor,
    url_a: Arc<EndpointInfo>,
    url_b: Arc<EndpointInfo>,
    wait_time: Duration,
    ignore_fields: Vec<String>,
    conditions: SuccessConditions,
    logger: Logger,
}

impl Comparison {
    pub fn new(
        executor: RequestExecutor,
        url_a: EndpointInfo,
        url_b: EndpointInfo,
        wait_time: Duration,
        ignore_fields: Vec<String>,
        conditions: SuccessConditions,
        logger: &Logger,
    ) -> Comparison {
        Comparison {
            executor,
            url_a: Arc::new(url_a),
            url_b: Arc::new(url_b),
            wait_time,
            ignore_fields,
            conditions,
            logger: logger.clone(),
        }
    }

    pub async fn compare(&self, payload: Arc<Payload>) -> Verdict {
        if !self.wait_time.is_zero() {
            tokio::time::sleep(self.wait_time).await;
        }

        let (ra, rb) = self
            .executor
            .execute_pair(&self.url_a, &self.url_b, &payload)
            .await;
        let (mut a, mut b) = match (ra, rb) {
            (Ok(a), Ok(b)) => (a, b),
            (ra, rb) => {
                let err = format!(
                    "failed to get response: {}; {}",
                    error_slot(&ra),
                    error_slot(&rb)
                );
                warn!(self.logger, "request failed"; "error" => &err);
                return Verdict::Failed(FailureRecord::new(&payload, err));
            }
        };

        if !self.conditions.is_met(&a) || !self.conditions.is_met(&b) {
            debug!(self.logger, "success conditions not met";
                "url_a_response" => %a, "url_b_response" => %b);
            return Verdict::Failed(FailureRecord::new(
                &payload,
                "response does not meet success conditions",
            ));
        }

        let mut masked_a: Masked<'_> = Vec::with_capacity(self.ignore_fields.len());
        let mut masked_b: Masked<'_> = Vec::with_capacity(self.ignore_fields.len());
        for field in &self.ignore_fields {
            let masked = mask::set_to_nil(&mut a, field).and_then(|va| {
                let vb = mask::set_to_nil(&mut b, field)?;
                Ok((va, vb))
            });
            match masked {
                Ok((va, vb)) => {
                    masked_a.push((field.as_str(), va));
                    masked_b.push((field.as_str(), vb));
                }
                Err(e) => {
                    warn!(self.logger, "could not mask field"; "field" => field, "error" => %e);
                    return Verdict::Failed(FailureRecord::new(&payload, e));
                }
            }
        }

        let differences = diff(&a, &b);
        if differences.is_empty() {
            return Verdict::Same(OutputRecord::same(payload));
        }

        let ua = unmask(&mut a, masked_a);
        let ub = unmask(&mut b, masked_b);
        if ua.is_err() || ub.is_err() {
            let err = format!(
                "failed to set field value in response: {}; {}",
                error_slot(&ua),
                error_slot(&ub)
            );
            warn!(self.logger, "could not restore masked fields"; "error" => &err);
            return Verdict::Failed(FailureRecord::new(&payload, err));
        }

        Verdict::Diff(OutputRecord::different(
            payload,
            a,
            b,
            differences.to_string(),
        ))
    }
}

/// One member of a task's worker pool.
pub struct Worker {
    comparison: Arc<Comparison>,
    statistics: Arc<Statistics>,
    input: SharedInput,
    output: mpsc::Sender<OutputRecord>,
    failures: mpsc::Sender<FailureRecord>,
    stop: Signal,
    logger: Logger,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        comparison: Arc<Comparison>,
        statistics: Arc<Statistics>,
        input: SharedInput,
        output: mpsc::Sender<OutputRecord>,
        failures: mpsc::Sender<FailureRecord>,
        stop: Signal,
        logger: &Logger,
    ) -> Worker {
        Worker {
            comparison,
            statistics,
            input,
            output,
            failures,
            stop,
            logger: logger.new(o!("worker" => id)),
        }
    }

    async fn next(&self) -> Option<Arc<Payload>> {
        let mut input = self.input.lock().await;
        input.recv().await
    }

    async fn deliver<T>(&self, queue: &mpsc::Sender<T>, item: T) -> bool {
        tokio::select! {
            _ = self.stop.fired() => false,
            sent = queue.send(item) => sent.is_ok(),
        }
    }

    /// Count the verdict once, then hand its record to the matching writer.
    async fn record(&self, verdict: Verdict) -> bool {
        match verdict {
            Verdict::Same(r) => {
                self.statistics.add_same();
                self.deliver(&self.output, r).await
            }
            Verdict::Diff(r) => {
                self.statistics.add_diff();
                self.deliver(&self.output, r).await
            }
            Verdict::Failed(r) => {
                self.statistics.add_failed();
                self.deliver(&self.failures, r).await
            }
        }
    }

    /// Take payloads until the task stops or the reader is finished and the queue is empty.
    pub async fn run(self) -> Result<(), TaskError> {
        loop {
            let next = tokio::select! {
                _ = self.stop.fired() => None,
                payload = self.next() => payload,
            };
            let payload = match next {
                Some(p) => p,
                None => break,
            };
            let verdict = self.comparison.compare(payload).await;
            if !self.record(verdict).await {
                break;
            }
        }
        debug!(self.logger, "worker exiting");
        Ok(())
    }
}
