//! # Batch driver
//! A fixed pool of workers drains an mpsc queue of identifiers through
//! `LeadService`. Runs with failed or rate-limited providers go back on the
//! queue after an exponential backoff (never shorter than the limiter's retry
//! hint) and are retried with `force_refresh`. A hint longer than
//! `max_backoff` ends the item with its partial report. Validation errors
//! are final.

use crate::pipeline::{PipelineError, ProcessOptions};
use crate::service::{LeadReport, LeadService};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub options: ProcessOptions,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            options: ProcessOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub identifier: String,
    pub attempts: u32,
    pub report: LeadReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejected {
    pub identifier: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// In input order. Includes runs that exhausted their attempts.
    pub completed: Vec<BatchItem>,
    pub rejected: Vec<Rejected>,
    pub cancelled: Vec<String>,
    pub requeued: u64,
}

#[derive(Debug, Clone)]
struct Job {
    index: usize,
    identifier: String,
    attempt: u32,
}

/// `base × 2^(attempt-1)` capped at `max`, raised to the retry hint.
/// `None` when the hint itself exceeds `max`: no retry within the backoff
/// ceiling could get past the limiter.
pub fn backoff_delay(
    attempt: u32,
    hint: Option<Duration>,
    base: Duration,
    max: Duration,
) -> Option<Duration> {
    let hint = hint.unwrap_or_default();
    if hint > max {
        return None;
    }
    let exp = attempt.saturating_sub(1).min(20);
    let backoff = base.saturating_mul(1u32 << exp).min(max);
    Some(backoff.max(hint))
}

pub struct BatchDriver {
    service: Arc<LeadService>,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(service: Arc<LeadService>, config: BatchConfig) -> Self {
        Self { service, config }
    }

    pub async fn run(&self, identifiers: Vec<String>, cancel: &CancellationToken) -> BatchReport {
        let stop = cancel.child_token();
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let (done_tx, mut done_rx) =
            mpsc::unbounded_channel::<(Job, Result<LeadReport, PipelineError>)>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for (index, identifier) in identifiers.iter().enumerate() {
            let _ = job_tx.send(Job {
                index,
                identifier: identifier.clone(),
                attempt: 1,
            });
        }

        let mut workers = JoinSet::new();
        for worker in 0..self.config.concurrency.max(1) {
            let rx = Arc::clone(&job_rx);
            let done = done_tx.clone();
            let service = Arc::clone(&self.service);
            let stop = stop.clone();
            let options = self.config.options;
            workers.spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = stop.cancelled() => break,
                        j = async { rx.lock().await.recv().await } => match j {
                            Some(j) => j,
                            None => break,
                        },
                    };
                    let opts = if job.attempt > 1 {
                        ProcessOptions {
                            force_refresh: true,
                            ..options
                        }
                    } else {
                        options
                    };
                    debug!(target: "batch", worker, identifier = %job.identifier, attempt = job.attempt, "picked up");
                    let res = service
                        .process_with_cancel(&job.identifier, opts, &stop)
                        .await;
                    if done.send((job, res)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        let mut slots: Vec<Option<BatchItem>> = vec![None; identifiers.len()];
        let mut rejected = Vec::new();
        let mut finished = vec![false; identifiers.len()];
        let mut outstanding = identifiers.len();
        let mut requeued = 0u64;

        while outstanding > 0 {
            let msg = tokio::select! {
                _ = stop.cancelled() => break,
                m = done_rx.recv() => m,
            };
            let Some((job, res)) = msg else { break };

            match res {
                Err(PipelineError::Validation(e)) => {
                    warn!(target: "batch", identifier = %job.identifier, error = %e, "rejected");
                    rejected.push(Rejected {
                        identifier: job.identifier.clone(),
                        error: e.to_string(),
                    });
                    finished[job.index] = true;
                    outstanding -= 1;
                }
                Err(PipelineError::Cancelled) => {
                    outstanding -= 1;
                }
                Ok(report) if report.needs_retry() && job.attempt < self.config.max_attempts => {
                    let Some(delay) = backoff_delay(
                        job.attempt,
                        report.retry_after(),
                        self.config.base_backoff,
                        self.config.max_backoff,
                    ) else {
                        warn!(
                            target: "batch",
                            identifier = %job.identifier,
                            attempt = job.attempt,
                            retry_after_ms = report.retry_after().unwrap_or_default().as_millis() as u64,
                            "retry hint beyond max backoff; keeping partial report"
                        );
                        finished[job.index] = true;
                        outstanding -= 1;
                        slots[job.index] = Some(BatchItem {
                            identifier: job.identifier,
                            attempts: job.attempt,
                            report,
                        });
                        continue;
                    };
                    info!(
                        target: "batch",
                        identifier = %job.identifier,
                        attempt = job.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "requeueing"
                    );
                    counter!("batch_requeued_total").increment(1);
                    requeued += 1;

                    let tx = job_tx.clone();
                    let stop = stop.clone();
                    let next = Job {
                        attempt: job.attempt + 1,
                        ..job
                    };
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = stop.cancelled() => {}
                            _ = tokio::time::sleep(delay) => { let _ = tx.send(next); }
                        }
                    });
                }
                Ok(report) => {
                    finished[job.index] = true;
                    outstanding -= 1;
                    slots[job.index] = Some(BatchItem {
                        identifier: job.identifier,
                        attempts: job.attempt,
                        report,
                    });
                }
            }
        }

        stop.cancel();
        drop(job_tx);
        while workers.join_next().await.is_some() {}

        let cancelled: Vec<String> = identifiers
            .iter()
            .zip(&finished)
            .filter(|(_, done)| !**done)
            .map(|(id, _)| id.clone())
            .collect();
        if !cancelled.is_empty() {
            warn!(target: "batch", count = cancelled.len(), "batch stopped with unfinished items");
        }

        let report = BatchReport {
            completed: slots.into_iter().flatten().collect(),
            rejected,
            cancelled,
            requeued,
        };
        info!(
            target: "batch",
            completed = report.completed.len(),
            rejected = report.rejected.len(),
            cancelled = report.cancelled.len(),
            requeued,
            "batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_respects_hint_and_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);
        assert_eq!(backoff_delay(1, None, base, max), Some(base));
        assert_eq!(
            backoff_delay(3, None, base, max),
            Some(Duration::from_millis(400))
        );
        assert_eq!(
            backoff_delay(1, Some(Duration::from_millis(750)), base, max),
            Some(Duration::from_millis(750))
        );
        assert_eq!(backoff_delay(10, None, base, max), Some(max));
        assert_eq!(backoff_delay(10, Some(max), base, max), Some(max));
    }

    #[test]
    fn hint_beyond_the_cap_gives_up() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        assert_eq!(
            backoff_delay(1, Some(Duration::from_secs(86_000)), base, max),
            None
        );
        let hint = Some(Duration::from_secs(5));
        assert_eq!(backoff_delay(1, hint, base, Duration::from_secs(1)), None);
    }
}
