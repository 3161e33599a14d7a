use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use api_types::prover::ProofKind;
use client_common::prover::{ProofStatus, ProverClient, ProverResult, StatusSnapshot};
use log::{debug, error, info, warn};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::job::{FailureReason, Proof, ProofJob, ProofOutcome, ProofResult};

/// What a tracker does when a status query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryErrorPolicy {
    /// Fail the job on the first query error.
    #[default]
    FailFast,
    /// Log and keep polling until the deadline.
    Tolerate,
}

impl FromStr for QueryErrorPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "fail_fast" => Ok(QueryErrorPolicy::FailFast),
            "tolerate" => Ok(QueryErrorPolicy::Tolerate),
            other => Err(format!("unsupported query error policy '{other}'")),
        }
    }
}

impl fmt::Display for QueryErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorPolicy::FailFast => write!(f, "fail_fast"),
            QueryErrorPolicy::Tolerate => write!(f, "tolerate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub proof_kind: ProofKind,
    pub query_error_policy: QueryErrorPolicy,
}

enum Observation {
    Running,
    /// The backend reports success; the proof still has to be fetched.
    ProofReady,
    Finished(ProofOutcome),
}

/// How a tracker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerExit {
    Delivered(ProofStatus),
    /// Engine shutdown; nothing was delivered.
    Shutdown,
    /// The sink receiver is gone; the result was dropped.
    SinkClosed,
}

/// Polls one submitted job until it reaches a terminal state, then delivers
/// exactly one [`ProofResult`] on the sink.
pub struct ProofJobTracker {
    job: ProofJob,
    client: Arc<dyn ProverClient>,
    config: TrackerConfig,
    sink: mpsc::Sender<ProofResult>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl ProofJobTracker {
    pub fn new(
        job: ProofJob,
        client: Arc<dyn ProverClient>,
        config: TrackerConfig,
        sink: mpsc::Sender<ProofResult>,
    ) -> Self {
        Self {
            job,
            client,
            config,
            sink,
            cancel: CancellationToken::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn run(mut self) -> TrackerExit {
        let shutdown = self.shutdown.clone();
        let cancel = self.cancel.clone();
        let client = self.client.clone();
        let job_id = self.job.job_id().to_owned();
        let proof_kind = self.config.proof_kind.clone();
        let deadline_at = self.job.deadline();

        let mut ticker = time::interval_at(
            self.job.submitted_at() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        // backend calls race the same stop conditions as the ticker
        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return self.stopped(),
                _ = cancel.cancelled() => break self.cancel_backend().await,
                _ = &mut deadline => break self.timed_out(),
                now = ticker.tick() => {
                    if now >= deadline_at {
                        break self.timed_out();
                    }
                    let polled = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return self.stopped(),
                        _ = cancel.cancelled() => break self.cancel_backend().await,
                        _ = &mut deadline => break self.timed_out(),
                        polled = client.status(&job_id) => polled,
                    };
                    match self.observe(polled) {
                        Observation::Running => {}
                        Observation::Finished(outcome) => break outcome,
                        Observation::ProofReady => {
                            let fetched = tokio::select! {
                                biased;
                                _ = shutdown.cancelled() => return self.stopped(),
                                _ = cancel.cancelled() => break self.cancel_backend().await,
                                _ = &mut deadline => break self.timed_out(),
                                fetched = client.fetch_artifact(&job_id, &proof_kind) => fetched,
                            };
                            break self.collect_proof(fetched);
                        }
                    }
                }
            }
        };

        self.deliver(outcome).await
    }

    /// Folds one status observation into the job.
    fn observe(&mut self, polled: ProverResult<StatusSnapshot>) -> Observation {
        let range = self.job.range();
        let snapshot = match polled {
            Ok(snapshot) => snapshot,
            Err(err) => {
                return match self.config.query_error_policy {
                    QueryErrorPolicy::FailFast => {
                        error!(
                            "status query for proof job {} (blocks {range}) failed: {err:?}",
                            self.job.job_id()
                        );
                        self.mark(ProofStatus::Failed);
                        Observation::Finished(ProofOutcome::Failed(FailureReason::Query(
                            err.to_string(),
                        )))
                    }
                    QueryErrorPolicy::Tolerate => {
                        warn!(
                            "status query for proof job {} (blocks {range}) failed, will retry: {err:?}",
                            self.job.job_id()
                        );
                        Observation::Running
                    }
                };
            }
        };

        match snapshot.status {
            ProofStatus::Succeeded => Observation::ProofReady,
            ProofStatus::Failed => {
                error!(
                    "proof job {} (blocks {range}) failed on the backend: {}",
                    self.job.job_id(),
                    snapshot.error_message.as_deref().unwrap_or("no error message")
                );
                self.mark(ProofStatus::Failed);
                Observation::Finished(ProofOutcome::Failed(FailureReason::Backend {
                    message: snapshot.error_message,
                }))
            }
            status => {
                debug!(
                    "proof job {} (blocks {range}) is {status} ({})",
                    self.job.job_id(),
                    snapshot.backend_state
                );
                self.mark(status);
                Observation::Running
            }
        }
    }

    fn collect_proof(&mut self, fetched: ProverResult<Vec<u8>>) -> ProofOutcome {
        let range = self.job.range();
        match fetched {
            Ok(bytes) => {
                info!(
                    "proof job {} (blocks {range}) succeeded with a {} byte proof",
                    self.job.job_id(),
                    bytes.len()
                );
                self.mark(ProofStatus::Succeeded);
                ProofOutcome::Succeeded(Proof {
                    range,
                    bytes,
                    commitments: self.job.commitments(),
                })
            }
            Err(err) => {
                error!(
                    "proof job {} (blocks {range}) succeeded but the proof could not be fetched: {err:?}",
                    self.job.job_id()
                );
                self.mark(ProofStatus::Failed);
                ProofOutcome::Failed(FailureReason::Artifact(err.to_string()))
            }
        }
    }

    async fn cancel_backend(&mut self) -> ProofOutcome {
        let range = self.job.range();
        info!(
            "cancelling proof job {} (blocks {range})",
            self.job.job_id()
        );
        if let Err(err) = self.client.cancel(self.job.job_id()).await {
            warn!(
                "failed to cancel proof job {} (blocks {range}) on the backend: {err:?}",
                self.job.job_id()
            );
        }
        self.mark(ProofStatus::Failed);
        ProofOutcome::Failed(FailureReason::Cancelled)
    }

    fn timed_out(&mut self) -> ProofOutcome {
        warn!(
            "proof job {} (blocks {}) timed out after {:?}",
            self.job.job_id(),
            self.job.range(),
            self.config.poll_timeout
        );
        self.mark(ProofStatus::Failed);
        ProofOutcome::Failed(FailureReason::TimedOut)
    }

    fn stopped(&self) -> TrackerExit {
        debug!(
            "tracker for proof job {} (blocks {}) stopped by shutdown",
            self.job.job_id(),
            self.job.range()
        );
        TrackerExit::Shutdown
    }

    fn mark(&mut self, status: ProofStatus) {
        if let Err(err) = self.job.transition(status) {
            warn!("{err}");
        }
    }

    async fn deliver(self, outcome: ProofOutcome) -> TrackerExit {
        let status = outcome.status();
        let result = self.job.into_result(outcome);
        let job_id = result.job_id.clone();
        let range = result.range;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!("dropping result of proof job {job_id} (blocks {range}) on shutdown");
                TrackerExit::Shutdown
            }
            sent = self.sink.send(result) => match sent {
                Ok(()) => TrackerExit::Delivered(status),
                Err(_) => {
                    warn!("result sink closed; dropping result of proof job {job_id} (blocks {range})");
                    TrackerExit::SinkClosed
                }
            },
        }
    }
}
