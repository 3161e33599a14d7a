use std::{sync::Arc, time::Duration};

use client_common::prover::{BlockRange, ProverClient};
use dashmap::{DashMap, DashSet};
use log::{debug, error, info, warn};
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use super::{
    job::{BatchCommitments, ProofJob, ProofResult},
    tracker::{ProofJobTracker, TrackerConfig},
};
use crate::{
    errors::{EngineError, EngineResult},
    host::BlockSource,
};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub batch_size: u64,
    pub sink_capacity: usize,
    pub tracker: TrackerConfig,
}

impl OrchestratorConfig {
    pub fn ensure_valid(&self) -> EngineResult<()> {
        if self.batch_size == 0 {
            return Err(EngineError::Config(
                "batch size must be greater than zero".to_owned(),
            ));
        }
        if self.sink_capacity == 0 {
            return Err(EngineError::Config(
                "sink capacity must be greater than zero".to_owned(),
            ));
        }
        if self.tracker.poll_interval.is_zero() || self.tracker.poll_timeout.is_zero() {
            return Err(EngineError::Config(
                "poll interval and poll timeout must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A batch the orchestrator handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub range: BlockRange,
    /// The range was already in flight; no new job was created.
    pub already_in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJobInfo {
    pub job_id: String,
    pub range: BlockRange,
    pub elapsed: Duration,
}

struct ActiveJob {
    range: BlockRange,
    cancel: CancellationToken,
    submitted_at: Instant,
}

/// Turns finalization events into proof jobs and runs one tracker per job.
pub struct Orchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn ProverClient>,
    blocks: Arc<dyn BlockSource>,
    jobs: Arc<DashMap<String, ActiveJob>>,
    sink: mpsc::Sender<ProofResult>,
    shutdown: CancellationToken,
    last_height: Mutex<Option<u64>>,
    /// Ranges between the in-flight check and registration of their job.
    submitting: DashSet<BlockRange>,
}

/// Claim on a range while it is being submitted; released on drop.
struct Reservation<'a> {
    submitting: &'a DashSet<BlockRange>,
    range: BlockRange,
}

impl<'a> Reservation<'a> {
    fn claim(submitting: &'a DashSet<BlockRange>, range: BlockRange) -> Option<Self> {
        submitting
            .insert(range)
            .then_some(Self { submitting, range })
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.submitting.remove(&self.range);
    }
}

impl Orchestrator {
    pub fn batch_size(&self) -> u64 {
        self.config.batch_size
    }

    /// Handles a finalized block at `height`, submitting the batch that ends
    /// there when `height` is a batch boundary.
    ///
    /// Heights must strictly increase; stale events are ignored.
    pub async fn on_block_finalized(&self, height: u64) -> EngineResult<Option<SubmittedJob>> {
        let mut last_height = self.last_height.lock().await;
        if let Some(last) = *last_height {
            if height <= last {
                warn!("ignoring finalization of block {height}; already saw block {last}");
                return Ok(None);
            }
        }
        *last_height = Some(height);

        let batch_size = self.config.batch_size;
        if height == 0 || height % batch_size != 0 {
            return Ok(None);
        }
        let Some(range) = BlockRange::ending_at(height, batch_size) else {
            return Ok(None);
        };

        match self.submit_range(range).await {
            Ok(job) => Ok(Some(job)),
            Err(err) => {
                error!("skipping batch {range}: {err:?}");
                Err(err)
            }
        }
    }

    /// Resubmits a batch-aligned range, e.g. one whose submission or proof
    /// failed earlier.
    pub async fn replay(&self, range: BlockRange) -> EngineResult<SubmittedJob> {
        let batch_size = self.config.batch_size;
        let aligned = range.to() % batch_size == 0
            && BlockRange::ending_at(range.to(), batch_size) == Some(range);
        if !aligned {
            return Err(EngineError::UnalignedRange { range, batch_size });
        }
        info!("replaying batch {range}");
        self.submit_range(range).await.inspect_err(|err| {
            error!("replay of batch {range} failed: {err:?}");
        })
    }

    /// Requests cancellation of an in-flight job. Returns `false` when the
    /// job is unknown or already delivered its result.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.jobs.get(job_id) {
            Some(job) => {
                info!("cancellation requested for proof job {job_id} (blocks {})", job.range);
                job.cancel.cancel();
                true
            }
            None => {
                debug!("cancel for proof job {job_id} ignored; job is not in flight");
                false
            }
        }
    }

    pub fn active_jobs(&self) -> Vec<ActiveJobInfo> {
        let mut jobs: Vec<ActiveJobInfo> = self
            .jobs
            .iter()
            .map(|entry| ActiveJobInfo {
                job_id: entry.key().clone(),
                range: entry.range,
                elapsed: entry.submitted_at.elapsed(),
            })
            .collect();
        jobs.sort_by_key(|job| job.range);
        jobs
    }

    /// Stops every tracker. Results not yet delivered are discarded.
    pub fn shutdown(&self) {
        info!(
            "shutting down orchestrator with {} proof job(s) in flight",
            self.jobs.len()
        );
        self.shutdown.cancel();
    }

    fn in_flight(&self, range: BlockRange) -> Option<String> {
        self.jobs
            .iter()
            .find(|entry| entry.range == range)
            .map(|entry| entry.key().clone())
    }

    async fn submit_range(&self, range: BlockRange) -> EngineResult<SubmittedJob> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let Some(_reservation) = Reservation::claim(&self.submitting, range) else {
            return Err(EngineError::SubmissionInProgress { range });
        };

        if let Some(job_id) = self.in_flight(range) {
            info!("batch {range} is already being proven by job {job_id}");
            return Ok(SubmittedJob {
                job_id,
                range,
                already_in_flight: true,
            });
        }

        let blocks = self
            .blocks
            .get_block_range(range)
            .await
            .map_err(|source| EngineError::BlockFetch { range, source })?;
        let commitments = BatchCommitments::from_blocks(range, &blocks)?;
        let job_id = self
            .client
            .submit(range, &blocks)
            .await
            .map_err(|source| EngineError::Submission { range, source })?;
        info!("submitted batch {range} as proof job {job_id}");

        let submitted_at = Instant::now();
        let cancel = CancellationToken::new();
        self.jobs.insert(
            job_id.clone(),
            ActiveJob {
                range,
                cancel: cancel.clone(),
                submitted_at,
            },
        );

        let job = ProofJob::new(
            job_id.clone(),
            range,
            commitments,
            submitted_at,
            self.config.tracker.poll_timeout,
        );
        let tracker = ProofJobTracker::new(
            job,
            self.client.clone(),
            self.config.tracker.clone(),
            self.sink.clone(),
        )
        .with_cancellation(cancel)
        .with_shutdown(self.shutdown.clone());

        let jobs = self.jobs.clone();
        let tracked_id = job_id.clone();
        tokio::spawn(async move {
            let exit = tracker.run().await;
            jobs.remove(&tracked_id);
            debug!("tracker for proof job {tracked_id} (blocks {range}) exited: {exit:?}");
        });

        Ok(SubmittedJob {
            job_id,
            range,
            already_in_flight: false,
        })
    }
}

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    client: Arc<dyn ProverClient>,
    blocks: Arc<dyn BlockSource>,
    shutdown: Option<CancellationToken>,
}

impl OrchestratorBuilder {
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn ProverClient>,
        blocks: Arc<dyn BlockSource>,
    ) -> Self {
        Self {
            config,
            client,
            blocks,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Returns the orchestrator and the receiving end of its completion sink.
    pub fn into_orchestrator(self) -> EngineResult<(Orchestrator, mpsc::Receiver<ProofResult>)> {
        self.config.ensure_valid()?;
        let (sink, results) = mpsc::channel(self.config.sink_capacity);
        let orchestrator = Orchestrator {
            config: self.config,
            client: self.client,
            blocks: self.blocks,
            jobs: Arc::new(DashMap::new()),
            sink,
            shutdown: self.shutdown.unwrap_or_default(),
            last_height: Mutex::new(None),
            submitting: DashSet::new(),
        };
        Ok((orchestrator, results))
    }
}
