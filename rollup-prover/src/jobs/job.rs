use std::{fmt, time::Duration};

use alloy::primitives::B256;
use api_types::rollup::Block;
use client_common::prover::{BlockRange, ProofStatus};
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    errors::{EngineError, EngineResult},
    public_values::PublicValues,
};

/// State commitments a batch moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCommitments {
    pub pre_state_root: B256,
    pub post_state_root: B256,
}

impl BatchCommitments {
    /// Pre-commitment is the first block's `pre_state_root`, post-commitment
    /// the last block's `state_root`. Blocks must cover `range` exactly.
    pub fn from_blocks(range: BlockRange, blocks: &[Block]) -> EngineResult<Self> {
        if blocks.len() as u64 != range.len() {
            return Err(EngineError::MalformedBatch {
                range,
                reason: format!("expected {} blocks, got {}", range.len(), blocks.len()),
            });
        }
        for (expected, block) in (range.from()..=range.to()).zip(blocks) {
            if block.height != expected {
                return Err(EngineError::MalformedBatch {
                    range,
                    reason: format!("expected height {expected}, found {}", block.height),
                });
            }
        }
        match (blocks.first(), blocks.last()) {
            (Some(first), Some(last)) => Ok(Self {
                pre_state_root: first.pre_state_root,
                post_state_root: last.state_root,
            }),
            _ => Err(EngineError::MalformedBatch {
                range,
                reason: "no blocks".to_owned(),
            }),
        }
    }
}

/// A proof together with the batch it attests to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub range: BlockRange,
    pub bytes: Vec<u8>,
    pub commitments: BatchCommitments,
}

impl Proof {
    pub fn public_values(&self) -> PublicValues {
        PublicValues {
            from_height: self.range.from(),
            to_height: self.range.to(),
            pre_state_root: self.commitments.pre_state_root,
            post_state_root: self.commitments.post_state_root,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The backend reported the job as failed.
    Backend { message: Option<String> },
    Query(String),
    Artifact(String),
    TimedOut,
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Backend { message: Some(message) } => {
                write!(f, "backend failed the job: {message}")
            }
            FailureReason::Backend { message: None } => write!(f, "backend failed the job"),
            FailureReason::Query(err) => write!(f, "status query failed: {err}"),
            FailureReason::Artifact(err) => write!(f, "proof download failed: {err}"),
            FailureReason::TimedOut => write!(f, "timed out"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    Succeeded(Proof),
    Failed(FailureReason),
}

impl ProofOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProofOutcome::Succeeded(_))
    }

    pub fn status(&self) -> ProofStatus {
        match self {
            ProofOutcome::Succeeded(_) => ProofStatus::Succeeded,
            ProofOutcome::Failed(_) => ProofStatus::Failed,
        }
    }
}

/// Terminal result delivered on the completion sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofResult {
    pub job_id: String,
    pub range: BlockRange,
    pub outcome: ProofOutcome,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("proof job {job_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub job_id: String,
    pub from: ProofStatus,
    pub to: ProofStatus,
}

/// One outstanding proving request.
#[derive(Debug, Clone)]
pub struct ProofJob {
    job_id: String,
    range: BlockRange,
    status: ProofStatus,
    commitments: BatchCommitments,
    submitted_at: Instant,
    deadline: Instant,
}

impl ProofJob {
    pub fn new(
        job_id: String,
        range: BlockRange,
        commitments: BatchCommitments,
        submitted_at: Instant,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            job_id,
            range,
            status: ProofStatus::Pending,
            commitments,
            submitted_at,
            deadline: submitted_at + poll_timeout,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn status(&self) -> ProofStatus {
        self.status
    }

    pub fn commitments(&self) -> BatchCommitments {
        self.commitments
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Pending and Proving may alternate freely; terminal states are final.
    pub fn transition(&mut self, next: ProofStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn into_result(self, outcome: ProofOutcome) -> ProofResult {
        ProofResult {
            job_id: self.job_id,
            range: self.range,
            outcome,
        }
    }
}
