use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use alloy::primitives::B256;
use async_trait::async_trait;
use client_common::{
    contracts::{ContractResult, verifier::VerifierContract},
    prover::BlockRange,
};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::job::{FailureReason, ProofOutcome, ProofResult};

/// On-chain proof verification.
#[async_trait]
pub trait SettlementVerifier: Send + Sync {
    /// Succeeds only when the verifier accepts the proof.
    async fn verify(
        &self,
        public_values: &[u8],
        proof: &[u8],
        program_commit: B256,
        vm_commit: B256,
    ) -> ContractResult<()>;
}

#[async_trait]
impl SettlementVerifier for VerifierContract {
    async fn verify(
        &self,
        public_values: &[u8],
        proof: &[u8],
        program_commit: B256,
        vm_commit: B256,
    ) -> ContractResult<()> {
        VerifierContract::verify(self, public_values, proof, program_commit, vm_commit).await
    }
}

/// Supplies the program and VM commitments passed to the verifier.
#[derive(Debug, Clone, Default)]
pub struct CommitmentResolver {
    program_commit: Option<B256>,
    vm_commit: Option<B256>,
}

impl CommitmentResolver {
    pub fn new(program_commit: Option<B256>, vm_commit: Option<B256>) -> Self {
        Self {
            program_commit,
            vm_commit,
        }
    }

    /// Configured overrides win; a missing commitment falls back to zero.
    pub fn resolve(&self) -> (B256, B256) {
        let program_commit = self.program_commit.unwrap_or_else(|| {
            warn!("no program commitment configured; using the zero commitment");
            B256::ZERO
        });
        let vm_commit = self.vm_commit.unwrap_or_else(|| {
            warn!("no VM commitment configured; using the zero commitment");
            B256::ZERO
        });
        (program_commit, vm_commit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementOrder {
    /// Forward results as they complete.
    #[default]
    Independent,
    /// Forward results strictly in block height order.
    Sequential,
}

impl FromStr for SettlementOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "independent" => Ok(SettlementOrder::Independent),
            "sequential" => Ok(SettlementOrder::Sequential),
            other => Err(format!("unsupported settlement order '{other}'")),
        }
    }
}

impl fmt::Display for SettlementOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementOrder::Independent => write!(f, "independent"),
            SettlementOrder::Sequential => write!(f, "sequential"),
        }
    }
}

/// Holds successful results until every lower batch has been released.
#[derive(Debug)]
pub struct ReorderBuffer {
    next_height: u64,
    pending: BTreeMap<u64, ProofResult>,
}

impl ReorderBuffer {
    pub fn new(start_height: u64) -> Self {
        Self {
            next_height: start_height,
            pending: BTreeMap::new(),
        }
    }

    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffers `result` and returns every result that is now next in line.
    pub fn push(&mut self, result: ProofResult) -> Vec<ProofResult> {
        let from = result.range.from();
        if from < self.next_height {
            warn!(
                "dropping proof job {} (blocks {}); settlement already passed height {}",
                result.job_id, result.range, self.next_height
            );
            return Vec::new();
        }
        if let Some(replaced) = self.pending.insert(from, result) {
            warn!(
                "proof job {} (blocks {}) replaced by a newer result",
                replaced.job_id, replaced.range
            );
        }

        let mut ready = Vec::new();
        while let Some(result) = self.pending.remove(&self.next_height) {
            self.next_height = result.range.to() + 1;
            ready.push(result);
        }
        ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementReport {
    Verified {
        job_id: String,
        range: BlockRange,
    },
    /// The verifier refused the proof or could not be reached.
    Rejected {
        job_id: String,
        range: BlockRange,
        reason: String,
    },
    /// The job failed; nothing was sent to the verifier.
    Dropped {
        job_id: String,
        range: BlockRange,
        reason: FailureReason,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementStats {
    pub verified: usize,
    pub rejected: usize,
    pub dropped: usize,
}

impl SettlementStats {
    fn record(&mut self, report: &SettlementReport) {
        match report {
            SettlementReport::Verified { .. } => self.verified += 1,
            SettlementReport::Rejected { .. } => self.rejected += 1,
            SettlementReport::Dropped { .. } => self.dropped += 1,
        }
    }
}

/// Consumes completed proof results and hands successful ones to the
/// settlement verifier.
pub struct SettlementForwarder {
    verifier: Arc<dyn SettlementVerifier>,
    commitments: CommitmentResolver,
    reorder: Option<ReorderBuffer>,
}

impl SettlementForwarder {
    pub fn new(verifier: Arc<dyn SettlementVerifier>, commitments: CommitmentResolver) -> Self {
        Self {
            verifier,
            commitments,
            reorder: None,
        }
    }

    pub fn with_order(mut self, order: SettlementOrder, start_height: u64) -> Self {
        self.reorder = match order {
            SettlementOrder::Independent => None,
            SettlementOrder::Sequential => Some(ReorderBuffer::new(start_height)),
        };
        self
    }

    /// Settles one result, bypassing any ordering.
    pub async fn forward(&self, result: ProofResult) -> SettlementReport {
        let ProofResult {
            job_id,
            range,
            outcome,
        } = result;
        let proof = match outcome {
            ProofOutcome::Succeeded(proof) => proof,
            ProofOutcome::Failed(reason) => {
                warn!("not settling proof job {job_id} (blocks {range}): {reason}");
                return SettlementReport::Dropped {
                    job_id,
                    range,
                    reason,
                };
            }
        };

        let public_values = proof.public_values().encode();
        let (program_commit, vm_commit) = self.commitments.resolve();
        match self
            .verifier
            .verify(&public_values, &proof.bytes, program_commit, vm_commit)
            .await
        {
            Ok(()) => {
                info!("verifier accepted proof job {job_id} (blocks {range})");
                SettlementReport::Verified { job_id, range }
            }
            Err(err) => {
                error!("verifier rejected proof job {job_id} (blocks {range}): {err:?}");
                SettlementReport::Rejected {
                    job_id,
                    range,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Routes `result` through the reorder buffer when ordering is enabled.
    pub async fn accept(&mut self, result: ProofResult) -> Vec<SettlementReport> {
        let ready = match self.reorder.as_mut() {
            Some(reorder) if result.outcome.is_success() => reorder.push(result),
            Some(reorder) => {
                warn!(
                    "proof job {} (blocks {}) failed; sequential settlement waits at height {} until the range is replayed",
                    result.job_id,
                    result.range,
                    reorder.next_height()
                );
                vec![result]
            }
            None => vec![result],
        };

        let mut reports = Vec::with_capacity(ready.len());
        for result in ready {
            reports.push(self.forward(result).await);
        }
        reports
    }

    /// Drains the completion sink until it closes or `shutdown` fires.
    pub async fn run(
        mut self,
        mut results: mpsc::Receiver<ProofResult>,
        shutdown: CancellationToken,
    ) -> SettlementStats {
        let mut stats = SettlementStats::default();
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = results.recv() => match received {
                    Some(result) => result,
                    None => break,
                },
            };
            for report in self.accept(result).await {
                stats.record(&report);
            }
        }
        info!(
            "settlement forwarder stopped: {} verified, {} rejected, {} dropped",
            stats.verified, stats.rejected, stats.dropped
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{BatchCommitments, Proof};

    fn success(from: u64, to: u64) -> ProofResult {
        let range = BlockRange::new(from, to).unwrap();
        ProofResult {
            job_id: format!("job-{from}"),
            range,
            outcome: ProofOutcome::Succeeded(Proof {
                range,
                bytes: vec![1, 2, 3],
                commitments: BatchCommitments {
                    pre_state_root: B256::ZERO,
                    post_state_root: B256::ZERO,
                },
            }),
        }
    }

    fn released(results: Vec<ProofResult>) -> Vec<u64> {
        results.iter().map(|r| r.range.from()).collect()
    }

    #[test]
    fn releases_results_in_height_order() {
        let mut buffer = ReorderBuffer::new(1);
        assert!(buffer.push(success(11, 20)).is_empty());
        assert!(buffer.push(success(21, 30)).is_empty());
        assert_eq!(released(buffer.push(success(1, 10))), vec![1, 11, 21]);
        assert_eq!(buffer.next_height(), 31);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut buffer = ReorderBuffer::new(11);
        assert!(buffer.push(success(1, 10)).is_empty());
        assert_eq!(released(buffer.push(success(11, 20))), vec![11]);
    }

    #[test]
    fn overrides_win_over_zero_commitment() {
        let resolver = CommitmentResolver::new(Some(B256::repeat_byte(7)), None);
        assert_eq!(resolver.resolve(), (B256::repeat_byte(7), B256::ZERO));
    }

    #[test]
    fn settlement_order_parses_config_values() {
        assert_eq!(
            "sequential".parse::<SettlementOrder>(),
            Ok(SettlementOrder::Sequential)
        );
        assert_eq!(
            "independent".parse::<SettlementOrder>(),
            Ok(SettlementOrder::Independent)
        );
        assert!("random".parse::<SettlementOrder>().is_err());
    }
}
