mod error;
mod http;

use std::fmt;

use api_types::{
    prover::{ProofInputData, ProofKind},
    rollup::Block,
};
use async_trait::async_trait;

pub use error::{ProverError, ProverErrorKind, ProverResult};
pub use http::{HttpProverClient, ProverConfig};

/// Prefix marking a hex input entry as raw bytes for the proving program.
pub const BYTES_INPUT_PREFIX: &str = "0x01";

/// Inclusive, non-empty range of block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRange {
    from: u64,
    to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// The `size` blocks ending at `to`, e.g. `ending_at(20, 10)` is `11..=20`.
    pub fn ending_at(to: u64, size: u64) -> Option<Self> {
        if size == 0 || to < size {
            return None;
        }
        Self::new(to - size + 1, to)
    }

    pub const fn from(&self) -> u64 {
        self.from
    }

    pub const fn to(&self) -> u64 {
        self.to
    }

    /// Number of heights covered; `0..=u64::MAX` saturates at `u64::MAX`.
    pub const fn len(&self) -> u64 {
        (self.to - self.from).saturating_add(1)
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofStatus {
    Pending,
    Proving,
    Succeeded,
    Failed,
}

impl ProofStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ProofStatus::Succeeded | ProofStatus::Failed)
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofStatus::Pending => write!(f, "pending"),
            ProofStatus::Proving => write!(f, "proving"),
            ProofStatus::Succeeded => write!(f, "succeeded"),
            ProofStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Maps a backend `state` label onto [`ProofStatus`].
///
/// Unknown labels map to `Pending` so vocabulary drift on the backend never
/// fails a job early.
pub fn status_from_backend_state(state: &str) -> ProofStatus {
    match state {
        "Succeeded" => ProofStatus::Succeeded,
        "Failed" => ProofStatus::Failed,
        "Executing" | "AppProving" | "PostProcessing" => ProofStatus::Proving,
        "Queued" | "Executed" | "AppProvingDone" => ProofStatus::Pending,
        _ => ProofStatus::Pending,
    }
}

/// One observation of a backend job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub job_id: String,
    pub status: ProofStatus,
    pub backend_state: String,
    pub error_message: Option<String>,
    pub proof_size: Option<u64>,
}

/// Serializes a batch into the backend input encoding: the JSON block list,
/// hex encoded behind [`BYTES_INPUT_PREFIX`].
pub fn encode_batch_input(range: BlockRange, blocks: &[Block]) -> ProverResult<ProofInputData> {
    if blocks.is_empty() {
        return Err(ProverError::EmptyBatch);
    }
    let encoded = serde_json::to_vec(blocks).map_err(|source| ProverError::EncodeBatch {
        from: range.from(),
        to: range.to(),
        source,
    })?;
    Ok(ProofInputData {
        input: vec![format!("{BYTES_INPUT_PREFIX}{}", hex::encode(encoded))],
    })
}

#[async_trait]
pub trait ProverClient: Send + Sync {
    /// Submits a batch and returns the backend job id. Never retries.
    async fn submit(&self, range: BlockRange, blocks: &[Block]) -> ProverResult<String>;

    async fn status(&self, job_id: &str) -> ProverResult<StatusSnapshot>;

    /// Downloads the proof of a job the backend reported as succeeded.
    async fn fetch_artifact(&self, job_id: &str, kind: &ProofKind) -> ProverResult<Vec<u8>>;

    /// Best effort: a backend that cannot cancel still yields `Ok(())`.
    async fn cancel(&self, job_id: &str) -> ProverResult<()>;
}
