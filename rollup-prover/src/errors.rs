use client_common::prover::{BlockRange, ProverError};
use thiserror::Error;

use crate::host::BlockSourceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine configuration error: {0}")]
    Config(String),
    #[error("range {range} is not a batch of {batch_size} blocks ending on a batch boundary")]
    UnalignedRange { range: BlockRange, batch_size: u64 },
    #[error("failed to load blocks {range}")]
    BlockFetch {
        range: BlockRange,
        #[source]
        source: BlockSourceError,
    },
    #[error("blocks for {range} do not form the batch: {reason}")]
    MalformedBatch { range: BlockRange, reason: String },
    #[error("failed to submit batch {range}")]
    Submission {
        range: BlockRange,
        #[source]
        source: ProverError,
    },
    #[error("batch {range} is already being submitted")]
    SubmissionInProgress { range: BlockRange },
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

pub type EngineResult<T> = Result<T, EngineError>;
