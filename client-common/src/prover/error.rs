use std::{fmt, path::PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("prover configuration error: {0}")]
    Config(String),
    #[error("failed to build HTTP client for prover")]
    ClientBuild(#[source] reqwest::Error),
    #[error("invalid prover base url while constructing {path}")]
    InvalidEndpoint {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("program artifact not found at {}", path.display())]
    ProgramNotFound { path: PathBuf },
    #[error("failed to read program artifact {}", path.display())]
    ProgramRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to register program")]
    RegisterRequest(#[source] reqwest::Error),
    #[error("program registration returned {status}: {body}")]
    RegisterRejected { status: StatusCode, body: String },
    #[error("failed to decode program registration response")]
    RegisterDecode(#[source] reqwest::Error),
    #[error("block batch is empty")]
    EmptyBatch,
    #[error("failed to encode block batch {from}..={to}")]
    EncodeBatch {
        from: u64,
        to: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to submit proof job for blocks {from}..={to}")]
    SubmitRequest {
        from: u64,
        to: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("proof job submission for blocks {from}..={to} returned {status}: {body}")]
    SubmitRejected {
        from: u64,
        to: u64,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode proof job submission response")]
    SubmitDecode(#[source] reqwest::Error),
    #[error("failed to query status of proof job {job_id}")]
    StatusRequest {
        job_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("status endpoint for proof job {job_id} returned {status}: {body}")]
    StatusRejected {
        job_id: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode status of proof job {job_id}")]
    StatusDecode {
        job_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to download {kind} proof for job {job_id}")]
    ArtifactRequest {
        job_id: String,
        kind: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("proof download for job {job_id} returned {status}")]
    ArtifactRejected { job_id: String, status: StatusCode },
    #[error("proof job {job_id} returned an empty artifact")]
    EmptyArtifact { job_id: String },
    #[error("failed to cancel proof job {job_id}")]
    CancelRequest {
        job_id: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type ProverResult<T> = Result<T, ProverError>;

/// Coarse classification used by callers to pick a recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProverErrorKind {
    Config,
    Submission,
    Query,
    Artifact,
    Cancel,
}

impl fmt::Display for ProverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProverErrorKind::Config => write!(f, "config"),
            ProverErrorKind::Submission => write!(f, "submission"),
            ProverErrorKind::Query => write!(f, "query"),
            ProverErrorKind::Artifact => write!(f, "artifact"),
            ProverErrorKind::Cancel => write!(f, "cancel"),
        }
    }
}

impl ProverError {
    pub fn kind(&self) -> ProverErrorKind {
        match self {
            ProverError::Config(_)
            | ProverError::ClientBuild(_)
            | ProverError::InvalidEndpoint { .. }
            | ProverError::ProgramNotFound { .. }
            | ProverError::ProgramRead { .. }
            | ProverError::RegisterRequest(_)
            | ProverError::RegisterRejected { .. }
            | ProverError::RegisterDecode(_) => ProverErrorKind::Config,
            ProverError::EmptyBatch
            | ProverError::EncodeBatch { .. }
            | ProverError::SubmitRequest { .. }
            | ProverError::SubmitRejected { .. }
            | ProverError::SubmitDecode(_) => ProverErrorKind::Submission,
            ProverError::StatusRequest { .. }
            | ProverError::StatusRejected { .. }
            | ProverError::StatusDecode { .. } => ProverErrorKind::Query,
            ProverError::ArtifactRequest { .. }
            | ProverError::ArtifactRejected { .. }
            | ProverError::EmptyArtifact { .. } => ProverErrorKind::Artifact,
            ProverError::CancelRequest { .. } => ProverErrorKind::Cancel,
        }
    }
}
