pub mod prover {
    use serde::{Deserialize, Serialize};
    use std::{fmt, str::FromStr};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum ProofKind {
        Stark,
        Evm,
    }

    impl fmt::Display for ProofKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                ProofKind::Stark => write!(f, "stark"),
                ProofKind::Evm => write!(f, "evm"),
            }
        }
    }

    impl FromStr for ProofKind {
        type Err = String;

        fn from_str(value: &str) -> Result<Self, Self::Err> {
            match value.trim() {
                "stark" => Ok(ProofKind::Stark),
                "evm" => Ok(ProofKind::Evm),
                other => Err(format!("unsupported proof kind '{other}'")),
            }
        }
    }

    /// Response of `POST /v1/programs`.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ProgramUploadResponse {
        pub id: String,
    }

    /// Response of `POST /v1/proofs`.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ProofCreateResponse {
        pub id: String,
    }

    /// Body of `POST /v1/proofs`: hex strings, byte payloads carry a `0x01` prefix.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ProofInputData {
        pub input: Vec<String>,
    }

    /// Status document of `GET /v1/proofs/{id}`.
    ///
    /// `state` is kept as a raw string; the backend vocabulary is
    /// Queued, Executing, Executed, AppProving, AppProvingDone,
    /// PostProcessing, Failed and Succeeded, but new labels may appear.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ProofStatusResponse {
        pub id: String,
        pub state: String,
        #[serde(default)]
        pub created_at: Option<String>,
        #[serde(default)]
        pub proof_type: Option<String>,
        #[serde(default)]
        pub program_uuid: Option<String>,
        #[serde(default)]
        pub error_message: Option<String>,
        #[serde(default)]
        pub launched_at: Option<String>,
        #[serde(default)]
        pub terminated_at: Option<String>,
        #[serde(default)]
        pub proof_size: Option<u64>,
        #[serde(default)]
        pub num_instructions: Option<u64>,
    }
}

pub mod rollup {
    use alloy::primitives::{B256, Bytes};
    use serde::{Deserialize, Serialize};
    use serde_with::{DisplayFromStr, serde_as};

    /// A finalized block as handed over by the host runtime.
    #[serde_as]
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Block {
        pub height: u64,
        #[serde_as(as = "DisplayFromStr")]
        pub hash: B256,
        #[serde_as(as = "DisplayFromStr")]
        pub parent_hash: B256,
        #[serde_as(as = "DisplayFromStr")]
        pub pre_state_root: B256,
        #[serde_as(as = "DisplayFromStr")]
        pub state_root: B256,
        #[serde(default)]
        pub timestamp: u64,
        #[serde(default)]
        pub transactions: Vec<Bytes>,
    }
}

pub mod hook {
    use serde::{Deserialize, Serialize};

    use crate::rollup::Block;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct FinalizedBlocksRequest {
        pub blocks: Vec<Block>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SubmittedBatch {
        pub job_id: String,
        pub from_height: u64,
        pub to_height: u64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct FinalizedBlocksResponse {
        pub accepted: usize,
        pub submitted: Vec<SubmittedBatch>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ActiveJobResponse {
        pub job_id: String,
        pub from_height: u64,
        pub to_height: u64,
        pub elapsed_secs: u64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ReplayRequest {
        pub from_height: u64,
        pub to_height: u64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct CancelJobResponse {
        pub job_id: String,
        pub cancelled: bool,
    }
}
