mod job;
mod orchestrator;
mod settlement;
mod tracker;

pub use job::{
    BatchCommitments, FailureReason, InvalidTransition, Proof, ProofJob, ProofOutcome, ProofResult,
};
pub use orchestrator::{
    ActiveJobInfo, Orchestrator, OrchestratorBuilder, OrchestratorConfig, SubmittedJob,
};
pub use settlement::{
    CommitmentResolver, ReorderBuffer, SettlementForwarder, SettlementOrder, SettlementReport,
    SettlementStats, SettlementVerifier,
};
pub use tracker::{ProofJobTracker, QueryErrorPolicy, TrackerConfig, TrackerExit};
