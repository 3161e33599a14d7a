#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy::primitives::B256;
use api_types::{prover::ProofKind, rollup::Block};
use async_trait::async_trait;
use client_common::{
    contracts::{ContractError, ContractResult},
    prover::{BlockRange, ProofStatus, ProverClient, ProverError, ProverResult, StatusSnapshot},
};
use reqwest::StatusCode;
use rollup_prover::{
    host::BlockBuffer,
    jobs::{OrchestratorConfig, QueryErrorPolicy, SettlementVerifier, TrackerConfig},
};

pub fn block(height: u64) -> Block {
    Block {
        height,
        hash: B256::left_padding_from(&height.to_be_bytes()),
        parent_hash: B256::left_padding_from(&height.saturating_sub(1).to_be_bytes()),
        pre_state_root: root(height.saturating_sub(1)),
        state_root: root(height),
        timestamp: 1_700_000_000 + height,
        transactions: Vec::new(),
    }
}

/// State root after applying block `height`.
pub fn root(height: u64) -> B256 {
    B256::left_padding_from(&(0xdead_0000_u64 + height).to_be_bytes())
}

pub fn buffer_with(heights: std::ops::RangeInclusive<u64>) -> Arc<BlockBuffer> {
    let buffer = Arc::new(BlockBuffer::new());
    for height in heights {
        buffer.insert(block(height));
    }
    buffer
}

pub fn tracker_config(interval_secs: u64, timeout_secs: u64) -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_secs(interval_secs),
        poll_timeout: Duration::from_secs(timeout_secs),
        proof_kind: ProofKind::Stark,
        query_error_policy: QueryErrorPolicy::FailFast,
    }
}

pub fn orchestrator_config(batch_size: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        batch_size,
        sink_capacity: 10,
        tracker: tracker_config(1, 60),
    }
}

/// What the scripted backend answers to one status query.
#[derive(Debug, Clone)]
pub enum Step {
    State(&'static str),
    Fail(&'static str),
    QueryError,
}

/// Prover backend replaying a status script; the last step repeats.
pub struct ScriptedProver {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    artifact_ok: AtomicBool,
    reject_submissions: AtomicBool,
    next_id: AtomicUsize,
    submitted: Mutex<Vec<BlockRange>>,
    status_calls: AtomicUsize,
    artifact_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    status_delay: Mutex<Duration>,
    artifact_delay: Mutex<Duration>,
    slow_submissions: Mutex<Vec<(BlockRange, Duration)>>,
}

impl ScriptedProver {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        let last = script.last().cloned().unwrap_or(Step::State("Queued"));
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            artifact_ok: AtomicBool::new(true),
            reject_submissions: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
            submitted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            artifact_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            status_delay: Mutex::new(Duration::ZERO),
            artifact_delay: Mutex::new(Duration::ZERO),
            slow_submissions: Mutex::new(Vec::new()),
        })
    }

    pub fn always(state: &'static str) -> Arc<Self> {
        Self::new(vec![Step::State(state)])
    }

    pub fn fail_artifacts(&self) {
        self.artifact_ok.store(false, Ordering::SeqCst);
    }

    /// Every status query takes `delay` before answering.
    pub fn delay_status(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    pub fn delay_artifacts(&self, delay: Duration) {
        *self.artifact_delay.lock().unwrap() = delay;
    }

    /// Submissions of `range` take `delay` before the backend answers.
    pub fn delay_submission(&self, range: BlockRange, delay: Duration) {
        self.slow_submissions.lock().unwrap().push((range, delay));
    }

    pub fn reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<BlockRange> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn artifact_calls(&self) -> usize {
        self.artifact_calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(step) => {
                *self.last.lock().unwrap() = step.clone();
                step
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl ProverClient for ScriptedProver {
    async fn submit(&self, range: BlockRange, blocks: &[Block]) -> ProverResult<String> {
        if blocks.is_empty() {
            return Err(ProverError::EmptyBatch);
        }
        let delay = self
            .slow_submissions
            .lock()
            .unwrap()
            .iter()
            .find(|(slow, _)| *slow == range)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(ProverError::SubmitRejected {
                from: range.from(),
                to: range.to(),
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "backend overloaded".to_owned(),
            });
        }
        self.submitted.lock().unwrap().push(range);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("proof-{id}"))
    }

    async fn status(&self, job_id: &str) -> ProverResult<StatusSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let (status, state, error_message) = match self.next_step() {
            Step::State(state) => (
                client_common::prover::status_from_backend_state(state),
                state,
                None,
            ),
            Step::Fail(message) => (ProofStatus::Failed, "Failed", Some(message.to_owned())),
            Step::QueryError => {
                return Err(ProverError::StatusRejected {
                    job_id: job_id.to_owned(),
                    status: StatusCode::BAD_GATEWAY,
                    body: "upstream unavailable".to_owned(),
                });
            }
        };
        Ok(StatusSnapshot {
            job_id: job_id.to_owned(),
            status,
            backend_state: state.to_owned(),
            error_message,
            proof_size: None,
        })
    }

    async fn fetch_artifact(&self, job_id: &str, _kind: &ProofKind) -> ProverResult<Vec<u8>> {
        self.artifact_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.artifact_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.artifact_ok.load(Ordering::SeqCst) {
            Ok(vec![0xde, 0xad, 0xbe, 0xef])
        } else {
            Err(ProverError::EmptyArtifact {
                job_id: job_id.to_owned(),
            })
        }
    }

    async fn cancel(&self, _job_id: &str) -> ProverResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyCall {
    pub public_values: Vec<u8>,
    pub proof: Vec<u8>,
    pub program_commit: B256,
    pub vm_commit: B256,
}

/// Verifier that records every call and accepts unless told to revert.
#[derive(Default)]
pub struct RecordingVerifier {
    calls: Mutex<Vec<VerifyCall>>,
    reject: AtomicBool,
}

impl RecordingVerifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting() -> Arc<Self> {
        let verifier = Self::default();
        verifier.reject.store(true, Ordering::SeqCst);
        Arc::new(verifier)
    }

    pub fn calls(&self) -> Vec<VerifyCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementVerifier for RecordingVerifier {
    async fn verify(
        &self,
        public_values: &[u8],
        proof: &[u8],
        program_commit: B256,
        vm_commit: B256,
    ) -> ContractResult<()> {
        self.calls.lock().unwrap().push(VerifyCall {
            public_values: public_values.to_vec(),
            proof: proof.to_vec(),
            program_commit,
            vm_commit,
        });
        if self.reject.load(Ordering::SeqCst) {
            return Err(ContractError::Reverted {
                data: alloy::primitives::Bytes::from_static(b"\x09\xbd\xe3\x39"),
            });
        }
        Ok(())
    }
}
