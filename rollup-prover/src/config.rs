use std::{convert::TryInto, path::PathBuf, time::Duration};

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result, anyhow};
use api_types::prover::ProofKind;
use client_common::prover::ProverConfig;
use reqwest::Url;
use serde::Deserialize;

use crate::jobs::{OrchestratorConfig, QueryErrorPolicy, SettlementOrder, TrackerConfig};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 2 * 60 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SINK_CAPACITY: usize = 10;
const DEFAULT_SETTLEMENT_START_HEIGHT: u64 = 1;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub prover: ProverConfig,
    pub orchestrator: OrchestratorConfig,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub rpc_urls: Vec<String>,
    pub verifier_address: Address,
    pub order: SettlementOrder,
    pub start_height: u64,
    pub program_commit: Option<B256>,
    pub vm_commit: Option<B256>,
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        Self::from_settings(EnvSettings::from_env()?)
    }

    /// Same as [`EngineConfig::load`] but reads `vars` instead of the process
    /// environment.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let settings = envy::from_iter::<_, EnvSettings>(vars)
            .context("failed to load rollup prover settings")?;
        Self::from_settings(settings)
    }

    fn from_settings(env: EnvSettings) -> Result<Self> {
        let base_url = Url::parse(env.prover_url.trim()).context("invalid PROVER_URL")?;
        let proof_kind: ProofKind = env
            .prover_proof_type
            .parse()
            .map_err(|err: String| anyhow!(err))
            .context("invalid PROVER_PROOF_TYPE")?;
        let query_error_policy: QueryErrorPolicy = env
            .prover_query_error_policy
            .parse()
            .map_err(|err: String| anyhow!(err))
            .context("invalid PROVER_QUERY_ERROR_POLICY")?;

        let mut prover = ProverConfig::new(base_url, env.prover_api_key);
        prover.program_id = env.prover_program_id.filter(|id| !id.trim().is_empty());
        prover.program_path = env
            .prover_program_path
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        prover.vm_config_id = env.prover_vm_config_id.filter(|id| !id.trim().is_empty());
        prover.poll_interval = Duration::from_secs(env.prover_poll_interval_secs);
        prover.poll_timeout = Duration::from_secs(env.prover_poll_timeout_secs);
        prover.proof_kind = proof_kind.clone();
        prover.request_timeout = Duration::from_secs(env.prover_request_timeout_secs);
        prover
            .ensure_valid()
            .context("invalid prover configuration")?;

        let orchestrator = OrchestratorConfig {
            batch_size: env.batch_size,
            sink_capacity: env.sink_capacity,
            tracker: TrackerConfig {
                poll_interval: prover.poll_interval,
                poll_timeout: prover.poll_timeout,
                proof_kind,
                query_error_policy,
            },
        };
        orchestrator
            .ensure_valid()
            .context("invalid orchestrator configuration")?;

        let settlement = SettlementConfig::new(
            &env.settlement_rpc_url,
            &env.settlement_verifier_address,
            &env.settlement_order,
            env.settlement_start_height,
            env.program_commit.as_deref(),
            env.vm_commit.as_deref(),
            env.batch_size,
        )
        .context("invalid settlement configuration")?;

        Ok(Self {
            prover,
            orchestrator,
            settlement,
        })
    }
}

impl SettlementConfig {
    fn new(
        rpc_urls: &str,
        verifier_address: &str,
        order: &str,
        start_height: u64,
        program_commit: Option<&str>,
        vm_commit: Option<&str>,
        batch_size: u64,
    ) -> Result<Self> {
        let rpc_urls: Vec<String> = rpc_urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
            .collect();
        if rpc_urls.is_empty() {
            return Err(anyhow!("SETTLEMENT_RPC_URL must list at least one url"));
        }
        let verifier_address: Address = verifier_address
            .trim()
            .parse()
            .context("invalid SETTLEMENT_VERIFIER_ADDRESS")?;
        let order: SettlementOrder = order
            .parse()
            .map_err(|err: String| anyhow!(err))
            .context("invalid SETTLEMENT_ORDER")?;
        if start_height == 0 {
            return Err(anyhow!("SETTLEMENT_START_HEIGHT must be positive"));
        }
        if order == SettlementOrder::Sequential
            && batch_size > 0
            && (start_height - 1) % batch_size != 0
        {
            return Err(anyhow!(
                "SETTLEMENT_START_HEIGHT {start_height} is not the first block of a batch of {batch_size}"
            ));
        }
        let program_commit = program_commit
            .filter(|value| !value.trim().is_empty())
            .map(parse_hex_b256)
            .transpose()
            .context("invalid PROGRAM_COMMIT")?;
        let vm_commit = vm_commit
            .filter(|value| !value.trim().is_empty())
            .map(parse_hex_b256)
            .transpose()
            .context("invalid VM_COMMIT")?;

        Ok(Self {
            rpc_urls,
            verifier_address,
            order,
            start_height,
            program_commit,
            vm_commit,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EnvSettings {
    prover_url: String,
    prover_api_key: String,
    #[serde(default)]
    prover_program_path: Option<String>,
    #[serde(default)]
    prover_program_id: Option<String>,
    #[serde(default)]
    prover_vm_config_id: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    prover_poll_interval_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    prover_poll_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    prover_request_timeout_secs: u64,
    #[serde(default = "default_proof_type")]
    prover_proof_type: String,
    #[serde(default = "default_query_error_policy")]
    prover_query_error_policy: String,
    batch_size: u64,
    #[serde(default = "default_sink_capacity")]
    sink_capacity: usize,
    settlement_rpc_url: String,
    settlement_verifier_address: String,
    #[serde(default = "default_settlement_order")]
    settlement_order: String,
    #[serde(default = "default_settlement_start_height")]
    settlement_start_height: u64,
    #[serde(default)]
    program_commit: Option<String>,
    #[serde(default)]
    vm_commit: Option<String>,
}

impl EnvSettings {
    fn from_env() -> Result<Self> {
        envy::from_env::<Self>().context("failed to load rollup prover environment settings")
    }
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_proof_type() -> String {
    ProofKind::Stark.to_string()
}

fn default_query_error_policy() -> String {
    QueryErrorPolicy::FailFast.to_string()
}

fn default_sink_capacity() -> usize {
    DEFAULT_SINK_CAPACITY
}

fn default_settlement_order() -> String {
    SettlementOrder::Independent.to_string()
}

fn default_settlement_start_height() -> u64 {
    DEFAULT_SETTLEMENT_START_HEIGHT
}

fn parse_hex_b256(value: &str) -> Result<B256> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(anyhow!("hex string must not be empty"));
    }
    let hex = normalized.strip_prefix("0x").unwrap_or(normalized);
    if hex.len() != 64 {
        return Err(anyhow!(
            "hex string must be 32 bytes (64 hex characters), got {}",
            hex.len()
        ));
    }
    let bytes = hex::decode(hex).context("failed to decode hex string into bytes")?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("hex string must decode to exactly 32 bytes"))?;
    Ok(B256::from(arr))
}
