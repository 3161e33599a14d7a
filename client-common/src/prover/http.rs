use std::{path::PathBuf, time::Duration};

use api_types::{
    prover::{ProgramUploadResponse, ProofCreateResponse, ProofKind, ProofStatusResponse},
    rollup::Block,
};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::{
    Client, Response, Url,
    multipart::{Form, Part},
};

use super::{
    BlockRange, ProverClient, ProverError, ProverResult, StatusSnapshot, encode_batch_input,
    status_from_backend_state,
};

pub const API_KEY_HEADER: &str = "Axiom-API-Key";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 2 * 60 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ProverConfig {
    pub base_url: Url,
    pub api_key: String,
    /// Already registered program; skips the upload at construction.
    pub program_id: Option<String>,
    pub program_path: Option<PathBuf>,
    pub vm_config_id: Option<String>,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub proof_kind: ProofKind,
    pub request_timeout: Duration,
}

impl ProverConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            program_id: None,
            program_path: None,
            vm_config_id: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            proof_kind: ProofKind::Stark,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn ensure_valid(&self) -> ProverResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(ProverError::Config("prover API key is required".to_owned()));
        }
        let has_program_id = self
            .program_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if !has_program_id && self.program_path.is_none() {
            return Err(ProverError::Config(
                "program_path is required when program_id is not provided".to_owned(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ProverError::Config(
                "poll interval must be greater than zero".to_owned(),
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(ProverError::Config(
                "poll timeout must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

pub struct HttpProverClient {
    client: Client,
    base_url: Url,
    api_key: String,
    program_id: String,
    proof_kind: ProofKind,
}

impl HttpProverClient {
    /// Builds the client, registering the program first when no program id is
    /// configured. Registration happens exactly once per client.
    pub async fn connect(config: ProverConfig) -> ProverResult<Self> {
        config.ensure_valid()?;

        let mut normalized = config.base_url.clone();
        if !normalized.path().ends_with('/') {
            let mut path = normalized.path().trim_end_matches('/').to_owned();
            path.push('/');
            normalized.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProverError::ClientBuild)?;

        let mut prover = Self {
            client,
            base_url: normalized,
            api_key: config.api_key.clone(),
            program_id: String::new(),
            proof_kind: config.proof_kind.clone(),
        };

        match config.program_id.filter(|id| !id.trim().is_empty()) {
            Some(program_id) => prover.program_id = program_id,
            None => {
                let path = config.program_path.ok_or_else(|| {
                    ProverError::Config(
                        "program_path is required when program_id is not provided".to_owned(),
                    )
                })?;
                let program_id = prover
                    .register_program(path, config.vm_config_id.as_deref())
                    .await?;
                info!("registered proving program {program_id}");
                prover.program_id = program_id;
            }
        }

        Ok(prover)
    }

    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    fn endpoint(&self, path: &str) -> ProverResult<Url> {
        self.base_url
            .join(path)
            .map_err(|source| ProverError::InvalidEndpoint {
                path: path.to_string(),
                source,
            })
    }

    async fn register_program(
        &self,
        path: PathBuf,
        vm_config_id: Option<&str>,
    ) -> ProverResult<String> {
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ProverError::ProgramNotFound { path });
        }
        let program = tokio::fs::read(&path)
            .await
            .map_err(|source| ProverError::ProgramRead {
                path: path.clone(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_owned());

        let mut form = Form::new().part("program", Part::bytes(program).file_name(file_name));
        if let Some(vm_config_id) = vm_config_id.filter(|id| !id.is_empty()) {
            form = form.text("vm_config_id", vm_config_id.to_owned());
        }

        let response = self
            .client
            .post(self.endpoint("v1/programs")?)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ProverError::RegisterRequest)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = read_body(response).await;
            return Err(ProverError::RegisterRejected { status, body });
        }

        let upload: ProgramUploadResponse = response
            .json()
            .await
            .map_err(ProverError::RegisterDecode)?;
        Ok(upload.id)
    }
}

#[async_trait]
impl ProverClient for HttpProverClient {
    async fn submit(&self, range: BlockRange, blocks: &[Block]) -> ProverResult<String> {
        let input = encode_batch_input(range, blocks)?;
        let proof_type = self.proof_kind.to_string();

        let response = self
            .client
            .post(self.endpoint("v1/proofs")?)
            .query(&[
                ("program_id", self.program_id.as_str()),
                ("proof_type", proof_type.as_str()),
            ])
            .header(API_KEY_HEADER, &self.api_key)
            .json(&input)
            .send()
            .await
            .map_err(|source| ProverError::SubmitRequest {
                from: range.from(),
                to: range.to(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = read_body(response).await;
            return Err(ProverError::SubmitRejected {
                from: range.from(),
                to: range.to(),
                status,
                body,
            });
        }

        let created: ProofCreateResponse =
            response.json().await.map_err(ProverError::SubmitDecode)?;
        Ok(created.id)
    }

    async fn status(&self, job_id: &str) -> ProverResult<StatusSnapshot> {
        let response = self
            .client
            .get(self.endpoint(&format!("v1/proofs/{job_id}"))?)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|source| ProverError::StatusRequest {
                job_id: job_id.to_owned(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = read_body(response).await;
            return Err(ProverError::StatusRejected {
                job_id: job_id.to_owned(),
                status,
                body,
            });
        }

        let document: ProofStatusResponse =
            response
                .json()
                .await
                .map_err(|source| ProverError::StatusDecode {
                    job_id: job_id.to_owned(),
                    source,
                })?;

        Ok(StatusSnapshot {
            job_id: job_id.to_owned(),
            status: status_from_backend_state(&document.state),
            backend_state: document.state,
            error_message: document.error_message,
            proof_size: document.proof_size,
        })
    }

    async fn fetch_artifact(&self, job_id: &str, kind: &ProofKind) -> ProverResult<Vec<u8>> {
        let response = self
            .client
            .get(self.endpoint(&format!("v1/proofs/{job_id}/proof/{kind}"))?)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|source| ProverError::ArtifactRequest {
                job_id: job_id.to_owned(),
                kind: kind.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ProverError::ArtifactRejected {
                job_id: job_id.to_owned(),
                status: response.status(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ProverError::ArtifactRequest {
                job_id: job_id.to_owned(),
                kind: kind.to_string(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(ProverError::EmptyArtifact {
                job_id: job_id.to_owned(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn cancel(&self, job_id: &str) -> ProverResult<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("v1/proofs/{job_id}"))?)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|source| ProverError::CancelRequest {
                job_id: job_id.to_owned(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = read_body(response).await;
            warn!(
                "backend did not cancel proof job {job_id} ({status}: {body}); marking it failed locally"
            );
        }
        Ok(())
    }
}

async fn read_body(response: Response) -> String {
    response.text().await.unwrap_or_default()
}
