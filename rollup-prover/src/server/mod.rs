use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    App, HttpResponse, HttpServer, Responder,
    error::{
        ErrorBadRequest, ErrorConflict, ErrorInternalServerError, ErrorNotFound,
        ErrorServiceUnavailable,
    },
    web::{self, Data, Json, Path},
};
use anyhow::{Context, Result};
use api_types::hook::{
    ActiveJobResponse, CancelJobResponse, FinalizedBlocksRequest, FinalizedBlocksResponse,
    ReplayRequest, SubmittedBatch,
};
use client_common::prover::BlockRange;
use log::debug;

use crate::{
    errors::EngineError,
    host::BlockBuffer,
    jobs::{Orchestrator, SubmittedJob},
};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    blocks: Arc<BlockBuffer>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, blocks: Arc<BlockBuffer>) -> Self {
        Self {
            orchestrator,
            blocks,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(health))
        .route("/blocks", web::post().to(finalized_blocks))
        .route("/jobs", web::get().to(active_jobs))
        .route("/jobs/{job_id}/cancel", web::post().to(cancel_job))
        .route("/replay", web::post().to(replay));
}

pub async fn run_http_server(bind_addr: &str, state: AppState) -> Result<()> {
    let shared_state = Data::new(state);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(shared_state.clone())
            .configure(configure)
    })
    .bind(bind_addr)
    .with_context(|| format!("failed to bind HTTP server to {bind_addr}"))?
    .run()
    .await
    .context("HTTP server terminated unexpectedly")?;

    Ok(())
}

async fn health() -> impl Responder {
    HttpResponse::Ok().finish()
}

fn submitted_batch(job: &SubmittedJob) -> SubmittedBatch {
    SubmittedBatch {
        job_id: job.job_id.clone(),
        from_height: job.range.from(),
        to_height: job.range.to(),
    }
}

async fn finalized_blocks(
    state: Data<AppState>,
    request: Json<FinalizedBlocksRequest>,
) -> actix_web::Result<Json<FinalizedBlocksResponse>> {
    let mut blocks = request.into_inner().blocks;
    blocks.sort_by_key(|block| block.height);

    let accepted = blocks.len();
    let mut submitted = Vec::new();
    for block in blocks {
        let height = block.height;
        state.blocks.insert(block);
        // submission failures are logged by the orchestrator and left for replay
        if let Ok(Some(job)) = state.orchestrator.on_block_finalized(height).await {
            let pruned = state.blocks.prune_through(job.range.to());
            debug!("pruned {pruned} buffered block(s) through height {}", job.range.to());
            submitted.push(submitted_batch(&job));
        }
    }

    Ok(Json(FinalizedBlocksResponse {
        accepted,
        submitted,
    }))
}

async fn active_jobs(state: Data<AppState>) -> Json<Vec<ActiveJobResponse>> {
    let jobs = state
        .orchestrator
        .active_jobs()
        .into_iter()
        .map(|job| ActiveJobResponse {
            job_id: job.job_id,
            from_height: job.range.from(),
            to_height: job.range.to(),
            elapsed_secs: job.elapsed.as_secs(),
        })
        .collect();
    Json(jobs)
}

async fn cancel_job(
    state: Data<AppState>,
    path: Path<String>,
) -> actix_web::Result<Json<CancelJobResponse>> {
    let job_id = path.into_inner();
    if !state.orchestrator.cancel(&job_id) {
        return Err(ErrorNotFound(format!("proof job {job_id} is not in flight")));
    }
    Ok(Json(CancelJobResponse {
        job_id,
        cancelled: true,
    }))
}

async fn replay(
    state: Data<AppState>,
    request: Json<ReplayRequest>,
) -> actix_web::Result<Json<SubmittedBatch>> {
    let ReplayRequest {
        from_height,
        to_height,
    } = request.into_inner();
    let range = BlockRange::new(from_height, to_height).ok_or_else(|| {
        ErrorBadRequest(format!(
            "from_height {from_height} must not exceed to_height {to_height}"
        ))
    })?;

    match state.orchestrator.replay(range).await {
        Ok(job) => Ok(Json(submitted_batch(&job))),
        Err(
            err @ (EngineError::UnalignedRange { .. }
            | EngineError::BlockFetch { .. }
            | EngineError::MalformedBatch { .. }),
        ) => Err(ErrorBadRequest(err.to_string())),
        Err(err @ EngineError::SubmissionInProgress { .. }) => Err(ErrorConflict(err.to_string())),
        Err(EngineError::ShuttingDown) => Err(ErrorServiceUnavailable("shutting down")),
        Err(_) => Err(ErrorInternalServerError("failed to replay batch")),
    }
}
