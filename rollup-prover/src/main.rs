use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_common::{
    contracts::{utils::provider_for_urls, verifier::VerifierContract},
    prover::HttpProverClient,
};
use log::{info, warn};
use rollup_prover::{
    config::EngineConfig,
    host::BlockBuffer,
    jobs::{CommitmentResolver, OrchestratorBuilder, SettlementForwarder, SettlementStats},
    server::{self, AppState},
};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "rollup-prover",
    about = "Submits rollup block batches for proving and settles the proofs"
)]
struct Cli {
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    listen_addr: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = EngineConfig::load().context("failed to load configuration")?;

    let prover = HttpProverClient::connect(config.prover.clone())
        .await
        .context("failed to initialise prover client")?;
    info!("using proving program {}", prover.program_id());

    let provider = provider_for_urls(&config.settlement.rpc_urls)
        .context("failed to build settlement chain provider")?;
    let verifier = VerifierContract::new(provider, config.settlement.verifier_address);
    info!("settling proofs through verifier {}", verifier.address());

    let shutdown = CancellationToken::new();
    let blocks = Arc::new(BlockBuffer::new());
    let (orchestrator, results) =
        OrchestratorBuilder::new(config.orchestrator.clone(), Arc::new(prover), blocks.clone())
            .with_shutdown(shutdown.clone())
            .into_orchestrator()
            .context("failed to construct orchestrator")?;
    let orchestrator = Arc::new(orchestrator);

    let forwarder = SettlementForwarder::new(
        Arc::new(verifier),
        CommitmentResolver::new(
            config.settlement.program_commit,
            config.settlement.vm_commit,
        ),
    )
    .with_order(config.settlement.order, config.settlement.start_height);
    let forwarder_handle = tokio::spawn(forwarder.run(results, shutdown.clone()));

    info!(
        "starting rollup prover on {} (batch size {}, settlement order {})",
        cli.listen_addr, config.orchestrator.batch_size, config.settlement.order
    );
    let server_future = server::run_http_server(
        &cli.listen_addr,
        AppState::new(orchestrator.clone(), blocks),
    );

    let outcome = tokio::select! {
        res = server_future => res,
        res = forwarder_handle => handle_forwarder_exit(res),
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c");
            Ok(())
        }
    };

    orchestrator.shutdown();
    outcome
}

fn handle_forwarder_exit(result: std::result::Result<SettlementStats, JoinError>) -> Result<()> {
    let stats = result.context("settlement forwarder panicked")?;
    warn!(
        "settlement forwarder terminated after {} verified proof(s); shutting down",
        stats.verified
    );
    Ok(())
}
