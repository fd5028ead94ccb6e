use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rollup_prover::capacity::CapacityManager;
use rollup_prover::config::ProverConfig;
use rollup_prover::env::load_dotenvy_vars_if_present;
use rollup_prover::handler::{Clock, SystemClock};
use rollup_prover::prover::{Prover, ProverParts};
use rollup_prover::rpc::alloy_client::AlloyClient;
use rollup_prover::sender::TxSender;
use rollup_prover::server::{serve, ProverServer};
use rollup_prover::state::SharedState;
use rollup_prover::submitter::ProofSubmitter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use self::prover::*;
mod prover {
    pub mod cli;
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenvy_vars_if_present();
    rollup_prover::tracing::init();

    let args = cli::Cli::parse();
    let config = ProverConfig::try_from(args.prover_config).context("invalid configuration")?;
    info!(
        prover = %config.prover_address(),
        capacity = config.max_capacity,
        "Starting prover"
    );

    let cancel = CancellationToken::new();
    let client = Arc::new(AlloyClient::new(config.client.clone()));
    let state = Arc::new(SharedState::new());
    let capacity = Arc::new(CapacityManager::new(
        config.max_capacity,
        config.temp_capacity_ttl,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let producers = config
        .producers
        .build(client.clone(), config.signer.clone(), config.l2_protocol)
        .context("failed to set up proof producers")?;
    info!(tiers = ?producers.tiers(), "Proof producers ready");

    let sender = Arc::new(TxSender::new(
        client.clone(),
        config.sender.clone(),
        cancel.child_token(),
    ));
    let submitter = Arc::new(ProofSubmitter::new(
        client.clone(),
        sender,
        config.submitter.clone(),
    ));

    let mut prover = Prover::new(
        ProverParts {
            client: client.clone(),
            state: state.clone(),
            capacity: capacity.clone(),
            producers,
            submitter,
            clock: clock.clone(),
        },
        config.handler.clone(),
        config.options.clone(),
        cancel.child_token(),
    );
    prover.init().await?;

    let server = Arc::new(ProverServer::new(
        client,
        capacity,
        state,
        config.signer.clone(),
        clock,
        config.server.clone(),
    ));
    let server = tokio::spawn(serve(server, cancel.child_token()));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received ctrl-c, shutting down");
                    cancel.cancel();
                }
                Err(e) => error!("Failed to listen for ctrl-c: {e}"),
            }
        }
    });

    let result = prover.run().await;
    cancel.cancel();
    server.await.context("prover server panicked")??;
    result
}
