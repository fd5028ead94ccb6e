use clap::Parser;
use rollup_prover::config::CliProverConfig;

/// Rollup prover node
#[derive(Parser)]
#[command(version = rollup_prover::version(), propagate_version = true)]
pub(crate) struct Cli {
    #[clap(flatten)]
    pub(crate) prover_config: CliProverConfig,
}
