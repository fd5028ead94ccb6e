//! Command line configuration of the prover node.
//!
//! [`CliProverConfig`] is the raw clap view, every flag can also be given
//! through a `PROVER_*` environment variable (or a `.env` file). It is
//! validated into a [`ProverConfig`], which hands out the configuration of
//! every component.

use std::num::{NonZeroUsize, ParseIntError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use clap::{Args, ValueEnum};
use rollup_common::tiers;
use thiserror::Error;
use url::Url;

use crate::anchor::AnchorTxValidator;
use crate::backoff::BackoffPolicy;
use crate::handler::HandlerConfig;
use crate::producer::signed::EvidenceSigner;
use crate::producer::{
    DummyProducer, GuardianMode, GuardianProducer, OptimisticProducer, OracleProducer,
    ProducerError, ProofProducer, SgxAndZkvmProducer, SgxConfig, SgxProducer, ZkvmConfig,
    ZkvmProducer,
};
use crate::prover::{ProducerSet, ProverOptions};
use crate::rpc::alloy_client::AlloyClientConfig;
use crate::rpc::L2Client;
use crate::sender::TxSenderConfig;
use crate::server::ServerConfig;
use crate::submitter::SubmitterConfig;

const ENDPOINT_HELP_HEADING: &str = "Endpoint options";
const PROTOCOL_HELP_HEADING: &str = "Protocol options";
const MODE_HELP_HEADING: &str = "Prover mode options";
const CAPACITY_HELP_HEADING: &str = "Capacity options";
const TIMING_HELP_HEADING: &str = "Timing options";
const SERVER_HELP_HEADING: &str = "Server options";

/// Number of L1 and L2 headers kept in memory by the chain client.
const HEADER_CACHE_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("private key belongs to {actual}, expected {expected}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("{0} endpoint is empty")]
    EmptyEndpoint(&'static str),

    #[error("max concurrent proving jobs must be greater than zero")]
    ZeroCapacity,

    #[error("{0} and {1} can not be enabled together")]
    ConflictingModes(&'static str, &'static str),

    #[error("graffiti is longer than 32 bytes")]
    GraffitiTooLong,

    #[error(transparent)]
    Producer(#[from] ProducerError),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CliGuardianMode {
    /// Prove at the guardian tier.
    Guardian,
    /// Prove at the minority guardian tier.
    Minority,
}

impl From<CliGuardianMode> for GuardianMode {
    fn from(mode: CliGuardianMode) -> Self {
        match mode {
            CliGuardianMode::Guardian => GuardianMode::Guardian,
            CliGuardianMode::Minority => GuardianMode::Minority,
        }
    }
}

fn parse_secs(s: &str) -> Result<Duration, ParseIntError> {
    Ok(Duration::from_secs(s.parse()?))
}

#[derive(Args, Clone, Debug)]
pub struct CliProverConfig {
    /// HTTP RPC endpoint of the L1 node.
    #[arg(long, env = "PROVER_L1_ENDPOINT", help_heading = ENDPOINT_HELP_HEADING)]
    pub l1_endpoint: Url,
    /// HTTP RPC endpoint of the L2 execution engine.
    #[arg(long, env = "PROVER_L2_ENDPOINT", help_heading = ENDPOINT_HELP_HEADING)]
    pub l2_endpoint: Url,
    /// L1 beacon endpoint, forwarded to the SGX proving service.
    #[arg(long, env = "PROVER_L1_BEACON_ENDPOINT", help_heading = ENDPOINT_HELP_HEADING)]
    pub l1_beacon_endpoint: Option<Url>,
    /// SGX proving service.
    #[arg(long, env = "PROVER_SGX_ENDPOINT", help_heading = ENDPOINT_HELP_HEADING)]
    pub sgx_endpoint: Option<Url>,
    /// ZK proving daemon.
    #[arg(long, env = "PROVER_ZKVM_ENDPOINT", help_heading = ENDPOINT_HELP_HEADING)]
    pub zkvm_endpoint: Option<Url>,

    /// Address of the L1 protocol contract.
    #[arg(long, env = "PROVER_L1_PROTOCOL", help_heading = PROTOCOL_HELP_HEADING)]
    pub l1_protocol: Address,
    /// Address of the L2 protocol contract, target of every anchor transaction.
    #[arg(long, env = "PROVER_L2_PROTOCOL", help_heading = PROTOCOL_HELP_HEADING)]
    pub l2_protocol: Address,
    #[arg(long, env = "PROVER_L1_SIGNAL_SERVICE", help_heading = PROTOCOL_HELP_HEADING)]
    pub l1_signal_service: Address,
    #[arg(long, env = "PROVER_L2_SIGNAL_SERVICE", help_heading = PROTOCOL_HELP_HEADING)]
    pub l2_signal_service: Address,
    #[arg(long, env = "PROVER_TIER_PROVIDER", help_heading = PROTOCOL_HELP_HEADING)]
    pub tier_provider: Address,
    #[arg(long, env = "PROVER_BOND_TOKEN", help_heading = PROTOCOL_HELP_HEADING)]
    pub bond_token: Address,
    /// Hex encoded private key proofs are submitted and signed with.
    #[arg(long, env = "PROVER_PRIVATE_KEY", help_heading = PROTOCOL_HELP_HEADING, hide_env_values = true)]
    pub private_key: String,
    /// Fail at startup unless the private key belongs to this address.
    #[arg(long, env = "PROVER_EXPECTED_ADDRESS", help_heading = PROTOCOL_HELP_HEADING)]
    pub expected_address: Option<Address>,
    /// Free form tag attached to every submitted transition, at most 32 bytes.
    #[arg(long, env = "PROVER_GRAFFITI", help_heading = PROTOCOL_HELP_HEADING, default_value = "")]
    pub graffiti: String,
    /// L1 height to start scanning events from.
    #[arg(long, env = "PROVER_START_HEIGHT", help_heading = PROTOCOL_HELP_HEADING)]
    pub start_height: Option<u64>,

    /// Submit higher tier proofs over transitions this prover disagrees with.
    #[arg(long, env = "PROVER_CONTESTER_MODE", help_heading = MODE_HELP_HEADING, default_value_t = false)]
    pub contester_mode: bool,
    /// Prove blocks assigned to other provers once their window expired.
    #[arg(long, env = "PROVER_PROVE_UNASSIGNED_BLOCKS", help_heading = MODE_HELP_HEADING, default_value_t = false)]
    pub prove_unassigned_blocks: bool,
    /// Run as a guardian prover.
    #[arg(long, env = "PROVER_GUARDIAN", help_heading = MODE_HELP_HEADING, value_enum)]
    pub guardian: Option<CliGuardianMode>,
    /// Guardians only claim back the liveness bond.
    #[arg(long, env = "PROVER_RETURN_LIVENESS_BOND", help_heading = MODE_HELP_HEADING, default_value_t = false)]
    pub return_liveness_bond: bool,
    /// Run as the oracle prover.
    #[arg(long, env = "PROVER_ORACLE", help_heading = MODE_HELP_HEADING, default_value_t = false)]
    pub oracle: bool,
    /// Answer every proof request with dummy proofs, for local testing.
    #[arg(long, env = "PROVER_DUMMY", help_heading = MODE_HELP_HEADING, default_value_t = false)]
    pub dummy: bool,
    #[arg(long, env = "PROVER_SGX_INSTANCE_ID", help_heading = MODE_HELP_HEADING, default_value_t = 0)]
    pub sgx_instance_id: u64,
    /// Circuit parameters the ZK proving daemon loads.
    #[arg(long, env = "PROVER_ZKVM_PARAM", help_heading = MODE_HELP_HEADING, default_value = "kzg_bn254_22.srs")]
    pub zkvm_param: String,

    /// Number of blocks proven at the same time. Must be greater than zero.
    #[arg(long, env = "PROVER_MAX_CONCURRENT_PROVING_JOBS", help_heading = CAPACITY_HELP_HEADING, default_value_t = 1)]
    pub max_concurrent_proving_jobs: u64,
    /// Lifetime of a capacity reservation taken while bidding, in seconds.
    #[arg(long, env = "PROVER_TEMP_CAPACITY_EXPIRES_AT", help_heading = CAPACITY_HELP_HEADING, value_parser = parse_secs, default_value = "600")]
    pub temp_capacity_expires_at: Duration,

    /// Delay between two retries of a failed operation, in seconds.
    #[arg(long, env = "PROVER_BACKOFF_RETRY_INTERVAL", help_heading = TIMING_HELP_HEADING, value_parser = parse_secs, default_value = "12")]
    pub backoff_retry_interval: Duration,
    /// Retries of a failed operation before giving up.
    #[arg(long, env = "PROVER_BACKOFF_MAX_RETRIES", help_heading = TIMING_HELP_HEADING, default_value_t = 10)]
    pub backoff_max_retries: u64,
    /// Interval between two polls of the L1 protocol events, in seconds.
    #[arg(long, env = "PROVER_EVENT_POLL_INTERVAL", help_heading = TIMING_HELP_HEADING, value_parser = parse_secs, default_value = "12")]
    pub event_poll_interval: Duration,
    /// Interval between two checks of whether the L2 engine inserted a block, in seconds.
    #[arg(long, env = "PROVER_L1_ORIGIN_POLL_INTERVAL", help_heading = TIMING_HELP_HEADING, value_parser = parse_secs, default_value = "3")]
    pub l1_origin_poll_interval: Duration,
    /// Timeout of a single request to a proving service, in seconds.
    #[arg(long, env = "PROVER_PROOF_REQUEST_TIMEOUT", help_heading = TIMING_HELP_HEADING, value_parser = parse_secs, default_value = "60")]
    pub proof_request_timeout: Duration,
    /// Interval between two polls of a pending proof, in seconds.
    #[arg(long, env = "PROVER_PROOF_POLL_INTERVAL", help_heading = TIMING_HELP_HEADING, value_parser = parse_secs, default_value = "10")]
    pub proof_poll_interval: Duration,
    /// Polls of a pending proof before the request is retried from scratch.
    #[arg(long, env = "PROVER_PROOF_MAX_POLLS", help_heading = TIMING_HELP_HEADING)]
    pub proof_max_polls: Option<u64>,
    /// How long to wait for a proof transaction receipt, in seconds.
    #[arg(long, env = "PROVER_WAIT_RECEIPT_TIMEOUT", help_heading = TIMING_HELP_HEADING, value_parser = parse_secs, default_value = "60")]
    pub wait_receipt_timeout: Duration,

    #[arg(long, env = "PROVER_SERVER_PORT", help_heading = SERVER_HELP_HEADING, default_value_t = 9876)]
    pub server_port: u16,
    /// Lowest fee accepted for an optimistic tier assignment, in wei.
    #[arg(long, env = "PROVER_MIN_OPTIMISTIC_TIER_FEE", help_heading = SERVER_HELP_HEADING, default_value_t = 0)]
    pub min_optimistic_tier_fee: u128,
    #[arg(long, env = "PROVER_MIN_SGX_TIER_FEE", help_heading = SERVER_HELP_HEADING, default_value_t = 0)]
    pub min_sgx_tier_fee: u128,
    #[arg(long, env = "PROVER_MIN_SGX_AND_ZKVM_TIER_FEE", help_heading = SERVER_HELP_HEADING, default_value_t = 0)]
    pub min_sgx_and_zkvm_tier_fee: u128,
    /// Furthest assignment expiry accepted, in seconds from now.
    #[arg(long, env = "PROVER_MAX_EXPIRY", help_heading = SERVER_HELP_HEADING, value_parser = parse_secs, default_value = "3600")]
    pub max_expiry: Duration,
    /// Number of blocks past the current one an assignment stays valid for.
    #[arg(long, env = "PROVER_MAX_SLIPPAGE", help_heading = SERVER_HELP_HEADING, default_value_t = 64)]
    pub max_slippage: u64,
    /// Number of L1 blocks past the head an assignment must be used within.
    #[arg(long, env = "PROVER_MAX_PROPOSED_IN", help_heading = SERVER_HELP_HEADING, default_value_t = 32)]
    pub max_proposed_in: u64,
}

/// What kind of producers the prover runs with.
#[derive(Clone, Debug)]
pub enum ProducerConfig {
    Guardian {
        mode: GuardianMode,
        return_liveness_bond: bool,
    },
    Oracle,
    /// Optimistic proofs, plus SGX and SGX+ZK when their services are set.
    Standard {
        dummy: bool,
        sgx: Option<SgxConfig>,
        zkvm: Option<ZkvmConfig>,
    },
}

impl ProducerConfig {
    pub fn guardian_tier(&self) -> Option<u16> {
        match self {
            ProducerConfig::Guardian { mode, .. } => Some(mode.tier()),
            _ => None,
        }
    }

    /// Instantiates the producers. Signature based tiers sign with `signer`
    /// after checking the anchor transaction of the proven block.
    pub fn build<C: L2Client + 'static>(
        &self,
        client: Arc<C>,
        signer: PrivateKeySigner,
        l2_protocol: Address,
    ) -> Result<ProducerSet, ConfigError> {
        let evidence_signer =
            || EvidenceSigner::new(client.clone(), AnchorTxValidator::new(l2_protocol), signer.clone());

        let producers: Vec<Arc<dyn ProofProducer>> = match self {
            ProducerConfig::Guardian {
                mode,
                return_liveness_bond,
            } => vec![Arc::new(GuardianProducer::new(
                evidence_signer(),
                *mode,
                *return_liveness_bond,
            ))],
            ProducerConfig::Oracle => vec![Arc::new(OracleProducer::new(evidence_signer()))],
            ProducerConfig::Standard { dummy, sgx, zkvm } => {
                let mut producers: Vec<Arc<dyn ProofProducer>> =
                    vec![Arc::new(OptimisticProducer::default())];
                match (sgx, zkvm) {
                    (Some(sgx), zkvm) => {
                        producers.push(Arc::new(SgxProducer::new(sgx.clone())?));
                        if let Some(zkvm) = zkvm {
                            producers.push(Arc::new(SgxAndZkvmProducer::new(
                                Box::new(SgxProducer::new(sgx.clone())?),
                                Box::new(ZkvmProducer::new(zkvm.clone())?),
                            )));
                        }
                    }
                    (None, _) if *dummy => {
                        producers.push(Arc::new(DummyProducer::new(tiers::SGX)));
                        producers.push(Arc::new(DummyProducer::new(tiers::SGX_AND_ZKVM)));
                    }
                    (None, _) => {}
                }
                producers
            }
        };

        Ok(ProducerSet::new(producers))
    }
}

/// Validated configuration of the whole node.
#[derive(Clone, Debug)]
pub struct ProverConfig {
    pub signer: PrivateKeySigner,
    pub client: AlloyClientConfig,
    pub producers: ProducerConfig,
    pub handler: HandlerConfig,
    pub submitter: SubmitterConfig,
    pub sender: TxSenderConfig,
    pub options: ProverOptions,
    pub server: ServerConfig,
    pub l2_protocol: Address,
    pub max_capacity: u64,
    pub temp_capacity_ttl: Duration,
}

impl ProverConfig {
    pub fn prover_address(&self) -> Address {
        self.signer.address()
    }
}

/// Right pads `graffiti` with zeroes.
fn graffiti_bytes(graffiti: &str) -> Result<B256, ConfigError> {
    let bytes = graffiti.as_bytes();
    if bytes.len() > 32 {
        return Err(ConfigError::GraffitiTooLong);
    }
    let mut out = B256::ZERO;
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn non_empty(url: &Url, name: &'static str) -> Result<(), ConfigError> {
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::EmptyEndpoint(name)),
    }
}

impl TryFrom<CliProverConfig> for ProverConfig {
    type Error = ConfigError;

    fn try_from(cli: CliProverConfig) -> Result<Self, Self::Error> {
        non_empty(&cli.l1_endpoint, "L1")?;
        non_empty(&cli.l2_endpoint, "L2")?;

        let signer = PrivateKeySigner::from_str(cli.private_key.trim())
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;
        let prover_address = signer.address();
        if let Some(expected) = cli.expected_address {
            if expected != prover_address {
                return Err(ConfigError::AddressMismatch {
                    expected,
                    actual: prover_address,
                });
            }
        }

        if cli.max_concurrent_proving_jobs == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if cli.guardian.is_some() && cli.oracle {
            return Err(ConfigError::ConflictingModes("--guardian", "--oracle"));
        }
        if cli.return_liveness_bond && cli.guardian.is_none() {
            return Err(ConfigError::ConflictingModes(
                "--return-liveness-bond",
                "a non guardian prover",
            ));
        }

        let graffiti = graffiti_bytes(&cli.graffiti)?;
        let backoff = BackoffPolicy::constant(cli.backoff_retry_interval)
            .with_max_retries(Some(cli.backoff_max_retries));

        let producers = match (cli.guardian, cli.oracle) {
            (Some(mode), _) => ProducerConfig::Guardian {
                mode: mode.into(),
                return_liveness_bond: cli.return_liveness_bond,
            },
            (None, true) => ProducerConfig::Oracle,
            (None, false) => {
                let sgx = cli.sgx_endpoint.clone().map(|endpoint| SgxConfig {
                    endpoint,
                    l1_rpc: cli.l1_endpoint.to_string(),
                    l2_rpc: cli.l2_endpoint.to_string(),
                    l1_beacon_rpc: cli
                        .l1_beacon_endpoint
                        .as_ref()
                        .map(Url::to_string)
                        .unwrap_or_default(),
                    instance_id: cli.sgx_instance_id,
                    request_timeout: cli.proof_request_timeout,
                    poll_interval: cli.proof_poll_interval,
                    max_polls: cli.proof_max_polls,
                    dummy: cli.dummy,
                });
                let zkvm = cli.zkvm_endpoint.clone().map(|endpoint| ZkvmConfig {
                    endpoint,
                    l2_rpc: cli.l2_endpoint.to_string(),
                    param: cli.zkvm_param.clone(),
                    request_timeout: cli.proof_request_timeout,
                    poll_interval: cli.proof_poll_interval,
                    max_polls: cli.proof_max_polls,
                    dummy: cli.dummy,
                });
                ProducerConfig::Standard {
                    dummy: cli.dummy,
                    sgx,
                    zkvm,
                }
            }
        };
        let guardian_tier = producers.guardian_tier();

        Ok(Self {
            client: AlloyClientConfig {
                l1_endpoint: cli.l1_endpoint,
                l2_endpoint: cli.l2_endpoint,
                l1_protocol: cli.l1_protocol,
                tier_provider: cli.tier_provider,
                bond_token: cli.bond_token,
                signer: signer.clone(),
                rpc_backoff: backoff.clone(),
                header_cache_size: NonZeroUsize::new(HEADER_CACHE_SIZE)
                    .unwrap_or(NonZeroUsize::MIN),
            },
            producers,
            handler: HandlerConfig {
                prover_address,
                l2_signal_service: cli.l2_signal_service,
                contester_mode: cli.contester_mode,
                prove_unassigned_blocks: cli.prove_unassigned_blocks,
                guardian_tier,
                l1_origin_poll_interval: cli.l1_origin_poll_interval,
                check_backoff: backoff.clone(),
            },
            submitter: SubmitterConfig {
                prover_address,
                l2_protocol_address: cli.l2_protocol,
                l1_signal_service: cli.l1_signal_service,
                l2_signal_service: cli.l2_signal_service,
                graffiti,
                l1_origin_poll_interval: cli.l1_origin_poll_interval,
            },
            sender: TxSenderConfig {
                backoff: backoff.clone(),
                wait_receipt_timeout: cli.wait_receipt_timeout,
                receipt_poll_interval: cli.l1_origin_poll_interval,
            },
            options: ProverOptions {
                event_poll_interval: cli.event_poll_interval,
                max_concurrent_proving_jobs: cli.max_concurrent_proving_jobs as usize,
                start_height: cli.start_height,
                proving_backoff: backoff,
                // Waiting for capacity never gives up.
                capacity_backoff: BackoffPolicy::constant(cli.backoff_retry_interval)
                    .with_max_retries(None),
                skip_capacity: guardian_tier.is_some(),
            },
            server: ServerConfig {
                port: cli.server_port,
                prover_address,
                l1_protocol: cli.l1_protocol,
                min_optimistic_tier_fee: cli.min_optimistic_tier_fee,
                min_sgx_tier_fee: cli.min_sgx_tier_fee,
                min_sgx_and_zkvm_tier_fee: cli.min_sgx_and_zkvm_tier_fee,
                max_expiry: cli.max_expiry,
                max_slippage: cli.max_slippage,
                max_proposed_in: cli.max_proposed_in,
            },
            signer,
            l2_protocol: cli.l2_protocol,
            max_capacity: cli.max_concurrent_proving_jobs,
            temp_capacity_ttl: cli.temp_capacity_expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::testing::FakeChain;

    // Well known development key, its address is below.
    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[derive(Parser)]
    struct Cli {
        #[clap(flatten)]
        config: CliProverConfig,
    }

    fn parse(extra: &[&str]) -> CliProverConfig {
        let address = "0x0000000000000000000000000000000000000001";
        let mut args = vec![
            "prover",
            "--l1-endpoint",
            "http://localhost:8545",
            "--l2-endpoint",
            "http://localhost:9545",
            "--l1-protocol",
            address,
            "--l2-protocol",
            address,
            "--l1-signal-service",
            address,
            "--l2-signal-service",
            address,
            "--tier-provider",
            address,
            "--bond-token",
            address,
            "--private-key",
            KEY,
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap().config
    }

    #[test]
    fn defaults_are_valid() {
        let config = ProverConfig::try_from(parse(&[])).unwrap();
        assert_eq!(config.prover_address(), KEY_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(config.max_capacity, 1);
        assert_eq!(config.temp_capacity_ttl, Duration::from_secs(600));
        assert_eq!(config.sender.wait_receipt_timeout, Duration::from_secs(60));
        assert_eq!(config.handler.guardian_tier, None);
        assert!(!config.options.skip_capacity);
        assert!(matches!(
            config.producers,
            ProducerConfig::Standard {
                dummy: false,
                sgx: None,
                zkvm: None
            }
        ));
    }

    #[test]
    fn rejects_a_mismatching_expected_address() {
        let err = ProverConfig::try_from(parse(&[
            "--expected-address",
            "0x0000000000000000000000000000000000000002",
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::AddressMismatch { .. }));

        assert!(ProverConfig::try_from(parse(&["--expected-address", KEY_ADDRESS])).is_ok());
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut cli = parse(&[]);
        cli.private_key = "0xnothex".to_string();
        assert!(matches!(
            ProverConfig::try_from(cli),
            Err(ConfigError::InvalidPrivateKey(_))
        ));

        let err = ProverConfig::try_from(parse(&["--max-concurrent-proving-jobs", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity));

        let err = ProverConfig::try_from(parse(&["--guardian", "guardian", "--oracle"])).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingModes(..)));

        let err = ProverConfig::try_from(parse(&["--return-liveness-bond"])).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingModes(..)));

        let err = ProverConfig::try_from(parse(&["--graffiti", &"x".repeat(33)])).unwrap_err();
        assert!(matches!(err, ConfigError::GraffitiTooLong));
    }

    #[test]
    fn graffiti_is_right_padded() {
        let graffiti = graffiti_bytes("abc").unwrap();
        assert_eq!(&graffiti[..3], b"abc");
        assert!(graffiti[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn guardians_skip_capacity() {
        let config = ProverConfig::try_from(parse(&["--guardian", "minority"])).unwrap();
        assert_eq!(config.handler.guardian_tier, Some(tiers::GUARDIAN_MINORITY));
        assert!(config.options.skip_capacity);
    }

    #[test]
    fn builds_producers_per_mode() {
        let client = Arc::new(FakeChain::with_blocks(1));
        let build = |extra: &[&str]| {
            let config = ProverConfig::try_from(parse(extra)).unwrap();
            config
                .producers
                .build(client.clone(), config.signer.clone(), config.l2_protocol)
                .unwrap()
                .tiers()
        };

        assert_eq!(build(&[]), vec![tiers::OPTIMISTIC]);
        assert_eq!(
            build(&["--dummy"]),
            vec![tiers::OPTIMISTIC, tiers::SGX, tiers::SGX_AND_ZKVM]
        );
        assert_eq!(
            build(&["--sgx-endpoint", "http://localhost:8080"]),
            vec![tiers::OPTIMISTIC, tiers::SGX]
        );
        assert_eq!(
            build(&[
                "--sgx-endpoint",
                "http://localhost:8080",
                "--zkvm-endpoint",
                "http://localhost:9000"
            ]),
            vec![tiers::OPTIMISTIC, tiers::SGX, tiers::SGX_AND_ZKVM]
        );
        assert_eq!(build(&["--oracle"]), vec![tiers::ORACLE]);
        assert_eq!(build(&["--guardian", "guardian"]), vec![tiers::GUARDIAN]);
    }
}
