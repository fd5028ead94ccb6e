//! Reactions to the protocol events the prover subscribes to.
//!
//! Handlers never prove anything themselves. They decide whether a block
//! needs a proof, and at which tier, then queue a [`ProofRequestBody`] for the
//! prover loop to pick up.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::Address;
use anyhow::{anyhow, Context as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backoff::BackoffPolicy;
use crate::proof_types::{BlockProposedEvent, ProofRequestBody, TierId, TierInfo};
use crate::rpc::{ChainClient, RpcResult};
use crate::state::SharedState;

pub mod assignment_expired;
pub mod block_proposed;
pub mod transition_contested;
pub mod transition_proved;

pub use assignment_expired::AssignmentExpiredHandler;
pub use block_proposed::BlockProposedHandler;
pub use transition_contested::TransitionContestedHandler;
pub use transition_proved::TransitionProvedHandler;

/// Source of the wall clock time proving windows are compared against.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch.
    fn now_unix(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Whether the event loop keeps going through the events it fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// State was rewound, the remaining events of this iteration are stale.
    EndIteration,
}

/// What a handler decided to do about a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The event is irrelevant in the current mode.
    Ignored,
    AlreadyVerified,
    /// The proof on chain agrees with the local L2 chain.
    ValidProof,
    /// The proof on chain is wrong, but this prover does not contest.
    InvalidProofSkipped,
    /// Someone else's block, revisited once its proving window closes.
    AwaitingAssignmentExpiry,
    NotAssigned,
    InsufficientBond,
    /// A proof was requested at this tier or above.
    Requested(TierId),
}

#[derive(Clone, Debug)]
pub struct HandlerConfig {
    pub prover_address: Address,
    pub l2_signal_service: Address,
    pub contester_mode: bool,
    pub prove_unassigned_blocks: bool,
    /// Set when running as a guardian, every request then targets this tier.
    pub guardian_tier: Option<TierId>,
    pub l1_origin_poll_interval: Duration,
    /// Retry policy of the eligibility check of a new block.
    pub check_backoff: BackoffPolicy,
}

/// Proving window of a block at its minimum tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProvingWindow {
    pub expired: bool,
    pub expires_at: u64,
    pub remaining: Duration,
}

impl ProvingWindow {
    pub fn of(proposed_at: u64, window_minutes: u64, now: u64) -> Self {
        let expires_at = proposed_at + window_minutes * 60;
        Self {
            expired: now > expires_at,
            expires_at,
            remaining: Duration::from_secs(expires_at.saturating_sub(now)),
        }
    }
}

/// Everything the handlers share.
pub struct HandlerContext<C> {
    pub client: Arc<C>,
    pub state: Arc<SharedState>,
    pub config: HandlerConfig,
    pub clock: Arc<dyn Clock>,
    pub requests: mpsc::Sender<ProofRequestBody>,
    pub assignment_expired: mpsc::Sender<BlockProposedEvent>,
    pub cancel: CancellationToken,
}

impl<C: ChainClient> HandlerContext<C> {
    pub(crate) async fn is_block_verified(&self, block_id: u64) -> RpcResult<bool> {
        let vars = self.client.state_variables().await?;
        Ok(vars.last_verified_block_id >= block_id)
    }

    /// The tier a fresh proof of `event`'s block is requested at.
    pub(crate) fn request_tier(&self, event: &BlockProposedEvent) -> TierId {
        self.config.guardian_tier.unwrap_or(event.meta.min_tier)
    }

    /// Looks up tier `id`, reloading the protocol tiers once when it is
    /// unknown locally.
    pub(crate) async fn tier_info(&self, id: TierId) -> anyhow::Result<TierInfo> {
        if let Some(tier) = self.state.tier(id) {
            return Ok(tier);
        }
        let tiers = self
            .client
            .protocol_tiers()
            .await
            .context("failed to reload protocol tiers")?;
        info!(
            tier = id,
            tiers = ?tiers.iter().map(|t| t.id).collect::<Vec<_>>(),
            "Unknown tier, protocol tiers reloaded"
        );
        self.state.set_tiers(tiers);
        self.state.tier(id).ok_or_else(|| anyhow!("unknown tier {id}"))
    }

    pub(crate) async fn proving_window(
        &self,
        event: &BlockProposedEvent,
    ) -> anyhow::Result<ProvingWindow> {
        let tier = self.tier_info(event.meta.min_tier).await?;
        Ok(ProvingWindow::of(
            event.meta.timestamp,
            tier.proving_window,
            self.clock.now_unix(),
        ))
    }

    /// Whether this prover's bond balance covers the validity bond of `tier`,
    /// as required to prove a block whose proving window is over.
    pub(crate) async fn has_enough_bond(&self, block_id: u64, tier: TierId) -> anyhow::Result<bool> {
        let required = self.tier_info(tier).await?.validity_bond;
        let balance = self.client.bond_balance(self.config.prover_address).await?;
        if balance < required {
            info!(
                block_id,
                %balance,
                %required,
                "Not enough bond to prove an expired block"
            );
            return Ok(false);
        }
        Ok(true)
    }

    pub(crate) async fn request_proof(
        &self,
        tier: TierId,
        event: BlockProposedEvent,
    ) -> anyhow::Result<Decision> {
        info!(block_id = event.block_id, tier, "Requesting proof");
        self.requests
            .send(ProofRequestBody { tier, event })
            .await
            .context("proof request queue closed")?;
        Ok(Decision::Requested(tier))
    }

    /// Requests a proof at a tier strictly above `tier`.
    pub(crate) async fn escalate(
        &self,
        tier: TierId,
        event: BlockProposedEvent,
    ) -> anyhow::Result<Decision> {
        info!(block_id = event.block_id, tier, "Escalating to a higher tier");
        self.request_proof(tier + 1, event).await
    }
}
