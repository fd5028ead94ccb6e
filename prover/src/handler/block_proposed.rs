use std::sync::Arc;

use anyhow::Context as _;
use tracing::{debug, error, info};

use super::{Decision, Flow, HandlerContext};
use crate::backoff::retry;
use crate::proof_types::BlockProposedEvent;
use crate::rpc::methods::{check_l1_reorg, get_block_proof_status, wait_l1_origin};
use crate::rpc::ChainClient;

pub struct BlockProposedHandler<C> {
    ctx: Arc<HandlerContext<C>>,
}

impl<C: ChainClient> BlockProposedHandler<C> {
    pub fn new(ctx: Arc<HandlerContext<C>>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, event: BlockProposedEvent) -> anyhow::Result<Flow> {
        let ctx = &self.ctx;
        let block_id = event.block_id;

        // The L2 execution engine has to insert the block first.
        if wait_l1_origin(
            ctx.client.as_ref(),
            block_id,
            ctx.config.l1_origin_poll_interval,
            &ctx.cancel,
        )
        .await
        .is_none()
        {
            return Ok(Flow::EndIteration);
        }

        let reorg = check_l1_reorg(ctx.client.as_ref(), block_id.saturating_sub(1))
            .await
            .with_context(|| format!("failed to check L1 reorg before block {block_id}"))?;
        if reorg.is_reorged {
            info!(
                block_id,
                l1_current_to_reset = ?reorg.l1_current_to_reset.as_ref().map(|h| h.number),
                last_handled_block_id_to_reset = ?reorg.last_handled_block_id_to_reset,
                "L1 reorg detected, rewinding"
            );
            if let Some(header) = reorg.l1_current_to_reset {
                ctx.state.set_l1_current(header);
            }
            if let Some(id) = reorg.last_handled_block_id_to_reset {
                ctx.state.reset_last_handled_block_id(id);
            }
            ctx.state.set_reorg_detected(true);
            return Ok(Flow::EndIteration);
        }

        if block_id <= ctx.state.last_handled_block_id() {
            debug!(block_id, "Block already handled, skipping");
            return Ok(Flow::Continue);
        }

        info!(
            block_id,
            l1_height = event.raw.l1_block_number,
            assigned_prover = %event.assigned_prover,
            min_tier = event.meta.min_tier,
            "New BlockProposed event"
        );

        let l1_header = ctx
            .client
            .l1_header_by_hash(event.raw.l1_block_hash)
            .await
            .context("failed to fetch the L1 block of the event")?;
        ctx.state.set_l1_current(l1_header);
        ctx.state.advance_last_handled_block_id(block_id);

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let res = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return,
                res = retry(&ctx.config.check_backoff, || check_and_request(&ctx, &event)) => res,
            };
            match res {
                Ok(decision) => debug!(block_id, ?decision, "Eligibility checked"),
                Err(e) => error!(block_id, "Failed to check proof eligibility: {e:#}"),
            }
        });

        Ok(Flow::Continue)
    }

    pub async fn check_and_request(&self, event: &BlockProposedEvent) -> anyhow::Result<Decision> {
        check_and_request(&self.ctx, event).await
    }
}

/// Decides whether this prover should prove `event`'s block now, later, or
/// not at all.
async fn check_and_request<C: ChainClient>(
    ctx: &Arc<HandlerContext<C>>,
    event: &BlockProposedEvent,
) -> anyhow::Result<Decision> {
    let block_id = event.block_id;

    if ctx.is_block_verified(block_id).await? {
        info!(block_id, "Block already verified");
        return Ok(Decision::AlreadyVerified);
    }

    let status =
        get_block_proof_status(ctx.client.as_ref(), block_id, ctx.config.l2_signal_service)
            .await?;
    if status.is_submitted {
        if !status.invalid {
            return Ok(Decision::ValidProof);
        }
        if let Some(tier) = ctx.config.guardian_tier {
            return ctx.request_proof(tier, event.clone()).await;
        }
        if !ctx.config.contester_mode {
            info!(block_id, "Invalid proof on chain, not in contester mode");
            return Ok(Decision::InvalidProofSkipped);
        }
        let proven_tier = status
            .current_transition
            .map_or(event.meta.min_tier, |t| t.tier);
        return ctx.escalate(proven_tier, event.clone()).await;
    }

    let window = ctx.proving_window(event).await?;
    let assigned = event.assigned_prover == ctx.config.prover_address;

    if !window.expired && !assigned {
        if !ctx.config.prove_unassigned_blocks {
            return Ok(Decision::NotAssigned);
        }
        info!(
            block_id,
            expires_at = window.expires_at,
            "Proving window still open for the assigned prover, waiting"
        );
        let ctx = ctx.clone();
        let event = event.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {}
                _ = tokio::time::sleep(window.remaining) => {
                    if ctx.assignment_expired.send(event).await.is_err() {
                        debug!(block_id, "Assignment expiry queue closed");
                    }
                }
            }
        });
        return Ok(Decision::AwaitingAssignmentExpiry);
    }

    if window.expired && !assigned && !ctx.config.prove_unassigned_blocks {
        return Ok(Decision::NotAssigned);
    }

    let tier = ctx.request_tier(event);
    if window.expired && !ctx.has_enough_bond(block_id, tier).await? {
        return Ok(Decision::InsufficientBond);
    }

    ctx.request_proof(tier, event.clone()).await
}
