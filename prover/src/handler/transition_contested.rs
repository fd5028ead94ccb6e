use std::sync::Arc;

use tracing::info;

use super::{Decision, HandlerContext};
use crate::proof_types::TransitionContestedEvent;
use crate::rpc::methods::{get_block_proposed_event, is_valid_proof};
use crate::rpc::ChainClient;

pub struct TransitionContestedHandler<C> {
    ctx: Arc<HandlerContext<C>>,
}

impl<C: ChainClient> TransitionContestedHandler<C> {
    pub fn new(ctx: Arc<HandlerContext<C>>) -> Self {
        Self { ctx }
    }

    /// Answers a contest over a transition the local chain disagrees with by
    /// proving the block at a higher tier.
    pub async fn handle(&self, event: TransitionContestedEvent) -> anyhow::Result<Decision> {
        let ctx = &self.ctx;
        let block_id = event.block_id;

        info!(
            block_id,
            contester = %event.contester,
            tier = event.tier,
            "Transition contested"
        );
        if !ctx.config.contester_mode {
            return Ok(Decision::Ignored);
        }

        let valid = is_valid_proof(
            ctx.client.as_ref(),
            block_id,
            event.tran.block_hash,
            event.tran.signal_root,
            ctx.config.l2_signal_service,
        )
        .await?;
        if valid {
            return Ok(Decision::ValidProof);
        }

        let proposed = get_block_proposed_event(ctx.client.as_ref(), block_id).await?;
        ctx.escalate(event.tier, proposed).await
    }
}
