use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use super::{Decision, HandlerContext};
use crate::proof_types::TransitionProvedEvent;
use crate::rpc::methods::{get_block_proposed_event, is_valid_proof};
use crate::rpc::ChainClient;

/// Contests proofs that disagree with the local L2 chain, when running in
/// contester mode.
pub struct TransitionProvedHandler<C> {
    ctx: Arc<HandlerContext<C>>,
}

impl<C: ChainClient> TransitionProvedHandler<C> {
    pub fn new(ctx: Arc<HandlerContext<C>>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, event: TransitionProvedEvent) -> anyhow::Result<Decision> {
        let ctx = &self.ctx;
        let block_id = event.block_id;

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

        info!(
            block_id,
            prover = %event.prover,
            tier = event.tier,
            block_hash = %event.tran.block_hash,
            "Invalid transition proved, contesting"
        );
        let proposed = get_block_proposed_event(ctx.client.as_ref(), block_id)
            .await
            .with_context(|| format!("failed to find the proposal of block {block_id}"))?;
        ctx.escalate(event.tier, proposed).await
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256};
    use rollup_common::tiers;

    use super::*;
    use crate::handler::tests::{config, harness};
    use crate::handler::HandlerConfig;
    use crate::proof_types::Transition;
    use crate::testing::FakeChain;

    fn proved(chain: &FakeChain, block_id: u64, block_hash: B256) -> TransitionProvedEvent {
        TransitionProvedEvent {
            block_id,
            tran: Transition {
                parent_hash: chain.l2_header(block_id - 1).hash,
                block_hash,
                signal_root: chain.local_signal_root(block_id),
                graffiti: B256::ZERO,
            },
            prover: Address::repeat_byte(0x99),
            tier: tiers::OPTIMISTIC,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ignored_outside_contester_mode() {
        let h = harness(config(), 0);
        let event = proved(&h.chain, 2, B256::repeat_byte(0xba));
        let decision = TransitionProvedHandler::new(h.ctx.clone())
            .handle(event)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Ignored);
    }

    #[tokio::test]
    async fn contests_with_a_higher_tier() {
        let contester = HandlerConfig {
            contester_mode: true,
            ..config()
        };
        let mut h = harness(contester, 0);
        let handler = TransitionProvedHandler::new(h.ctx.clone());

        let valid = proved(&h.chain, 2, h.chain.l2_header(2).hash);
        assert_eq!(handler.handle(valid).await.unwrap(), Decision::ValidProof);
        assert!(h.requests.try_recv().is_err());

        let invalid = proved(&h.chain, 2, B256::repeat_byte(0xba));
        assert_eq!(
            handler.handle(invalid).await.unwrap(),
            Decision::Requested(tiers::OPTIMISTIC + 1)
        );
        let body = h.requests.recv().await.unwrap();
        assert_eq!(body.event, h.chain.proposed_event(2));
        assert!(body.tier > tiers::OPTIMISTIC);
    }
}
