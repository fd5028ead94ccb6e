use std::sync::Arc;

use tracing::info;

use super::{Decision, HandlerContext};
use crate::proof_types::BlockProposedEvent;
use crate::rpc::methods::get_block_proof_status;
use crate::rpc::ChainClient;

/// Revisits a block once the proving window of its assigned prover closed.
pub struct AssignmentExpiredHandler<C> {
    ctx: Arc<HandlerContext<C>>,
}

impl<C: ChainClient> AssignmentExpiredHandler<C> {
    pub fn new(ctx: Arc<HandlerContext<C>>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, event: BlockProposedEvent) -> anyhow::Result<Decision> {
        let ctx = &self.ctx;
        let block_id = event.block_id;

        if event.assigned_prover == ctx.config.prover_address {
            return Ok(Decision::Ignored);
        }
        if ctx.is_block_verified(block_id).await? {
            return Ok(Decision::AlreadyVerified);
        }

        let status =
            get_block_proof_status(ctx.client.as_ref(), block_id, ctx.config.l2_signal_service)
                .await?;
        if !status.is_submitted {
            if !ctx.config.prove_unassigned_blocks {
                return Ok(Decision::NotAssigned);
            }
            let tier = ctx.request_tier(&event);
            if !ctx.has_enough_bond(block_id, tier).await? {
                return Ok(Decision::InsufficientBond);
            }
            info!(block_id, "Assignment expired without a proof, proving it");
            return ctx.request_proof(tier, event).await;
        }
        if !status.invalid {
            return Ok(Decision::ValidProof);
        }
        if !ctx.config.contester_mode {
            return Ok(Decision::InvalidProofSkipped);
        }

        let proven_tier = status
            .current_transition
            .map_or(event.meta.min_tier, |t| t.tier);
        ctx.escalate(proven_tier, event).await
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256, U256};
    use rollup_common::tiers;

    use super::*;
    use crate::handler::tests::{config, harness};
    use crate::handler::HandlerConfig;
    use crate::proof_types::TransitionState;

    fn unassigned() -> HandlerConfig {
        HandlerConfig {
            prover_address: Address::repeat_byte(0x77),
            prove_unassigned_blocks: true,
            ..config()
        }
    }

    #[tokio::test]
    async fn assigned_prover_ignores_expiry() {
        let h = harness(config(), 0);
        let decision = AssignmentExpiredHandler::new(h.ctx.clone())
            .handle(h.chain.proposed_event(2))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Ignored);
    }

    #[tokio::test]
    async fn proves_unproven_blocks() {
        let mut h = harness(unassigned(), 0);
        let decision = AssignmentExpiredHandler::new(h.ctx.clone())
            .handle(h.chain.proposed_event(2))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Requested(tiers::SGX));
        assert_eq!(h.requests.recv().await.unwrap().tier, tiers::SGX);

        let h = harness(
            HandlerConfig {
                prove_unassigned_blocks: false,
                ..unassigned()
            },
            0,
        );
        let decision = AssignmentExpiredHandler::new(h.ctx.clone())
            .handle(h.chain.proposed_event(2))
            .await
            .unwrap();
        assert_eq!(decision, Decision::NotAssigned);
    }

    #[tokio::test]
    async fn unproven_blocks_need_enough_bond() {
        let mut h = harness(unassigned(), 5_000);
        h.chain.set_bond_balance(U256::ZERO);
        let handler = AssignmentExpiredHandler::new(h.ctx.clone());

        let decision = handler.handle(h.chain.proposed_event(2)).await.unwrap();
        assert_eq!(decision, Decision::InsufficientBond);
        assert!(h.requests.try_recv().is_err());

        h.chain.set_bond_balance(U256::from(tiers::SGX) * U256::from(1_000u64));
        let decision = handler.handle(h.chain.proposed_event(2)).await.unwrap();
        assert_eq!(decision, Decision::Requested(tiers::SGX));
        assert_eq!(h.requests.recv().await.unwrap().tier, tiers::SGX);
    }

    #[tokio::test]
    async fn escalates_invalid_proofs_in_contester_mode() {
        let invalid = TransitionState {
            block_hash: B256::repeat_byte(0xba),
            tier: tiers::SGX,
            ..Default::default()
        };

        let h = harness(unassigned(), 0);
        h.chain.set_transition(2, invalid.clone());
        let handler = AssignmentExpiredHandler::new(h.ctx.clone());
        assert_eq!(
            handler.handle(h.chain.proposed_event(2)).await.unwrap(),
            Decision::InvalidProofSkipped
        );

        let mut h = harness(
            HandlerConfig {
                contester_mode: true,
                ..unassigned()
            },
            0,
        );
        h.chain.set_transition(2, invalid);
        let handler = AssignmentExpiredHandler::new(h.ctx.clone());
        assert_eq!(
            handler.handle(h.chain.proposed_event(2)).await.unwrap(),
            Decision::Requested(tiers::SGX + 1)
        );
        assert!(h.requests.recv().await.is_some());
    }

    #[tokio::test]
    async fn valid_proofs_are_left_alone() {
        let h = harness(unassigned(), 0);
        h.chain.set_transition(
            2,
            TransitionState {
                block_hash: h.chain.l2_header(2).hash,
                signal_root: h.chain.local_signal_root(2),
                tier: tiers::SGX,
                ..Default::default()
            },
        );
        let decision = AssignmentExpiredHandler::new(h.ctx.clone())
            .handle(h.chain.proposed_event(2))
            .await
            .unwrap();
        assert_eq!(decision, Decision::ValidProof);
    }
}
