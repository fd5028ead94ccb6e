use alloy::primitives::{keccak256, Bytes};
use futures::future::{BoxFuture, FutureExt};
use rollup_common::{tiers, RETURN_LIVENESS_BOND};
use tracing::info;

use super::signed::EvidenceSigner;
use super::{ProducerResult, ProofProducer};
use crate::proof_types::{ProofRequest, ProofResult, TierId};
use crate::rpc::L2Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardianMode {
    Guardian,
    Minority,
}

impl GuardianMode {
    pub fn tier(self) -> TierId {
        match self {
            GuardianMode::Guardian => tiers::GUARDIAN,
            GuardianMode::Minority => tiers::GUARDIAN_MINORITY,
        }
    }
}

/// Highest tiers, backed by a committee of guardian signers.
pub struct GuardianProducer<C> {
    signer: EvidenceSigner<C>,
    mode: GuardianMode,
    /// Answer with the liveness bond return marker instead of signing.
    return_liveness_bond: bool,
}

impl<C: L2Client> GuardianProducer<C> {
    pub fn new(signer: EvidenceSigner<C>, mode: GuardianMode, return_liveness_bond: bool) -> Self {
        Self {
            signer,
            mode,
            return_liveness_bond,
        }
    }

    async fn prove(&self, request: ProofRequest) -> ProducerResult<ProofResult> {
        let tier = self.mode.tier();
        let proof = if self.return_liveness_bond {
            info!(block_id = request.block_id, "Returning liveness bond");
            Bytes::from(keccak256(RETURN_LIVENESS_BOND).to_vec())
        } else {
            self.signer.sign(&request, tier).await?
        };

        Ok(ProofResult {
            tier,
            ..ProofResult::for_request(request, proof, 0)
        })
    }
}

impl<C: L2Client + 'static> ProofProducer for GuardianProducer<C> {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        self.prove(request).boxed()
    }

    fn tier(&self) -> TierId {
        self.mode.tier()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::anchor::AnchorTxValidator;
    use crate::producer::signed::tests::{recover, signer};
    use crate::testing::{FakeChain, L2_PROTOCOL_ADDRESS};

    fn producer(
        chain: Arc<FakeChain>,
        mode: GuardianMode,
        return_liveness_bond: bool,
    ) -> GuardianProducer<FakeChain> {
        GuardianProducer::new(
            EvidenceSigner::new(chain, AnchorTxValidator::new(L2_PROTOCOL_ADDRESS), signer()),
            mode,
            return_liveness_bond,
        )
    }

    #[tokio::test]
    async fn minority_guardian_signs_its_own_tier() {
        let chain = Arc::new(FakeChain::with_blocks(3));
        let producer = producer(chain.clone(), GuardianMode::Minority, false);
        assert_eq!(producer.tier(), tiers::GUARDIAN_MINORITY);

        let request = chain.proof_request(2, tiers::GUARDIAN_MINORITY);
        let result = producer.request_proof(request.clone()).await.unwrap();
        assert_eq!(result.tier, tiers::GUARDIAN_MINORITY);
        assert_eq!(
            recover(&request, tiers::GUARDIAN_MINORITY, &result.proof),
            signer().address()
        );
    }

    #[tokio::test]
    async fn return_liveness_bond_mode_skips_signing() {
        let chain = Arc::new(FakeChain::with_blocks(3));
        // An empty block would fail signing, the marker does not look at it.
        chain.set_transactions(2, vec![]);
        let producer = producer(chain.clone(), GuardianMode::Guardian, true);

        let result = producer
            .request_proof(chain.proof_request(2, tiers::GUARDIAN))
            .await
            .unwrap();
        assert_eq!(result.tier, tiers::GUARDIAN);
        assert_eq!(result.proof.as_ref(), keccak256(RETURN_LIVENESS_BOND).as_slice());
    }
}
