//! Shared machinery of the trusted signer tiers, whose proof is an ECDSA
//! signature over the evidence of the block.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use tracing::debug;

use super::{ProducerError, ProducerResult};
use crate::anchor::AnchorTxValidator;
use crate::proof_types::{Evidence, ProofRequest, TierId};
use crate::rpc::bindings::evidence_signing_hash;
use crate::rpc::L2Client;

pub struct EvidenceSigner<C> {
    client: Arc<C>,
    anchor_validator: AnchorTxValidator,
    signer: PrivateKeySigner,
}

impl<C: L2Client> EvidenceSigner<C> {
    pub fn new(client: Arc<C>, anchor_validator: AnchorTxValidator, signer: PrivateKeySigner) -> Self {
        Self {
            client,
            anchor_validator,
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Checks the proven block is anchored correctly, then signs the evidence
    /// the protocol will rebuild for `tier`. Returns the 65 byte signature.
    pub async fn sign(&self, request: &ProofRequest, tier: TierId) -> ProducerResult<Bytes> {
        let block = self.client.l2_block_by_hash(request.opts.block_hash).await?;
        let anchor_tx = block
            .transactions
            .first()
            .ok_or(ProducerError::EmptyBlock(request.block_id))?;
        self.anchor_validator.validate_anchor_tx(anchor_tx)?;

        let evidence = Evidence {
            meta_hash: request.opts.meta_hash,
            parent_hash: request.opts.parent_hash,
            block_hash: request.opts.block_hash,
            signal_root: request.opts.signal_root,
            graffiti: request.opts.graffiti,
            tier,
            proof: Bytes::new(),
        };
        let hash = evidence_signing_hash(&evidence);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| ProducerError::Signing(e.to_string()))?;
        debug!(block_id = request.block_id, tier, %hash, "Signed evidence");

        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy::primitives::Signature;

    use super::*;
    use crate::testing::{FakeChain, L2_PROTOCOL_ADDRESS};

    pub(crate) fn signer() -> PrivateKeySigner {
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .parse()
            .unwrap()
    }

    /// Recovers the address that produced `proof` for `request` at `tier`.
    pub(crate) fn recover(request: &ProofRequest, tier: TierId, proof: &[u8]) -> Address {
        let evidence = Evidence {
            meta_hash: request.opts.meta_hash,
            parent_hash: request.opts.parent_hash,
            block_hash: request.opts.block_hash,
            signal_root: request.opts.signal_root,
            graffiti: request.opts.graffiti,
            tier,
            proof: Bytes::new(),
        };
        Signature::try_from(proof)
            .unwrap()
            .recover_address_from_prehash(&evidence_signing_hash(&evidence))
            .unwrap()
    }

    #[tokio::test]
    async fn signature_recovers_to_signer() {
        let chain = Arc::new(FakeChain::with_blocks(3));
        let signer = EvidenceSigner::new(
            chain.clone(),
            AnchorTxValidator::new(L2_PROTOCOL_ADDRESS),
            signer(),
        );
        let request = chain.proof_request(2, 1000);
        let proof = signer.sign(&request, 1000).await.unwrap();

        assert_eq!(proof.len(), 65);
        assert_eq!(recover(&request, 1000, &proof), signer.address());
        assert_ne!(recover(&request, 900, &proof), signer.address());
    }

    #[tokio::test]
    async fn refuses_blocks_without_anchor() {
        let chain = Arc::new(FakeChain::with_blocks(3));
        chain.set_transactions(2, vec![]);
        let signer = EvidenceSigner::new(
            chain.clone(),
            AnchorTxValidator::new(L2_PROTOCOL_ADDRESS),
            signer(),
        );
        let err = signer
            .sign(&chain.proof_request(2, 1000), 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, ProducerError::EmptyBlock(2)));
    }
}
