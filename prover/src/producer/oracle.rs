use futures::future::{BoxFuture, FutureExt};
use rollup_common::tiers;

use super::signed::EvidenceSigner;
use super::{ProducerResult, ProofProducer};
use crate::proof_types::{ProofRequest, ProofResult, TierId};
use crate::rpc::L2Client;

/// Proves blocks by signing their evidence with the oracle prover key.
pub struct OracleProducer<C> {
    signer: EvidenceSigner<C>,
}

impl<C: L2Client> OracleProducer<C> {
    pub fn new(signer: EvidenceSigner<C>) -> Self {
        Self { signer }
    }

    async fn prove(&self, request: ProofRequest) -> ProducerResult<ProofResult> {
        let signature = self.signer.sign(&request, tiers::ORACLE).await?;
        Ok(ProofResult {
            tier: tiers::ORACLE,
            ..ProofResult::for_request(request, signature, 0)
        })
    }
}

impl<C: L2Client + 'static> ProofProducer for OracleProducer<C> {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        self.prove(request).boxed()
    }

    fn tier(&self) -> TierId {
        tiers::ORACLE
    }
}
