use futures::future::{BoxFuture, FutureExt};
use rollup_common::tiers;
use tracing::info;

use super::{ProducerResult, ProofProducer};
use crate::proof_types::{ProofRequest, ProofResult, TierId};

/// Requests an SGX attestation and a ZK proof of the same block at once. The
/// submitted proof is the SGX proof followed by the ZK proof, both have to
/// succeed.
pub struct SgxAndZkvmProducer {
    sgx: Box<dyn ProofProducer>,
    zkvm: Box<dyn ProofProducer>,
}

impl SgxAndZkvmProducer {
    pub fn new(sgx: Box<dyn ProofProducer>, zkvm: Box<dyn ProofProducer>) -> Self {
        Self { sgx, zkvm }
    }

    async fn prove(&self, request: ProofRequest) -> ProducerResult<ProofResult> {
        let (sgx, zkvm) = futures::try_join!(
            self.sgx.request_proof(request.clone()),
            self.zkvm.request_proof(request.clone()),
        )?;

        let mut proof = Vec::with_capacity(sgx.proof.len() + zkvm.proof.len());
        proof.extend_from_slice(&sgx.proof);
        proof.extend_from_slice(&zkvm.proof);
        info!(
            block_id = request.block_id,
            sgx_size = sgx.proof.len(),
            zkvm_size = zkvm.proof.len(),
            "Combined SGX and ZK proofs"
        );

        Ok(ProofResult {
            tier: tiers::SGX_AND_ZKVM,
            ..ProofResult::for_request(request, proof.into(), zkvm.degree)
        })
    }
}

impl ProofProducer for SgxAndZkvmProducer {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        self.prove(request).boxed()
    }

    fn cancel(&self, block_id: u64) -> BoxFuture<'_, ProducerResult<()>> {
        async move {
            futures::try_join!(self.sgx.cancel(block_id), self.zkvm.cancel(block_id))?;
            Ok(())
        }
        .boxed()
    }

    fn tier(&self) -> TierId {
        tiers::SGX_AND_ZKVM
    }

    fn cancellable(&self) -> bool {
        self.sgx.cancellable() || self.zkvm.cancellable()
    }
}
