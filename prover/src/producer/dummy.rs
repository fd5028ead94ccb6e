use alloy::primitives::Bytes;
use futures::future::{BoxFuture, FutureExt};
use tracing::info;

use super::{ProducerResult, ProofProducer};
use crate::proof_types::{ProofRequest, ProofResult, TierId};

/// Byte pattern returned in place of a real proof.
pub const DUMMY_PROOF: [u8; 32] = [0xff; 32];

/// Answers instantly with [`DUMMY_PROOF`]. Embedded by the producers whose
/// tier accepts any proof bytes, or which can be run without their backing
/// service for local testing.
#[derive(Clone, Copy, Debug)]
pub struct DummyProducer {
    tier: TierId,
}

impl DummyProducer {
    pub const fn new(tier: TierId) -> Self {
        Self { tier }
    }

    pub fn proof_for(&self, request: ProofRequest) -> ProofResult {
        info!(
            block_id = request.block_id,
            tier = self.tier,
            "Producing dummy proof"
        );
        ProofResult {
            tier: self.tier,
            ..ProofResult::for_request(request, Bytes::from_static(&DUMMY_PROOF), 0)
        }
    }
}

impl ProofProducer for DummyProducer {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        let result = self.proof_for(request);
        async move { Ok(result) }.boxed()
    }

    fn tier(&self) -> TierId {
        self.tier
    }
}
