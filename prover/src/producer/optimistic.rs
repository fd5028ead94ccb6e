use futures::future::BoxFuture;
use rollup_common::tiers;

use super::{DummyProducer, ProducerResult, ProofProducer};
use crate::proof_types::{ProofRequest, ProofResult, TierId};

/// The optimistic tier accepts any proof bytes, it is secured by the
/// contest game instead.
#[derive(Clone, Copy, Debug)]
pub struct OptimisticProducer {
    dummy: DummyProducer,
}

impl Default for OptimisticProducer {
    fn default() -> Self {
        Self {
            dummy: DummyProducer::new(tiers::OPTIMISTIC),
        }
    }
}

impl ProofProducer for OptimisticProducer {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        self.dummy.request_proof(request)
    }

    fn tier(&self) -> TierId {
        tiers::OPTIMISTIC
    }
}
