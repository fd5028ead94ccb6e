//! Proof producers, one per protocol tier.
//!
//! A producer turns a [`ProofRequest`] into a [`ProofResult`]. What the proof
//! is depends on the tier: fixed bytes for the optimistic tier, an enclave
//! attestation, a ZK proof fetched from an external proving service, or an
//! ECDSA signature for the trusted signer tiers. Producers are held as trait
//! objects so the prover can pick one per request from its configuration.

use futures::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::anchor::AnchorError;
use crate::proof_types::{ProofRequest, ProofResult, TierId};
use crate::rpc::RpcError;

pub mod dummy;
pub mod guardian;
pub mod optimistic;
pub mod oracle;
pub mod sgx;
pub mod sgx_and_zkvm;
pub mod signed;
pub mod zkvm;

pub use dummy::DummyProducer;
pub use guardian::{GuardianMode, GuardianProducer};
pub use optimistic::OptimisticProducer;
pub use oracle::OracleProducer;
pub use sgx::{SgxConfig, SgxProducer};
pub use sgx_and_zkvm::SgxAndZkvmProducer;
pub use zkvm::{ZkvmConfig, ZkvmProducer};

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("proof of block {0} is not ready yet")]
    NotReady(u64),

    /// Connection failures, timeouts and 5xx answers of a proving service.
    #[error("proof service error: {0}")]
    Service(String),

    #[error("invalid proof service response: {0}")]
    InvalidResponse(String),

    #[error("L2 block {0} has no transactions")]
    EmptyBlock(u64),

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("failed to sign proof: {0}")]
    Signing(String),

    #[error("proof request for block {0} was cancelled")]
    Cancelled(u64),
}

impl ProducerError {
    /// Transient failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProducerError::NotReady(_) | ProducerError::Service(_) => true,
            ProducerError::Rpc(e) => matches!(e, RpcError::Transport(_) | RpcError::NotFound(_)),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProducerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProducerError::InvalidResponse(e.to_string())
        } else {
            ProducerError::Service(e.to_string())
        }
    }
}

pub type ProducerResult<T> = Result<T, ProducerError>;

pub trait ProofProducer: Send + Sync {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>>;

    /// Stops working on the proof of `block_id`. Only meaningful when
    /// [`Self::cancellable`] is true, late results are discarded otherwise.
    fn cancel(&self, _block_id: u64) -> BoxFuture<'_, ProducerResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn tier(&self) -> TierId;

    fn cancellable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ProducerError::NotReady(1).is_retryable());
        assert!(ProducerError::Service("502".into()).is_retryable());
        assert!(ProducerError::Rpc(RpcError::Transport("reset".into())).is_retryable());
        assert!(!ProducerError::Rpc(RpcError::Revert("L1_INVALID_TIER".into())).is_retryable());
        assert!(!ProducerError::InvalidResponse("garbage".into()).is_retryable());
        assert!(!ProducerError::Anchor(AnchorError::WrongSelector).is_retryable());
    }
}
