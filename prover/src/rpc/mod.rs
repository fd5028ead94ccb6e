//! Chain access.
//!
//! Every component above this module talks to L1, L2 and the protocol
//! contract through the traits defined here, so the whole proof lifecycle can
//! run against an in-memory chain in tests. [`alloy_client`] is the production
//! implementation.

use std::future::Future;

use alloy::primitives::{Address, Bytes, B256, U256};

use crate::proof_types::{
    BlockHeader, BlockInfo, BlockProposedEvent, BlockVerifiedEvent, L1Header, L1Origin, L2Block,
    L2Receipt, StateVariables, TierInfo, TransitionContestedEvent, TransitionProvedEvent,
    TransitionState,
};

pub mod alloy_client;
pub mod bindings;
pub mod methods;
pub mod retry;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("{0} not found")]
    NotFound(String),
    /// A call or transaction reverted. Holds the decoded reason, e.g.
    /// `L1_ALREADY_PROVED`, so callers can classify it by prefix.
    #[error("{0}")]
    Revert(String),
    #[error("nonce too low")]
    NonceTooLow,
    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        RpcError::NotFound(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::NotFound(_))
    }

    /// Whether the protocol rejected the call with `reason`.
    pub fn is_revert_with(&self, reason: &str) -> bool {
        matches!(self, RpcError::Revert(r) if r.contains(reason))
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

pub trait L1Client: Send + Sync {
    fn l1_header_by_number(&self, number: u64)
        -> impl Future<Output = RpcResult<L1Header>> + Send;

    fn l1_header_by_hash(&self, hash: B256) -> impl Future<Output = RpcResult<L1Header>> + Send;

    fn l1_block_number(&self) -> impl Future<Output = RpcResult<u64>> + Send;
}

pub trait L2Client: Send + Sync {
    /// The L1 origin the L2 execution engine recorded for `block_id`.
    /// [`RpcError::NotFound`] until the engine inserted the block.
    fn l1_origin_by_id(&self, block_id: u64) -> impl Future<Output = RpcResult<L1Origin>> + Send;

    fn l2_header_by_number(
        &self,
        number: u64,
    ) -> impl Future<Output = RpcResult<BlockHeader>> + Send;

    fn l2_header_by_hash(&self, hash: B256) -> impl Future<Output = RpcResult<BlockHeader>> + Send;

    fn l2_block_by_hash(&self, hash: B256) -> impl Future<Output = RpcResult<L2Block>> + Send;

    /// Receipts of every transaction in the block, in transaction order.
    fn l2_receipts(&self, block_hash: B256)
        -> impl Future<Output = RpcResult<Vec<L2Receipt>>> + Send;

    /// Storage root of the L2 signal service at `block_hash`.
    fn signal_root(
        &self,
        signal_service: Address,
        block_hash: B256,
    ) -> impl Future<Output = RpcResult<B256>> + Send;
}

pub trait ProtocolClient: Send + Sync {
    fn protocol_tiers(&self) -> impl Future<Output = RpcResult<Vec<TierInfo>>> + Send;

    fn state_variables(&self) -> impl Future<Output = RpcResult<StateVariables>> + Send;

    fn block_info(&self, block_id: u64) -> impl Future<Output = RpcResult<BlockInfo>> + Send;

    /// The transition of `block_id` built on `parent_hash`. Reverts with
    /// `L1_TRANSITION_NOT_FOUND` when no proof was submitted for it yet.
    fn transition(
        &self,
        block_id: u64,
        parent_hash: B256,
    ) -> impl Future<Output = RpcResult<TransitionState>> + Send;

    /// Bond token balance available to `address`.
    fn bond_balance(&self, address: Address) -> impl Future<Output = RpcResult<U256>> + Send;

    fn block_proposed_events(
        &self,
        from: u64,
        to: u64,
    ) -> impl Future<Output = RpcResult<Vec<BlockProposedEvent>>> + Send;

    fn transition_proved_events(
        &self,
        from: u64,
        to: u64,
    ) -> impl Future<Output = RpcResult<Vec<TransitionProvedEvent>>> + Send;

    fn transition_contested_events(
        &self,
        from: u64,
        to: u64,
    ) -> impl Future<Output = RpcResult<Vec<TransitionContestedEvent>>> + Send;

    fn block_verified_events(
        &self,
        from: u64,
        to: u64,
    ) -> impl Future<Output = RpcResult<Vec<BlockVerifiedEvent>>> + Send;
}

/// A transaction to the protocol contract, signed by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolTx {
    pub nonce: u64,
    pub calldata: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub status: bool,
    pub block_number: u64,
}

pub trait TxClient: Send + Sync {
    fn pending_nonce(&self) -> impl Future<Output = RpcResult<u64>> + Send;

    /// Signs and broadcasts `tx`, returning its hash.
    fn send_protocol_tx(&self, tx: ProtocolTx) -> impl Future<Output = RpcResult<B256>> + Send;

    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = RpcResult<Option<TxReceipt>>> + Send;
}

/// Everything the prover needs from the chain.
pub trait ChainClient: L1Client + L2Client + ProtocolClient + TxClient + 'static {}

impl<T> ChainClient for T where T: L1Client + L2Client + ProtocolClient + TxClient + 'static {}
