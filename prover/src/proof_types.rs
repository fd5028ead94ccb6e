//! This module defines the data flowing through the proof lifecycle: chain
//! views handed out by the RPC clients, the events the handlers react to, and
//! the request / result / evidence triple moved between the proving stages.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A protocol tier identifier, see [`rollup_common::tiers`].
pub type TierId = u16;

/// Tier configuration as exposed by the protocol's tier provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierInfo {
    pub id: TierId,
    pub validity_bond: U256,
    pub contest_bond: U256,
    /// Cooldown window, in minutes.
    pub cooldown_window: u64,
    /// Proving window, in minutes.
    pub proving_window: u64,
}

impl TierInfo {
    pub fn proving_window(&self) -> Duration {
        Duration::from_secs(self.proving_window * 60)
    }
}

/// The subset of an L1 header the prover cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1Header {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: u64,
    pub timestamp: u64,
}

/// The subset of an L2 header the prover cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: u64,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    pub timestamp: u64,
    pub gas_used: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct L2Transaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct L2Receipt {
    pub tx_hash: B256,
    pub status: bool,
    /// EIP-2718 encoding of the receipt, the value stored in the receipts
    /// trie.
    pub encoded: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct L2Block {
    pub header: BlockHeader,
    pub transactions: Vec<L2Transaction>,
}

/// The L1 block an L2 block was derived from, as recorded by the L2 execution
/// engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1Origin {
    pub block_id: u64,
    pub l2_block_hash: B256,
    pub l1_block_height: u64,
    pub l1_block_hash: B256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub id: u64,
    pub l1_hash: B256,
    pub l1_height: u64,
    pub tx_list_hash: B256,
    pub coinbase: Address,
    pub gas_limit: u32,
    pub timestamp: u64,
    pub min_tier: TierId,
}

/// Location of an event log on L1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRaw {
    pub l1_block_hash: B256,
    pub l1_block_number: u64,
    pub tx_hash: B256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProposedEvent {
    pub block_id: u64,
    pub assigned_prover: Address,
    pub liveness_bond: U256,
    pub meta: BlockMetadata,
    pub raw: EventRaw,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub parent_hash: B256,
    pub block_hash: B256,
    pub signal_root: B256,
    pub graffiti: B256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionProvedEvent {
    pub block_id: u64,
    pub tran: Transition,
    pub prover: Address,
    pub validity_bond: U256,
    pub tier: TierId,
    pub raw: EventRaw,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionContestedEvent {
    pub block_id: u64,
    pub tran: Transition,
    pub contester: Address,
    pub contest_bond: U256,
    pub tier: TierId,
    pub raw: EventRaw,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVerifiedEvent {
    pub block_id: u64,
    pub prover: Address,
    pub block_hash: B256,
    pub tier: TierId,
    pub raw: EventRaw,
}

/// On-chain record of a block's current transition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionState {
    pub block_hash: B256,
    pub signal_root: B256,
    pub prover: Address,
    pub validity_bond: U256,
    pub contester: Address,
    pub contest_bond: U256,
    pub timestamp: u64,
    pub tier: TierId,
}

/// Per block protocol bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block_id: u64,
    pub meta_hash: B256,
    pub assigned_prover: Address,
    pub proposed_at: u64,
    pub proposed_in: u64,
    pub next_transition_id: u32,
    pub verified_transition_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVariables {
    pub genesis_height: u64,
    pub genesis_timestamp: u64,
    pub num_blocks: u64,
    pub last_verified_block_id: u64,
}

/// Everything a producer, and later the evidence assembler, needs to know
/// about the block being proven. Built once per request and never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequestOptions {
    pub block_id: u64,
    pub prover_address: Address,
    pub propose_block_tx_hash: B256,
    /// Address of the L2 protocol contract, the anchor transaction target.
    pub l2_protocol_address: Address,
    pub l1_signal_service: Address,
    pub l2_signal_service: Address,
    pub meta_hash: B256,
    pub block_hash: B256,
    pub parent_hash: B256,
    pub signal_root: B256,
    pub graffiti: B256,
    /// Height and hash of the L1 block holding the `BlockProposed` event,
    /// compared again right before submission to detect reorgs.
    pub event_l1_height: u64,
    pub event_l1_hash: B256,
}

/// The work unit handed to a [`ProofProducer`](crate::producer::ProofProducer).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofRequest {
    pub block_id: u64,
    pub meta: BlockMetadata,
    pub header: BlockHeader,
    pub opts: ProofRequestOptions,
    /// The tier the producer is asked to target.
    pub tier: TierId,
}

/// A proof (or signature, for the signer tiers) delivered by a producer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofResult {
    pub block_id: u64,
    pub meta: BlockMetadata,
    pub header: BlockHeader,
    pub proof: Bytes,
    /// Circuit degree reported by ZK proving services, zero otherwise.
    pub degree: u64,
    pub opts: ProofRequestOptions,
    pub tier: TierId,
}

impl ProofResult {
    /// Wraps `proof` as the answer to `request`.
    pub fn for_request(request: ProofRequest, proof: Bytes, degree: u64) -> Self {
        Self {
            block_id: request.block_id,
            meta: request.meta,
            header: request.header,
            proof,
            degree,
            opts: request.opts,
            tier: request.tier,
        }
    }
}

/// The protocol encodable proof submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub meta_hash: B256,
    pub parent_hash: B256,
    pub block_hash: B256,
    pub signal_root: B256,
    pub graffiti: B256,
    pub tier: TierId,
    pub proof: Bytes,
}

/// A queued request for a proof of `event`'s block, at `tier` or above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofRequestBody {
    pub tier: TierId,
    pub event: BlockProposedEvent,
}

/// Where the protocol currently stands regarding a block's proof, from this
/// prover's point of view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockProofStatus {
    pub is_submitted: bool,
    /// The submitted transition disagrees with the local L2 view.
    pub invalid: bool,
    pub current_transition: Option<TransitionState>,
    pub parent_hash: B256,
}
