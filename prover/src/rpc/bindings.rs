//! Solidity bindings of the L1 protocol contracts, plus the ABI helpers the
//! rest of the prover needs to hand calldata and signing payloads around.

use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};

use crate::proof_types::{Evidence, TierId};

sol! {
    struct BlockMetadata {
        bytes32 l1Hash;
        bytes32 difficulty;
        bytes32 txListHash;
        bytes32 extraData;
        address coinbase;
        uint64 id;
        uint32 gasLimit;
        uint64 timestamp;
        uint64 l1Height;
        uint16 minTier;
    }

    struct Transition {
        bytes32 parentHash;
        bytes32 blockHash;
        bytes32 signalRoot;
        bytes32 graffiti;
    }

    struct TransitionState {
        bytes32 key;
        bytes32 blockHash;
        bytes32 signalRoot;
        address prover;
        uint96 validityBond;
        address contester;
        uint96 contestBond;
        uint64 timestamp;
        uint16 tier;
        uint8 contestations;
    }

    struct Block {
        bytes32 metaHash;
        address assignedProver;
        uint96 livenessBond;
        uint64 blockId;
        uint64 proposedAt;
        uint64 proposedIn;
        uint32 nextTransitionId;
        uint32 verifiedTransitionId;
    }

    struct SlotA {
        uint64 genesisHeight;
        uint64 genesisTimestamp;
        uint64 numEthDeposits;
        uint64 nextEthDepositToProcess;
    }

    struct SlotB {
        uint64 numBlocks;
        uint64 lastVerifiedBlockId;
        bool provingPaused;
    }

    struct BlockEvidence {
        bytes32 metaHash;
        bytes32 parentHash;
        bytes32 blockHash;
        bytes32 signalRoot;
        bytes32 graffiti;
        uint16 tier;
        bytes proof;
    }

    struct Tier {
        bytes32 verifierName;
        uint96 validityBond;
        uint96 contestBond;
        uint24 cooldownWindow;
        uint16 provingWindow;
        uint8 maxBlocksToVerifyPerProof;
    }

    struct TierFee {
        uint16 tier;
        uint128 fee;
    }

    struct AssignmentPayload {
        string domain;
        address protocol;
        bytes32 txListHash;
        address feeToken;
        uint64 expiry;
        uint64 maxBlockId;
        uint64 maxProposedIn;
        TierFee[] tierFees;
    }

    #[sol(rpc)]
    interface ITaikoL1 {
        event BlockProposed(
            uint256 indexed blockId,
            address indexed assignedProver,
            uint96 livenessBond,
            BlockMetadata meta
        );
        event TransitionProved(
            uint256 indexed blockId,
            Transition tran,
            address prover,
            uint96 validityBond,
            uint16 tier
        );
        event TransitionContested(
            uint256 indexed blockId,
            Transition tran,
            address contester,
            uint96 contestBond,
            uint16 tier
        );
        event BlockVerified(
            uint256 indexed blockId,
            address indexed assignedProver,
            address indexed prover,
            bytes32 blockHash,
            bytes32 signalRoot,
            uint16 tier,
            uint8 contestations
        );

        function getStateVariables() external view returns (SlotA memory a, SlotB memory b);
        function getBlock(uint64 blockId) external view returns (Block memory blk);
        function getTransition(uint64 blockId, bytes32 parentHash)
            external
            view
            returns (TransitionState memory);
        function proveBlock(uint64 blockId, bytes calldata input) external;
    }

    #[sol(rpc)]
    interface ITierProvider {
        function getTierIds() external view returns (uint16[] memory);
        function getTier(uint16 tierId) external view returns (Tier memory);
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Custom errors of the protocol contracts, decoded from revert data by
/// selector.
const PROTOCOL_ERRORS: &[&str] = &[
    "L1_ALREADY_CONTESTED()",
    "L1_ALREADY_PROVED()",
    "L1_ASSIGNMENT_EXPIRED()",
    "L1_BLOCK_MISMATCH()",
    "L1_INVALID_BLOCK_ID()",
    "L1_INVALID_PARAM()",
    "L1_INVALID_PAUSE_STATUS()",
    "L1_INVALID_TIER()",
    "L1_INVALID_TRANSITION()",
    "L1_NOT_ASSIGNED_PROVER()",
    "L1_NOT_SPECIAL_PROVER()",
    "L1_TRANSITION_ID_ZERO()",
    "L1_TRANSITION_NOT_FOUND()",
    "L1_UNEXPECTED_TRANSITION_ID()",
    "L1_UNEXPECTED_TRANSITION_TIER()",
];

/// Decodes the name of a protocol custom error from raw revert data.
pub fn decode_protocol_error(data: &[u8]) -> Option<&'static str> {
    let selector = data.get(..4)?;
    PROTOCOL_ERRORS
        .iter()
        .find(|sig| &keccak256(sig.as_bytes())[..4] == selector)
        .and_then(|sig| sig.split('(').next())
}

impl From<&Evidence> for BlockEvidence {
    fn from(e: &Evidence) -> Self {
        Self {
            metaHash: e.meta_hash,
            parentHash: e.parent_hash,
            blockHash: e.block_hash,
            signalRoot: e.signal_root,
            graffiti: e.graffiti,
            tier: e.tier,
            proof: e.proof.clone(),
        }
    }
}

/// The ABI encoding of `evidence`, the `input` of `proveBlock`.
pub fn encode_evidence(evidence: &Evidence) -> Bytes {
    BlockEvidence::from(evidence).abi_encode().into()
}

/// The digest signed by the signature based tiers.
pub fn evidence_signing_hash(evidence: &Evidence) -> B256 {
    keccak256(encode_evidence(evidence))
}

/// Calldata of the `proveBlock` call submitting `evidence` for `block_id`.
pub fn prove_block_calldata(block_id: u64, evidence: &Evidence) -> Bytes {
    ITaikoL1::proveBlockCall {
        blockId: block_id,
        input: encode_evidence(evidence),
    }
    .abi_encode()
    .into()
}

/// Digest a prover signs when accepting to prove a block for the given fees.
pub fn assignment_hash(
    protocol: Address,
    tx_list_hash: B256,
    fee_token: Address,
    expiry: u64,
    max_block_id: u64,
    max_proposed_in: u64,
    tier_fees: &[(TierId, u128)],
) -> B256 {
    let payload = AssignmentPayload {
        domain: "PROVER_ASSIGNMENT".to_string(),
        protocol,
        txListHash: tx_list_hash,
        feeToken: fee_token,
        expiry,
        maxBlockId: max_block_id,
        maxProposedIn: max_proposed_in,
        tierFees: tier_fees
            .iter()
            .map(|&(tier, fee)| TierFee { tier, fee })
            .collect(),
    };
    keccak256(payload.abi_encode())
}
