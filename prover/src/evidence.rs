//! Turns a producer's [`ProofResult`] into the [`Evidence`] submitted to the
//! protocol, after checking the proven L2 block is well formed.

use std::sync::Arc;

use alloy::primitives::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::anchor::{AnchorError, AnchorTxValidator};
use crate::proof_types::{Evidence, ProofResult};
use crate::rpc::{L2Client, RpcError};
use crate::trie_proof::{generate_trie_proof, verify_trie_proof, TrieProofError};

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("L2 block {0} has no transactions")]
    EmptyBlock(u64),

    #[error("L2 block {0} has no receipt for its anchor transaction")]
    MissingAnchorReceipt(u64),

    #[error("invalid anchor in L2 block {block_id}: {source}")]
    Anchor {
        block_id: u64,
        #[source]
        source: AnchorError,
    },

    #[error(transparent)]
    TrieProof(#[from] TrieProofError),

    #[error("receipts proof of L2 block {0} does not prove the anchor receipt")]
    ProofValueMismatch(u64),

    #[error("unsupported circuit degree {0}")]
    UnsupportedDegree(u64),
}

/// Index of the verifier circuit the protocol uses for proofs of the given
/// degree.
pub fn circuit_index(degree: u64) -> Result<u16, EvidenceError> {
    match degree {
        21 => Ok(0),
        22 => Ok(1),
        other => Err(EvidenceError::UnsupportedDegree(other)),
    }
}

/// Prefixes `proof` with the big endian circuit index of `degree`. Proofs
/// without a degree, i.e. not coming from a circuit, are left untouched.
pub fn with_circuit_prefix(proof: &Bytes, degree: u64) -> Result<Bytes, EvidenceError> {
    if degree == 0 {
        return Ok(proof.clone());
    }
    let index = circuit_index(degree)?;
    let mut prefixed = Vec::with_capacity(proof.len() + 2);
    prefixed.extend_from_slice(&index.to_be_bytes());
    prefixed.extend_from_slice(proof);
    Ok(prefixed.into())
}

pub struct EvidenceAssembler<C> {
    client: Arc<C>,
    anchor_validator: AnchorTxValidator,
}

impl<C: L2Client> EvidenceAssembler<C> {
    pub fn new(client: Arc<C>, anchor_validator: AnchorTxValidator) -> Self {
        Self {
            client,
            anchor_validator,
        }
    }

    pub async fn build(&self, result: &ProofResult) -> Result<Evidence, EvidenceError> {
        let block_id = result.block_id;
        let block = self.client.l2_block_by_hash(result.opts.block_hash).await?;

        let anchor_tx = block
            .transactions
            .first()
            .ok_or(EvidenceError::EmptyBlock(block_id))?;
        self.anchor_validator
            .validate_anchor_tx(anchor_tx)
            .map_err(|source| EvidenceError::Anchor { block_id, source })?;

        let receipts = self.client.l2_receipts(block.header.hash).await?;
        let anchor_receipt = receipts
            .first()
            .ok_or(EvidenceError::MissingAnchorReceipt(block_id))?;
        self.anchor_validator
            .validate_anchor_receipt(anchor_tx, anchor_receipt)
            .map_err(|source| EvidenceError::Anchor { block_id, source })?;

        let encoded: Vec<&[u8]> = receipts.iter().map(|r| r.encoded.as_ref()).collect();
        let proof = generate_trie_proof(&encoded, 0, block.header.receipts_root)?;
        if verify_trie_proof(&proof)? != anchor_receipt.encoded.as_ref() {
            return Err(EvidenceError::ProofValueMismatch(block_id));
        }
        debug!(
            block_id,
            receipts_root = %proof.root,
            nodes = proof.nodes.len(),
            "Anchor receipt inclusion proven"
        );

        Ok(Evidence {
            meta_hash: result.opts.meta_hash,
            parent_hash: result.opts.parent_hash,
            block_hash: result.opts.block_hash,
            signal_root: result.opts.signal_root,
            graffiti: result.opts.graffiti,
            tier: result.tier,
            proof: with_circuit_prefix(&result.proof, result.degree)?,
        })
    }
}
