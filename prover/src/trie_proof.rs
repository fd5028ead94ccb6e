//! Merkle Patricia inclusion proofs over ordered lists, the way Ethereum
//! commits to a block's transactions and receipts: item `i` is stored under
//! the key `rlp(i)`.

use std::sync::Arc;

use alloy::primitives::B256;
use eth_trie::{EthTrie, MemoryDB, Trie, TrieError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieProofError {
    #[error("trie error: {0}")]
    Trie(String),

    #[error("computed root {computed} does not match expected root {expected}")]
    RootMismatch { computed: B256, expected: B256 },

    #[error("index {index} out of range for a list of {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("proof does not prove any value for key 0x{}", hex::encode(.0))]
    Absent(Vec<u8>),
}

impl From<TrieError> for TrieProofError {
    fn from(e: TrieError) -> Self {
        TrieProofError::Trie(format!("{e:?}"))
    }
}

pub type TrieProofResult<T> = Result<T, TrieProofError>;

/// An inclusion proof of the item stored under `key` in the trie rooted at
/// `root`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrieProof {
    pub root: B256,
    pub key: Vec<u8>,
    pub nodes: Vec<Vec<u8>>,
}

/// The trie key of the item at `index`.
pub fn list_key(index: usize) -> Vec<u8> {
    rlp::encode(&(index as u64)).to_vec()
}

// `eth_trie` pulls its own copy of the `H256` type, let inference pick it.
fn to_trie_hash<H: From<[u8; 32]>>(hash: B256) -> H {
    H::from(hash.0)
}

fn build_trie<I: AsRef<[u8]>>(items: &[I]) -> TrieProofResult<EthTrie<MemoryDB>> {
    let mut trie = EthTrie::new(Arc::new(MemoryDB::new(true)));
    for (i, item) in items.iter().enumerate() {
        trie.insert(&list_key(i), item.as_ref())?;
    }
    Ok(trie)
}

/// Root of the trie committing to `items`.
pub fn compute_root<I: AsRef<[u8]>>(items: &[I]) -> TrieProofResult<B256> {
    let mut trie = build_trie(items)?;
    Ok(B256::from(trie.root_hash()?.0))
}

/// Builds the inclusion proof of `items[index]`, after checking the list
/// actually commits to `expected_root`.
pub fn generate_trie_proof<I: AsRef<[u8]>>(
    items: &[I],
    index: usize,
    expected_root: B256,
) -> TrieProofResult<TrieProof> {
    if index >= items.len() {
        return Err(TrieProofError::IndexOutOfRange {
            index,
            len: items.len(),
        });
    }

    let mut trie = build_trie(items)?;
    let root = trie.root_hash()?;
    let computed = B256::from(root.0);
    if computed != expected_root {
        return Err(TrieProofError::RootMismatch {
            computed,
            expected: expected_root,
        });
    }

    let key = list_key(index);
    let nodes = trie.get_proof(&key)?;
    Ok(TrieProof {
        root: computed,
        key,
        nodes,
    })
}

/// Checks `proof` and returns the value it proves.
pub fn verify_trie_proof(proof: &TrieProof) -> TrieProofResult<Vec<u8>> {
    let trie = EthTrie::new(Arc::new(MemoryDB::new(true)));
    trie.verify_proof(to_trie_hash(proof.root), &proof.key, proof.nodes.clone())?
        .ok_or_else(|| TrieProofError::Absent(proof.key.clone()))
}
