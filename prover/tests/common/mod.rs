use alloy::primitives::{Address, B256};
use rollup_prover::proof_types::{ProofRequest, ProofRequestOptions, TierId};

/// A request carrying just enough data to tell results apart.
pub fn proof_request(block_id: u64, tier: TierId) -> ProofRequest {
    ProofRequest {
        block_id,
        tier,
        opts: ProofRequestOptions {
            block_id,
            prover_address: Address::repeat_byte(0xaa),
            block_hash: B256::with_last_byte(block_id as u8),
            ..Default::default()
        },
        ..Default::default()
    }
}
