use alloy::primitives::{address, b256, keccak256, Address, B256, U256};

/// The hash of an empty Merkle Patricia trie.
/// 0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421
pub const EMPTY_TRIE_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// The address every L2 anchor transaction is sent from.
pub const GOLDEN_TOUCH_ADDRESS: Address = address!("0000777735367b36bC9B61C50022d9D0700dB4Ec");

/// Solidity signature of the L2 protocol's anchor entrypoint.
pub const ANCHOR_SIGNATURE: &str = "anchor(bytes32,bytes32,uint64,uint32)";

/// Prefix shared by every custom revert reason of the L1 protocol contract.
pub const PROTOCOL_ERROR_PREFIX: &str = "L1_";

/// The only protocol revert which still deserves a retry, the special prover
/// may change between two attempts.
pub const NOT_SPECIAL_PROVER_ERROR: &str = "L1_NOT_SPECIAL_PROVER";

/// Revert returned by the transition lookup when no transition exists yet.
pub const TRANSITION_NOT_FOUND_ERROR: &str = "L1_TRANSITION_NOT_FOUND";

/// Payload hashed by guardians that only want their liveness bond back.
pub const RETURN_LIVENESS_BOND: &[u8] = b"RETURN_LIVENESS_BOND";

/// Tier identifiers recognized by the protocol, in ascending trust order.
pub mod tiers {
    pub const OPTIMISTIC: u16 = 100;
    pub const SGX: u16 = 200;
    pub const SGX_AND_ZKVM: u16 = 300;
    pub const ORACLE: u16 = 800;
    pub const GUARDIAN_MINORITY: u16 = 900;
    pub const GUARDIAN: u16 = 1000;

    /// Human readable tier name, for logs.
    pub fn name(tier: u16) -> &'static str {
        match tier {
            OPTIMISTIC => "optimistic",
            SGX => "sgx",
            SGX_AND_ZKVM => "sgx_and_zkvm",
            ORACLE => "oracle",
            GUARDIAN_MINORITY => "guardian_minority",
            GUARDIAN => "guardian",
            _ => "unknown",
        }
    }
}

/// Four byte selector of the anchor entrypoint.
pub fn anchor_selector() -> [u8; 4] {
    let hash = keccak256(ANCHOR_SIGNATURE.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Converts an amount in `ETH` to `wei` units.
pub fn eth_to_wei(eth: U256) -> U256 {
    // 1 ether = 10^18 wei.
    eth * U256::from(10).pow(U256::from(18))
}

/// Converts an amount in `gwei` to `wei` units.
/// This also works for converting `ETH` to `gwei`.
pub fn gwei_to_wei(gwei: U256) -> U256 {
    // 1 ether = 10^9 gwei = 10^18 wei.
    gwei * U256::from(10).pow(U256::from(9))
}

#[test]
fn test_eth_conversion() {
    assert_eq!(
        eth_to_wei(U256::from(1)),
        gwei_to_wei(gwei_to_wei(U256::from(1)))
    );
}

#[test]
fn test_empty_trie_hash() {
    assert_eq!(EMPTY_TRIE_HASH, keccak256(rlp::NULL_RLP));
}

#[test]
fn test_tier_names() {
    assert_eq!(tiers::name(tiers::SGX), "sgx");
    assert_eq!(tiers::name(42), "unknown");
}
