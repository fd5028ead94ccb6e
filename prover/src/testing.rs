//! In-memory chain used by the unit tests.
//!
//! L2 block `k` is proposed in L1 block `GENESIS_HEIGHT + k`, and its L1 origin
//! points at that block. Every L2 block starts with a valid anchor
//! transaction and carries one user transaction.

use std::collections::{BTreeMap, HashMap, VecDeque};

use alloy::primitives::{address, keccak256, Address, Bytes, B256, U256};
use parking_lot::Mutex;
use rollup_common::{anchor_selector, tiers, GOLDEN_TOUCH_ADDRESS, TRANSITION_NOT_FOUND_ERROR};

use crate::proof_types::{
    BlockHeader, BlockInfo, BlockMetadata, BlockProposedEvent, BlockVerifiedEvent, EventRaw,
    L1Header, L1Origin, L2Block, L2Receipt, L2Transaction, ProofRequest, ProofRequestOptions,
    StateVariables, TierId, TierInfo, TransitionContestedEvent, TransitionProvedEvent,
    TransitionState,
};
use crate::rpc::{
    L1Client, L2Client, ProtocolClient, ProtocolTx, RpcError, RpcResult, TxClient, TxReceipt,
};
use crate::trie_proof::compute_root;

pub const GENESIS_HEIGHT: u64 = 100;
pub const L2_PROTOCOL_ADDRESS: Address = address!("1670000000000000000000000000000000010001");
pub const L2_SIGNAL_SERVICE: Address = address!("1670000000000000000000000000000000000005");
pub const ASSIGNED_PROVER: Address = address!("00000000000000000000000000000000000000aa");

fn hash_of(tag: &str, n: u64) -> B256 {
    keccak256(format!("{tag}-{n}"))
}

pub fn default_tiers() -> Vec<TierInfo> {
    [
        tiers::OPTIMISTIC,
        tiers::SGX,
        tiers::SGX_AND_ZKVM,
        tiers::GUARDIAN_MINORITY,
        tiers::GUARDIAN,
    ]
    .into_iter()
    .map(|id| TierInfo {
        id,
        validity_bond: U256::from(id) * U256::from(1_000u64),
        contest_bond: U256::from(id) * U256::from(2_000u64),
        cooldown_window: 60,
        proving_window: 60,
    })
    .collect()
}

#[derive(Clone, Debug)]
struct FakeL2Block {
    block: L2Block,
    receipts: Vec<L2Receipt>,
    signal_root: B256,
}

#[derive(Debug, Default)]
struct FakeState {
    l1_headers: BTreeMap<u64, L1Header>,
    l2_blocks: BTreeMap<u64, FakeL2Block>,
    l1_origins: HashMap<u64, L1Origin>,
    transitions: HashMap<u64, TransitionState>,
    state_vars: StateVariables,
    tiers: Vec<TierInfo>,
    proposed: Vec<BlockProposedEvent>,
    proved: Vec<TransitionProvedEvent>,
    contested: Vec<TransitionContestedEvent>,
    verified: Vec<BlockVerifiedEvent>,
    bond_balance: U256,
    nonce: u64,
    sent: Vec<ProtocolTx>,
    receipts: HashMap<B256, TxReceipt>,
    send_errors: VecDeque<RpcError>,
    receipt_status: bool,
    withhold_receipts: bool,
}

#[derive(Debug, Default)]
pub struct FakeChain {
    state: Mutex<FakeState>,
}

fn l1_header(number: u64, tag: &str) -> L1Header {
    L1Header {
        hash: hash_of(tag, number),
        parent_hash: hash_of("l1", number.saturating_sub(1)),
        number,
        timestamp: number * 12,
    }
}

fn l2_block(k: u64) -> FakeL2Block {
    let mut anchor_input = anchor_selector().to_vec();
    anchor_input.extend_from_slice(&[0u8; 128]);
    let transactions = vec![
        L2Transaction {
            hash: hash_of("anchor-tx", k),
            from: GOLDEN_TOUCH_ADDRESS,
            to: Some(L2_PROTOCOL_ADDRESS),
            input: Bytes::from(anchor_input),
        },
        L2Transaction {
            hash: hash_of("user-tx", k),
            from: Address::repeat_byte(0x42),
            to: Some(Address::repeat_byte(0x43)),
            input: Bytes::new(),
        },
    ];
    let receipts: Vec<L2Receipt> = transactions
        .iter()
        .map(|tx| L2Receipt {
            tx_hash: tx.hash,
            status: true,
            encoded: Bytes::from(format!("receipt-of-{}", tx.hash).into_bytes()),
        })
        .collect();
    let encoded: Vec<&[u8]> = receipts.iter().map(|r| r.encoded.as_ref()).collect();
    let receipts_root = compute_root(&encoded).expect("in-memory trie");

    FakeL2Block {
        block: L2Block {
            header: BlockHeader {
                hash: hash_of("l2", k),
                parent_hash: hash_of("l2", k.saturating_sub(1)),
                number: k,
                state_root: hash_of("state", k),
                transactions_root: hash_of("txs", k),
                receipts_root,
                timestamp: 1_000 + k * 12,
                gas_used: 21_000,
            },
            transactions,
        },
        receipts,
        signal_root: hash_of("signal", k),
    }
}

impl FakeChain {
    /// A chain with L2 blocks `0..n`, block 0 being the genesis.
    pub fn with_blocks(n: u64) -> Self {
        let mut state = FakeState {
            tiers: default_tiers(),
            bond_balance: U256::from(u64::MAX),
            receipt_status: true,
            state_vars: StateVariables {
                genesis_height: GENESIS_HEIGHT,
                genesis_timestamp: 1_000,
                num_blocks: n,
                last_verified_block_id: 0,
            },
            ..Default::default()
        };

        for number in GENESIS_HEIGHT..=GENESIS_HEIGHT + n + 1 {
            state.l1_headers.insert(number, l1_header(number, "l1"));
        }

        for k in 0..n {
            let block = l2_block(k);
            let l1_height = GENESIS_HEIGHT + k;
            let l1_hash = hash_of("l1", l1_height);
            state.l1_origins.insert(
                k,
                L1Origin {
                    block_id: k,
                    l2_block_hash: block.block.header.hash,
                    l1_block_height: l1_height,
                    l1_block_hash: l1_hash,
                },
            );
            if k > 0 {
                state.proposed.push(BlockProposedEvent {
                    block_id: k,
                    assigned_prover: ASSIGNED_PROVER,
                    liveness_bond: U256::from(1_000u64),
                    meta: BlockMetadata {
                        id: k,
                        l1_hash: hash_of("l1", l1_height - 1),
                        l1_height: l1_height - 1,
                        tx_list_hash: hash_of("tx-list", k),
                        coinbase: Address::repeat_byte(0xcb),
                        gas_limit: 15_000_000,
                        timestamp: block.block.header.timestamp,
                        min_tier: tiers::SGX,
                    },
                    raw: EventRaw {
                        l1_block_hash: l1_hash,
                        l1_block_number: l1_height,
                        tx_hash: hash_of("propose-tx", k),
                    },
                });
            }
            state.l2_blocks.insert(k, block);
        }

        Self {
            state: Mutex::new(state),
        }
    }

    pub fn genesis_height(&self) -> u64 {
        self.state.lock().state_vars.genesis_height
    }

    pub fn l2_signal_service(&self) -> Address {
        L2_SIGNAL_SERVICE
    }

    pub fn l1_origin(&self, block_id: u64) -> L1Origin {
        self.state.lock().l1_origins[&block_id].clone()
    }

    pub fn l2_header(&self, block_id: u64) -> BlockHeader {
        self.state.lock().l2_blocks[&block_id].block.header.clone()
    }

    pub fn local_signal_root(&self, block_id: u64) -> B256 {
        self.state.lock().l2_blocks[&block_id].signal_root
    }

    pub fn proposed_event(&self, block_id: u64) -> BlockProposedEvent {
        self.state
            .lock()
            .proposed
            .iter()
            .find(|e| e.block_id == block_id)
            .cloned()
            .expect("block was proposed")
    }

    /// A request for a proof of `block_id` targeting `tier`, filled from the
    /// chain the way the submitter would.
    pub fn proof_request(&self, block_id: u64, tier: TierId) -> ProofRequest {
        let event = self.proposed_event(block_id);
        let header = self.l2_header(block_id);
        let parent = self.l2_header(block_id - 1);
        ProofRequest {
            block_id,
            meta: event.meta.clone(),
            tier,
            opts: ProofRequestOptions {
                block_id,
                prover_address: ASSIGNED_PROVER,
                propose_block_tx_hash: event.raw.tx_hash,
                l2_protocol_address: L2_PROTOCOL_ADDRESS,
                l1_signal_service: Address::repeat_byte(0x05),
                l2_signal_service: L2_SIGNAL_SERVICE,
                meta_hash: hash_of("meta", block_id),
                block_hash: header.hash,
                parent_hash: parent.hash,
                signal_root: self.local_signal_root(block_id),
                graffiti: B256::ZERO,
                event_l1_height: event.raw.l1_block_number,
                event_l1_hash: event.raw.l1_block_hash,
            },
            header,
        }
    }

    /// Replaces the L1 block `block_id` was derived from, as an L1
    /// reorg would.
    pub fn reorg_l1_origin(&self, block_id: u64) {
        let mut state = self.state.lock();
        let height = state.l1_origins[&block_id].l1_block_height;
        state
            .l1_headers
            .insert(height, l1_header(height, "l1-reorged"));
    }

    pub fn remove_l1_origin(&self, block_id: u64) {
        self.state.lock().l1_origins.remove(&block_id);
    }

    pub fn set_transition(&self, block_id: u64, transition: TransitionState) {
        self.state.lock().transitions.insert(block_id, transition);
    }

    pub fn set_last_verified_block_id(&self, block_id: u64) {
        self.state.lock().state_vars.last_verified_block_id = block_id;
    }

    pub fn set_bond_balance(&self, balance: U256) {
        self.state.lock().bond_balance = balance;
    }

    pub fn set_receipt_status(&self, status: bool) {
        self.state.lock().receipt_status = status;
    }

    /// Transactions are accepted but never mined.
    pub fn withhold_receipts(&self) {
        self.state.lock().withhold_receipts = true;
    }

    /// The next `send_protocol_tx` calls fail with these errors, in order.
    pub fn push_send_error(&self, err: RpcError) {
        self.state.lock().send_errors.push_back(err);
    }

    pub fn sent_txs(&self) -> Vec<ProtocolTx> {
        self.state.lock().sent.clone()
    }

    pub fn set_transactions(&self, block_id: u64, transactions: Vec<L2Transaction>) {
        let mut state = self.state.lock();
        if let Some(block) = state.l2_blocks.get_mut(&block_id) {
            block.block.transactions = transactions;
        }
    }

    pub fn set_receipts_root(&self, block_id: u64, root: B256) {
        let mut state = self.state.lock();
        if let Some(block) = state.l2_blocks.get_mut(&block_id) {
            block.block.header.receipts_root = root;
        }
    }

    pub fn set_receipt_success(&self, block_id: u64, index: usize, status: bool) {
        let mut state = self.state.lock();
        if let Some(receipt) = state
            .l2_blocks
            .get_mut(&block_id)
            .and_then(|b| b.receipts.get_mut(index))
        {
            receipt.status = status;
        }
    }

    pub fn push_proved_event(&self, event: TransitionProvedEvent) {
        self.state.lock().proved.push(event);
    }

    pub fn push_contested_event(&self, event: TransitionContestedEvent) {
        self.state.lock().contested.push(event);
    }

    pub fn push_verified_event(&self, event: BlockVerifiedEvent) {
        self.state.lock().verified.push(event);
    }
}

impl L1Client for FakeChain {
    async fn l1_header_by_number(&self, number: u64) -> RpcResult<L1Header> {
        self.state
            .lock()
            .l1_headers
            .get(&number)
            .cloned()
            .ok_or_else(|| RpcError::not_found(format!("L1 block {number}")))
    }

    async fn l1_header_by_hash(&self, hash: B256) -> RpcResult<L1Header> {
        self.state
            .lock()
            .l1_headers
            .values()
            .find(|h| h.hash == hash)
            .cloned()
            .ok_or_else(|| RpcError::not_found(format!("L1 block {hash}")))
    }

    async fn l1_block_number(&self) -> RpcResult<u64> {
        Ok(self
            .state
            .lock()
            .l1_headers
            .keys()
            .next_back()
            .copied()
            .unwrap_or_default())
    }
}

impl FakeState {
    fn l2_block_by_hash(&self, hash: B256) -> RpcResult<&FakeL2Block> {
        self.l2_blocks
            .values()
            .find(|b| b.block.header.hash == hash)
            .ok_or_else(|| RpcError::not_found(format!("L2 block {hash}")))
    }
}

impl L2Client for FakeChain {
    async fn l1_origin_by_id(&self, block_id: u64) -> RpcResult<L1Origin> {
        self.state
            .lock()
            .l1_origins
            .get(&block_id)
            .cloned()
            .ok_or_else(|| RpcError::not_found(format!("L1 origin of {block_id}")))
    }

    async fn l2_header_by_number(&self, number: u64) -> RpcResult<BlockHeader> {
        self.state
            .lock()
            .l2_blocks
            .get(&number)
            .map(|b| b.block.header.clone())
            .ok_or_else(|| RpcError::not_found(format!("L2 block {number}")))
    }

    async fn l2_header_by_hash(&self, hash: B256) -> RpcResult<BlockHeader> {
        let state = self.state.lock();
        state.l2_block_by_hash(hash).map(|b| b.block.header.clone())
    }

    async fn l2_block_by_hash(&self, hash: B256) -> RpcResult<L2Block> {
        let state = self.state.lock();
        state.l2_block_by_hash(hash).map(|b| b.block.clone())
    }

    async fn l2_receipts(&self, block_hash: B256) -> RpcResult<Vec<L2Receipt>> {
        let state = self.state.lock();
        state.l2_block_by_hash(block_hash).map(|b| b.receipts.clone())
    }

    async fn signal_root(&self, _signal_service: Address, block_hash: B256) -> RpcResult<B256> {
        let state = self.state.lock();
        state.l2_block_by_hash(block_hash).map(|b| b.signal_root)
    }
}

impl ProtocolClient for FakeChain {
    async fn protocol_tiers(&self) -> RpcResult<Vec<TierInfo>> {
        Ok(self.state.lock().tiers.clone())
    }

    async fn state_variables(&self) -> RpcResult<StateVariables> {
        Ok(self.state.lock().state_vars.clone())
    }

    async fn block_info(&self, block_id: u64) -> RpcResult<BlockInfo> {
        let state = self.state.lock();
        let event = state
            .proposed
            .iter()
            .find(|e| e.block_id == block_id)
            .ok_or_else(|| RpcError::Revert("L1_INVALID_BLOCK_ID".to_string()))?;
        Ok(BlockInfo {
            block_id,
            meta_hash: hash_of("meta", block_id),
            assigned_prover: event.assigned_prover,
            proposed_at: event.meta.timestamp,
            proposed_in: event.raw.l1_block_number,
            next_transition_id: 1 + u32::from(state.transitions.contains_key(&block_id)),
            verified_transition_id: 0,
        })
    }

    async fn transition(&self, block_id: u64, _parent_hash: B256) -> RpcResult<TransitionState> {
        self.state
            .lock()
            .transitions
            .get(&block_id)
            .cloned()
            .ok_or_else(|| RpcError::Revert(TRANSITION_NOT_FOUND_ERROR.to_string()))
    }

    async fn bond_balance(&self, _address: Address) -> RpcResult<U256> {
        Ok(self.state.lock().bond_balance)
    }

    async fn block_proposed_events(&self, from: u64, to: u64) -> RpcResult<Vec<BlockProposedEvent>> {
        Ok(self
            .state
            .lock()
            .proposed
            .iter()
            .filter(|e| (from..=to).contains(&e.raw.l1_block_number))
            .cloned()
            .collect())
    }

    async fn transition_proved_events(
        &self,
        from: u64,
        to: u64,
    ) -> RpcResult<Vec<TransitionProvedEvent>> {
        Ok(self
            .state
            .lock()
            .proved
            .iter()
            .filter(|e| (from..=to).contains(&e.raw.l1_block_number))
            .cloned()
            .collect())
    }

    async fn transition_contested_events(
        &self,
        from: u64,
        to: u64,
    ) -> RpcResult<Vec<TransitionContestedEvent>> {
        Ok(self
            .state
            .lock()
            .contested
            .iter()
            .filter(|e| (from..=to).contains(&e.raw.l1_block_number))
            .cloned()
            .collect())
    }

    async fn block_verified_events(&self, from: u64, to: u64) -> RpcResult<Vec<BlockVerifiedEvent>> {
        Ok(self
            .state
            .lock()
            .verified
            .iter()
            .filter(|e| (from..=to).contains(&e.raw.l1_block_number))
            .cloned()
            .collect())
    }
}

impl TxClient for FakeChain {
    async fn pending_nonce(&self) -> RpcResult<u64> {
        Ok(self.state.lock().nonce)
    }

    async fn send_protocol_tx(&self, tx: ProtocolTx) -> RpcResult<B256> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_errors.pop_front() {
            return Err(err);
        }
        if tx.nonce < state.nonce {
            return Err(RpcError::NonceTooLow);
        }

        let tx_hash = keccak256([&tx.nonce.to_be_bytes()[..], &tx.calldata[..]].concat());
        state.nonce = tx.nonce + 1;
        state.sent.push(tx);
        if !state.withhold_receipts {
            let block_number = state.l1_headers.keys().next_back().copied().unwrap_or_default();
            let status = state.receipt_status;
            state.receipts.insert(
                tx_hash,
                TxReceipt {
                    tx_hash,
                    status,
                    block_number,
                },
            );
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> RpcResult<Option<TxReceipt>> {
        Ok(self.state.lock().receipts.get(&tx_hash).cloned())
    }
}
