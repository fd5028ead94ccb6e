//! [`ChainClient`] over alloy HTTP providers.
//!
//! Read calls go through the retrying transport of [`super::retry`], so only
//! errors that survived the retries reach the callers. Headers are immutable
//! once looked up by hash and are kept in an LRU cache.

use std::num::NonZeroUsize;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Block, BlockId, BlockTransactionsKind, Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use alloy::transports::TransportError;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::bindings::{self, decode_protocol_error, IERC20, ITaikoL1, ITierProvider};
use super::retry::{build_http_retry_provider, RetryTransport};
use super::{
    L1Client, L2Client, ProtocolClient, ProtocolTx, RpcError, RpcResult, TxClient, TxReceipt,
};
use crate::backoff::BackoffPolicy;
use crate::proof_types::{
    BlockHeader, BlockInfo, BlockMetadata, BlockProposedEvent, BlockVerifiedEvent, EventRaw,
    L1Header, L1Origin, L2Block, L2Receipt, L2Transaction, StateVariables, TierInfo, Transition,
    TransitionContestedEvent, TransitionProvedEvent, TransitionState,
};

type HttpProvider = RootProvider<RetryTransport>;

#[derive(Clone, Debug)]
pub struct AlloyClientConfig {
    pub l1_endpoint: Url,
    pub l2_endpoint: Url,
    pub l1_protocol: Address,
    pub tier_provider: Address,
    pub bond_token: Address,
    /// Signs every protocol transaction.
    pub signer: PrivateKeySigner,
    pub rpc_backoff: BackoffPolicy,
    pub header_cache_size: NonZeroUsize,
}

pub struct AlloyClient {
    l1: HttpProvider,
    l2: HttpProvider,
    protocol: ITaikoL1::ITaikoL1Instance<RetryTransport, HttpProvider>,
    tier_provider: ITierProvider::ITierProviderInstance<RetryTransport, HttpProvider>,
    bond_token: IERC20::IERC20Instance<RetryTransport, HttpProvider>,
    wallet: EthereumWallet,
    sender: Address,
    l1_protocol: Address,
    l1_headers: Mutex<LruCache<B256, L1Header>>,
    l2_headers: Mutex<LruCache<B256, BlockHeader>>,
}

impl AlloyClient {
    pub fn new(config: AlloyClientConfig) -> Self {
        let l1 = build_http_retry_provider(config.l1_endpoint, config.rpc_backoff.clone());
        let l2 = build_http_retry_provider(config.l2_endpoint, config.rpc_backoff);

        Self {
            protocol: ITaikoL1::new(config.l1_protocol, l1.clone()),
            tier_provider: ITierProvider::new(config.tier_provider, l1.clone()),
            bond_token: IERC20::new(config.bond_token, l1.clone()),
            sender: config.signer.address(),
            wallet: EthereumWallet::from(config.signer),
            l1_protocol: config.l1_protocol,
            l1_headers: Mutex::new(LruCache::new(config.header_cache_size)),
            l2_headers: Mutex::new(LruCache::new(config.header_cache_size)),
            l1,
            l2,
        }
    }

    async fn l1_block(&self, id: BlockId) -> RpcResult<L1Header> {
        let block = self
            .l1
            .get_block(id, BlockTransactionsKind::Hashes)
            .await
            .map_err(transport_error)?
            .ok_or_else(|| RpcError::not_found(format!("L1 block {id:?}")))?;
        let header = L1Header {
            hash: block.header.hash,
            parent_hash: block.header.parent_hash,
            number: block.header.number,
            timestamp: block.header.timestamp,
        };
        self.l1_headers.lock().put(header.hash, header.clone());
        Ok(header)
    }

    async fn l2_block(&self, id: BlockId, kind: BlockTransactionsKind) -> RpcResult<Block> {
        self.l2
            .get_block(id, kind)
            .await
            .map_err(transport_error)?
            .ok_or_else(|| RpcError::not_found(format!("L2 block {id:?}")))
    }

    async fn l2_header(&self, id: BlockId) -> RpcResult<BlockHeader> {
        let header = l2_header(&self.l2_block(id, BlockTransactionsKind::Hashes).await?);
        self.l2_headers.lock().put(header.hash, header.clone());
        Ok(header)
    }

    async fn events<E: SolEvent>(&self, from: u64, to: u64) -> RpcResult<Vec<(E, EventRaw)>> {
        let filter = Filter::new()
            .address(self.l1_protocol)
            .event_signature(E::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);
        let logs = self.l1.get_logs(&filter).await.map_err(transport_error)?;
        debug!(event = E::SIGNATURE, from, to, count = logs.len(), "Fetched protocol logs");

        logs.into_iter()
            .map(|log| {
                let raw = event_raw(&log);
                let decoded = log.log_decode::<E>().map_err(|e| {
                    RpcError::Transport(format!("undecodable {} log: {e}", E::SIGNATURE))
                })?;
                Ok((decoded.inner.data, raw))
            })
            .collect()
    }
}

fn event_raw(log: &Log) -> EventRaw {
    EventRaw {
        l1_block_hash: log.block_hash.unwrap_or_default(),
        l1_block_number: log.block_number.unwrap_or_default(),
        tx_hash: log.transaction_hash.unwrap_or_default(),
    }
}

fn l2_header(block: &Block) -> BlockHeader {
    let header = &block.header;
    BlockHeader {
        hash: header.hash,
        parent_hash: header.parent_hash,
        number: header.number,
        state_root: header.state_root,
        transactions_root: header.transactions_root,
        receipts_root: header.receipts_root,
        timestamp: header.timestamp,
        gas_used: header.gas_used as u64,
    }
}

fn to_u64(value: U256, what: &str) -> RpcResult<u64> {
    u64::try_from(value).map_err(|_| RpcError::Transport(format!("{what} {value} overflows u64")))
}

/// Classifies a JSON-RPC failure. Reverts are decoded into the protocol's
/// error name when the node returned the revert data.
fn transport_error(err: TransportError) -> RpcError {
    if let Some(payload) = err.as_error_resp() {
        let message = payload.message.to_string();
        if message.to_lowercase().contains("nonce too low") {
            return RpcError::NonceTooLow;
        }
        if message.to_lowercase().contains("not found") {
            return RpcError::NotFound(message);
        }

        let reason = payload
            .data
            .as_ref()
            .and_then(|data| serde_json::from_str::<Bytes>(data.get()).ok())
            .and_then(|data| decode_protocol_error(&data));
        if let Some(reason) = reason {
            return RpcError::Revert(reason.to_string());
        }
        if message.contains("revert") {
            return RpcError::Revert(message);
        }
    }
    RpcError::Transport(err.to_string())
}

fn contract_error(err: alloy::contract::Error) -> RpcError {
    match err {
        alloy::contract::Error::TransportError(e) => transport_error(e),
        e => RpcError::Transport(e.to_string()),
    }
}

/// Answer of the L2 engine's `taiko_l1OriginByID`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcL1Origin {
    #[serde(rename = "blockID")]
    block_id: U256,
    l2_block_hash: B256,
    l1_block_height: U256,
    l1_block_hash: B256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceiptStatus {
    transaction_hash: B256,
    status: U64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcAccountProof {
    storage_hash: B256,
}

impl L1Client for AlloyClient {
    async fn l1_header_by_number(&self, number: u64) -> RpcResult<L1Header> {
        self.l1_block(BlockId::number(number)).await
    }

    async fn l1_header_by_hash(&self, hash: B256) -> RpcResult<L1Header> {
        let cached = self.l1_headers.lock().get(&hash).cloned();
        if let Some(header) = cached {
            return Ok(header);
        }
        self.l1_block(BlockId::hash(hash)).await
    }

    async fn l1_block_number(&self) -> RpcResult<u64> {
        self.l1.get_block_number().await.map_err(transport_error)
    }
}

impl L2Client for AlloyClient {
    async fn l1_origin_by_id(&self, block_id: u64) -> RpcResult<L1Origin> {
        let origin = self
            .l2
            .raw_request::<_, Option<RpcL1Origin>>(
                "taiko_l1OriginByID".into(),
                (U256::from(block_id),),
            )
            .await
            .map_err(transport_error)?
            .ok_or_else(|| RpcError::not_found(format!("L1 origin of block {block_id}")))?;

        Ok(L1Origin {
            block_id: to_u64(origin.block_id, "block id")?,
            l2_block_hash: origin.l2_block_hash,
            l1_block_height: to_u64(origin.l1_block_height, "L1 height")?,
            l1_block_hash: origin.l1_block_hash,
        })
    }

    async fn l2_header_by_number(&self, number: u64) -> RpcResult<BlockHeader> {
        self.l2_header(BlockId::number(number)).await
    }

    async fn l2_header_by_hash(&self, hash: B256) -> RpcResult<BlockHeader> {
        let cached = self.l2_headers.lock().get(&hash).cloned();
        if let Some(header) = cached {
            return Ok(header);
        }
        self.l2_header(BlockId::hash(hash)).await
    }

    async fn l2_block_by_hash(&self, hash: B256) -> RpcResult<L2Block> {
        let block = self
            .l2_block(BlockId::hash(hash), BlockTransactionsKind::Full)
            .await?;
        let transactions = block
            .transactions
            .as_transactions()
            .unwrap_or_default()
            .iter()
            .map(|tx| L2Transaction {
                hash: tx.hash,
                from: tx.from,
                to: tx.to,
                input: tx.input.clone(),
            })
            .collect();

        Ok(L2Block {
            header: l2_header(&block),
            transactions,
        })
    }

    async fn l2_receipts(&self, block_hash: B256) -> RpcResult<Vec<L2Receipt>> {
        let statuses = self
            .l2
            .raw_request::<_, Vec<RpcReceiptStatus>>("eth_getBlockReceipts".into(), (block_hash,))
            .await
            .map_err(transport_error)?;
        let encoded = self
            .l2
            .raw_request::<_, Vec<Bytes>>("debug_getRawReceipts".into(), (block_hash,))
            .await
            .map_err(transport_error)?;

        if statuses.len() != encoded.len() {
            return Err(RpcError::Transport(format!(
                "block {block_hash} has {} receipts but {} raw receipts",
                statuses.len(),
                encoded.len()
            )));
        }

        Ok(statuses
            .into_iter()
            .zip(encoded)
            .map(|(receipt, encoded)| L2Receipt {
                tx_hash: receipt.transaction_hash,
                status: receipt.status == U64::from(1),
                encoded,
            })
            .collect())
    }

    async fn signal_root(&self, signal_service: Address, block_hash: B256) -> RpcResult<B256> {
        let proof = self
            .l2
            .raw_request::<_, RpcAccountProof>(
                "eth_getProof".into(),
                (signal_service, Vec::<B256>::new(), block_hash),
            )
            .await
            .map_err(transport_error)?;
        Ok(proof.storage_hash)
    }
}

impl From<bindings::BlockMetadata> for BlockMetadata {
    fn from(meta: bindings::BlockMetadata) -> Self {
        Self {
            id: meta.id,
            l1_hash: meta.l1Hash,
            l1_height: meta.l1Height,
            tx_list_hash: meta.txListHash,
            coinbase: meta.coinbase,
            gas_limit: meta.gasLimit,
            timestamp: meta.timestamp,
            min_tier: meta.minTier,
        }
    }
}

impl From<bindings::Transition> for Transition {
    fn from(tran: bindings::Transition) -> Self {
        Self {
            parent_hash: tran.parentHash,
            block_hash: tran.blockHash,
            signal_root: tran.signalRoot,
            graffiti: tran.graffiti,
        }
    }
}

impl ProtocolClient for AlloyClient {
    async fn protocol_tiers(&self) -> RpcResult<Vec<TierInfo>> {
        let ids = self
            .tier_provider
            .getTierIds()
            .call()
            .await
            .map_err(contract_error)?
            ._0;

        let mut tiers = Vec::with_capacity(ids.len());
        for id in ids {
            let tier = self
                .tier_provider
                .getTier(id)
                .call()
                .await
                .map_err(contract_error)?
                ._0;
            tiers.push(TierInfo {
                id,
                validity_bond: U256::from(tier.validityBond),
                contest_bond: U256::from(tier.contestBond),
                cooldown_window: tier.cooldownWindow.to(),
                proving_window: u64::from(tier.provingWindow),
            });
        }
        Ok(tiers)
    }

    async fn state_variables(&self) -> RpcResult<StateVariables> {
        let vars = self
            .protocol
            .getStateVariables()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(StateVariables {
            genesis_height: vars.a.genesisHeight,
            genesis_timestamp: vars.a.genesisTimestamp,
            num_blocks: vars.b.numBlocks,
            last_verified_block_id: vars.b.lastVerifiedBlockId,
        })
    }

    async fn block_info(&self, block_id: u64) -> RpcResult<BlockInfo> {
        let blk = self
            .protocol
            .getBlock(block_id)
            .call()
            .await
            .map_err(contract_error)?
            .blk;
        Ok(BlockInfo {
            block_id: blk.blockId,
            meta_hash: blk.metaHash,
            assigned_prover: blk.assignedProver,
            proposed_at: blk.proposedAt,
            proposed_in: blk.proposedIn,
            next_transition_id: blk.nextTransitionId,
            verified_transition_id: blk.verifiedTransitionId,
        })
    }

    async fn transition(&self, block_id: u64, parent_hash: B256) -> RpcResult<TransitionState> {
        let ts = self
            .protocol
            .getTransition(block_id, parent_hash)
            .call()
            .await
            .map_err(contract_error)?
            ._0;
        Ok(TransitionState {
            block_hash: ts.blockHash,
            signal_root: ts.signalRoot,
            prover: ts.prover,
            validity_bond: U256::from(ts.validityBond),
            contester: ts.contester,
            contest_bond: U256::from(ts.contestBond),
            timestamp: ts.timestamp,
            tier: ts.tier,
        })
    }

    async fn bond_balance(&self, address: Address) -> RpcResult<U256> {
        Ok(self
            .bond_token
            .balanceOf(address)
            .call()
            .await
            .map_err(contract_error)?
            ._0)
    }

    async fn block_proposed_events(&self, from: u64, to: u64) -> RpcResult<Vec<BlockProposedEvent>> {
        self.events::<ITaikoL1::BlockProposed>(from, to)
            .await?
            .into_iter()
            .map(|(e, raw)| {
                Ok(BlockProposedEvent {
                    block_id: to_u64(e.blockId, "block id")?,
                    assigned_prover: e.assignedProver,
                    liveness_bond: U256::from(e.livenessBond),
                    meta: e.meta.into(),
                    raw,
                })
            })
            .collect()
    }

    async fn transition_proved_events(
        &self,
        from: u64,
        to: u64,
    ) -> RpcResult<Vec<TransitionProvedEvent>> {
        self.events::<ITaikoL1::TransitionProved>(from, to)
            .await?
            .into_iter()
            .map(|(e, raw)| {
                Ok(TransitionProvedEvent {
                    block_id: to_u64(e.blockId, "block id")?,
                    tran: e.tran.into(),
                    prover: e.prover,
                    validity_bond: U256::from(e.validityBond),
                    tier: e.tier,
                    raw,
                })
            })
            .collect()
    }

    async fn transition_contested_events(
        &self,
        from: u64,
        to: u64,
    ) -> RpcResult<Vec<TransitionContestedEvent>> {
        self.events::<ITaikoL1::TransitionContested>(from, to)
            .await?
            .into_iter()
            .map(|(e, raw)| {
                Ok(TransitionContestedEvent {
                    block_id: to_u64(e.blockId, "block id")?,
                    tran: e.tran.into(),
                    contester: e.contester,
                    contest_bond: U256::from(e.contestBond),
                    tier: e.tier,
                    raw,
                })
            })
            .collect()
    }

    async fn block_verified_events(&self, from: u64, to: u64) -> RpcResult<Vec<BlockVerifiedEvent>> {
        self.events::<ITaikoL1::BlockVerified>(from, to)
            .await?
            .into_iter()
            .map(|(e, raw)| {
                Ok(BlockVerifiedEvent {
                    block_id: to_u64(e.blockId, "block id")?,
                    prover: e.prover,
                    block_hash: e.blockHash,
                    tier: e.tier,
                    raw,
                })
            })
            .collect()
    }
}

impl TxClient for AlloyClient {
    async fn pending_nonce(&self) -> RpcResult<u64> {
        let nonce = self
            .l1
            .raw_request::<_, U64>("eth_getTransactionCount".into(), (self.sender, "pending"))
            .await
            .map_err(transport_error)?;
        Ok(nonce.to())
    }

    async fn send_protocol_tx(&self, tx: ProtocolTx) -> RpcResult<B256> {
        let chain_id = self.l1.get_chain_id().await.map_err(transport_error)?;
        let fees = self
            .l1
            .estimate_eip1559_fees(None)
            .await
            .map_err(transport_error)?;

        let request = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(self.l1_protocol)
            .with_input(tx.calldata)
            .with_nonce(tx.nonce)
            .with_chain_id(chain_id)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
        // Estimation runs the call, so protocol rejections surface here.
        let gas = self
            .l1
            .estimate_gas(&request)
            .await
            .map_err(transport_error)?;

        let envelope = request
            .with_gas_limit(gas)
            .build(&self.wallet)
            .await
            .map_err(|e| RpcError::Transport(format!("failed to sign transaction: {e}")))?;

        let pending = self
            .l1
            .send_raw_transaction(&envelope.encoded_2718())
            .await
            .map_err(transport_error)?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> RpcResult<Option<TxReceipt>> {
        let receipt = self
            .l1
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(transport_error)?;
        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            status: r.status(),
            block_number: r.block_number.unwrap_or_default(),
        }))
    }
}
