//! Higher level queries composed from the raw client traits.

use std::time::Duration;

use alloy::primitives::{Address, B256};
use rollup_common::TRANSITION_NOT_FOUND_ERROR;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{L1Client, L2Client, ProtocolClient, RpcError, RpcResult};
use crate::proof_types::{BlockHeader, BlockProofStatus, BlockProposedEvent, L1Header, L1Origin};

/// Polls the L2 execution engine until it recorded the L1 origin of
/// `block_id`. Returns `None` if `cancel` fires first.
pub async fn wait_l1_origin<C: L2Client>(
    client: &C,
    block_id: u64,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Option<L1Origin> {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = ticker.tick() => {}
        }

        match client.l1_origin_by_id(block_id).await {
            Ok(origin) => return Some(origin),
            Err(RpcError::NotFound(_)) => {
                debug!(block_id, "L1 origin not inserted yet, waiting")
            }
            Err(e) => warn!(block_id, "Failed to fetch L1 origin: {e}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReorgCheckResult {
    pub is_reorged: bool,
    pub l1_current_to_reset: Option<L1Header>,
    pub last_handled_block_id_to_reset: Option<u64>,
}

/// Checks whether the L1 blocks the L2 chain was derived from are still
/// canonical, walking back from `block_id` until an L1 origin whose L1 block
/// hash still matches. Reaching block 0 falls back to the protocol's genesis
/// height.
pub async fn check_l1_reorg<C>(client: &C, block_id: u64) -> RpcResult<ReorgCheckResult>
where
    C: L1Client + L2Client + ProtocolClient,
{
    let mut block_id = block_id;
    let mut result = ReorgCheckResult::default();

    loop {
        if block_id == 0 {
            let vars = client.state_variables().await?;
            let genesis = client.l1_header_by_number(vars.genesis_height).await?;
            result.l1_current_to_reset = Some(genesis);
            result.last_handled_block_id_to_reset = Some(0);
            break;
        }

        let origin = match client.l1_origin_by_id(block_id).await {
            Ok(origin) => origin,
            Err(RpcError::NotFound(_)) => {
                info!(
                    block_id,
                    "L1 origin not found, the L2 execution engine has just synced from P2P network"
                );
                return Ok(ReorgCheckResult::default());
            }
            Err(e) => return Err(e),
        };

        let l1_header = match client.l1_header_by_number(origin.l1_block_height).await {
            Ok(header) => Some(header),
            Err(RpcError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        match l1_header {
            Some(header) if header.hash == origin.l1_block_hash => {
                result.l1_current_to_reset = Some(header);
                result.last_handled_block_id_to_reset = Some(origin.block_id);
                break;
            }
            header => {
                info!(
                    block_id,
                    l1_height = origin.l1_block_height,
                    l1_hash_old = %origin.l1_block_hash,
                    l1_hash_new = ?header.map(|h| h.hash),
                    "Reorg detected"
                );
                result.is_reorged = true;
                block_id -= 1;
            }
        }
    }

    Ok(result)
}

/// Header of the parent of `block_id`, the genesis header for block 0.
pub async fn l2_parent_by_block_id<C: L2Client>(client: &C, block_id: u64) -> RpcResult<BlockHeader> {
    client.l2_header_by_number(block_id.saturating_sub(1)).await
}

/// Compares the transition the protocol recorded for `block_id` with the
/// local L2 view.
pub async fn get_block_proof_status<C>(
    client: &C,
    block_id: u64,
    l2_signal_service: Address,
) -> RpcResult<BlockProofStatus>
where
    C: L2Client + ProtocolClient,
{
    let parent = l2_parent_by_block_id(client, block_id).await?;

    let transition = match client.transition(block_id, parent.hash).await {
        Ok(transition) => transition,
        Err(e) if e.is_revert_with(TRANSITION_NOT_FOUND_ERROR) => {
            return Ok(BlockProofStatus {
                is_submitted: false,
                parent_hash: parent.hash,
                ..Default::default()
            })
        }
        Err(e) => return Err(e),
    };

    let valid = is_valid_proof(
        client,
        block_id,
        transition.block_hash,
        transition.signal_root,
        l2_signal_service,
    )
    .await?;
    if !valid {
        info!(
            block_id,
            block_hash = %transition.block_hash,
            signal_root = %transition.signal_root,
            "Different block hash or signal root detected, try submitting another proof"
        );
    }

    Ok(BlockProofStatus {
        is_submitted: true,
        invalid: !valid,
        current_transition: Some(transition),
        parent_hash: parent.hash,
    })
}

/// Whether `block_hash` and `signal_root` match the local L2 chain at
/// `block_id`.
pub async fn is_valid_proof<C: L2Client>(
    client: &C,
    block_id: u64,
    block_hash: B256,
    signal_root: B256,
    l2_signal_service: Address,
) -> RpcResult<bool> {
    let header = client.l2_header_by_number(block_id).await?;
    if header.hash != block_hash {
        return Ok(false);
    }
    let local_signal_root = client.signal_root(l2_signal_service, header.hash).await?;
    Ok(local_signal_root == signal_root)
}

/// Finds the `BlockProposed` event of `block_id` in the L1 block it was
/// proposed in.
pub async fn get_block_proposed_event<C: ProtocolClient>(
    client: &C,
    block_id: u64,
) -> RpcResult<BlockProposedEvent> {
    let info = client.block_info(block_id).await?;
    client
        .block_proposed_events(info.proposed_in, info.proposed_in)
        .await?
        .into_iter()
        .find(|e| e.block_id == block_id)
        .ok_or_else(|| RpcError::not_found(format!("BlockProposed event of block {block_id}")))
}
