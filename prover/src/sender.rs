//! Lands proof submission transactions on L1.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use rollup_common::{NOT_SPECIAL_PROVER_ERROR, PROTOCOL_ERROR_PREFIX};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{retry_if, BackoffPolicy, RetryError};
use crate::proof_types::ProofResult;
use crate::rpc::{L1Client, ProtocolClient, ProtocolTx, RpcError, TxClient, TxReceipt};

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("failed to build transaction: {0}")]
    Build(String),

    #[error("timed out waiting for the receipt of {0}")]
    ReceiptTimeout(B256),

    #[error("transaction {0} reverted")]
    Reverted(B256),

    /// The submission was given up on, either because the protocol rejected
    /// it or because the retry budget ran out. Callers log and move on.
    #[error("giving up on the proof submission of block {block_id}: {reason}")]
    Unretryable { block_id: u64, reason: String },

    #[error("proof submission of block {0} cancelled")]
    Cancelled(u64),
}

/// Whether a proof submission failing with `err` deserves another attempt.
/// Protocol reverts are final, except `L1_NOT_SPECIAL_PROVER` as the special
/// prover may change in between.
pub fn is_submit_proof_tx_error_retryable(err: &impl Display, block_id: u64) -> bool {
    let reason = err.to_string();
    if reason.starts_with(NOT_SPECIAL_PROVER_ERROR) || !reason.starts_with(PROTOCOL_ERROR_PREFIX) {
        return true;
    }
    warn!(block_id, %reason, "Proof submission rejected by the protocol, not retrying");
    false
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbandonReason {
    /// The L1 block holding the proposal is no longer canonical.
    Reorged,
    AlreadyVerified,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Landed(TxReceipt),
    Abandoned(AbandonReason),
}

#[derive(Clone, Debug)]
pub struct TxSenderConfig {
    pub backoff: BackoffPolicy,
    pub wait_receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

pub struct TxSender<C> {
    client: Arc<C>,
    config: TxSenderConfig,
    /// Next nonce to use, `None` when it must be fetched again. Held across
    /// building and sending so submissions are serialized per signer.
    nonce: Mutex<Option<u64>>,
    cancel: CancellationToken,
}

impl<C> TxSender<C>
where
    C: L1Client + ProtocolClient + TxClient,
{
    pub fn new(client: Arc<C>, config: TxSenderConfig, cancel: CancellationToken) -> Self {
        Self {
            client,
            config,
            nonce: Mutex::new(None),
            cancel,
        }
    }

    /// Submits `result` with the transaction `build_tx` builds for a given
    /// nonce, retrying under the configured policy.
    pub async fn send<F>(&self, result: &ProofResult, build_tx: F) -> Result<SendOutcome, SendError>
    where
        F: Fn(u64) -> Result<ProtocolTx, SendError> + Sync,
    {
        let block_id = result.block_id;
        let retryable = |e: &SendError| match e {
            SendError::Rpc(e) => is_submit_proof_tx_error_retryable(e, block_id),
            SendError::Build(_) | SendError::Unretryable { .. } | SendError::Cancelled(_) => false,
            SendError::ReceiptTimeout(_) | SendError::Reverted(_) => true,
        };

        let build_tx = &build_tx;
        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SendError::Cancelled(block_id)),
            res = retry_if(
                &self.config.backoff,
                move || self.attempt(result, build_tx),
                retryable,
            ) => res,
        };

        match res {
            Ok(outcome) => Ok(outcome),
            Err(RetryError::Permanent(e @ SendError::Build(_))) => Err(e),
            Err(RetryError::Permanent(e)) => Err(SendError::Unretryable {
                block_id,
                reason: e.to_string(),
            }),
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(block_id, attempts, "Proof submission retries exhausted: {last}");
                Err(SendError::Unretryable {
                    block_id,
                    reason: format!("retries exhausted after {attempts} attempts: {last}"),
                })
            }
        }
    }

    async fn attempt<F>(&self, result: &ProofResult, build_tx: &F) -> Result<SendOutcome, SendError>
    where
        F: Fn(u64) -> Result<ProtocolTx, SendError>,
    {
        let block_id = result.block_id;

        match self.client.l1_header_by_number(result.opts.event_l1_height).await {
            Ok(header) if header.hash == result.opts.event_l1_hash => {}
            Ok(_) | Err(RpcError::NotFound(_)) => {
                info!(
                    block_id,
                    l1_height = result.opts.event_l1_height,
                    "Reorg detected, skipping the current proof submission"
                );
                return Ok(SendOutcome::Abandoned(AbandonReason::Reorged));
            }
            Err(e) => return Err(e.into()),
        }

        let vars = self.client.state_variables().await?;
        if vars.last_verified_block_id >= block_id {
            info!(
                block_id,
                last_verified_block_id = vars.last_verified_block_id,
                "Block is already verified, skipping the current proof submission"
            );
            return Ok(SendOutcome::Abandoned(AbandonReason::AlreadyVerified));
        }

        let tx_hash = {
            let mut cached = self.nonce.lock().await;
            let nonce = match *cached {
                Some(nonce) => nonce,
                None => self.client.pending_nonce().await?,
            };
            let tx = build_tx(nonce)?;
            match self.client.send_protocol_tx(tx).await {
                Ok(hash) => {
                    *cached = Some(nonce + 1);
                    hash
                }
                Err(e) => {
                    if e == RpcError::NonceTooLow {
                        *cached = None;
                    }
                    return Err(e.into());
                }
            }
        };
        info!(block_id, tier = result.tier, %tx_hash, "Proof submission transaction sent");

        let receipt = self.wait_receipt(tx_hash).await?;
        if !receipt.status {
            return Err(SendError::Reverted(tx_hash));
        }
        info!(
            block_id,
            %tx_hash,
            l1_height = receipt.block_number,
            "Proof submission transaction landed"
        );
        Ok(SendOutcome::Landed(receipt))
    }

    async fn wait_receipt(&self, tx_hash: B256) -> Result<TxReceipt, SendError> {
        let poll = async {
            let mut ticker = tokio::time::interval(self.config.receipt_poll_interval);
            loop {
                ticker.tick().await;
                match self.client.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => debug!(%tx_hash, "Transaction not mined yet"),
                    Err(e) => warn!(%tx_hash, "Failed to fetch transaction receipt: {e}"),
                }
            }
        };

        match tokio::time::timeout(self.config.wait_receipt_timeout, poll).await {
            Ok(receipt) => Ok(receipt),
            Err(_) => {
                // The transaction may still be pending, let the next attempt
                // pick a fresh nonce.
                *self.nonce.lock().await = None;
                Err(SendError::ReceiptTimeout(tx_hash))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Bytes;
    use rollup_common::tiers;

    use super::*;
    use crate::testing::FakeChain;

    fn sender(chain: Arc<FakeChain>, max_retries: Option<u64>) -> TxSender<FakeChain> {
        TxSender::new(
            chain,
            TxSenderConfig {
                backoff: BackoffPolicy::constant(Duration::from_secs(1))
                    .with_max_retries(max_retries),
                wait_receipt_timeout: Duration::from_secs(10),
                receipt_poll_interval: Duration::from_secs(1),
            },
            CancellationToken::new(),
        )
    }

    fn result(chain: &FakeChain, block_id: u64) -> ProofResult {
        ProofResult::for_request(
            chain.proof_request(block_id, tiers::SGX),
            Bytes::from_static(&[1; 8]),
            0,
        )
    }

    fn build(nonce: u64) -> Result<ProtocolTx, SendError> {
        Ok(ProtocolTx {
            nonce,
            calldata: Bytes::from_static(&[0xca, 0x11]),
        })
    }

    #[test]
    fn classifies_submission_errors() {
        let revert = |r: &str| RpcError::Revert(r.to_string());
        assert!(!is_submit_proof_tx_error_retryable(&revert("L1_ALREADY_PROVED"), 1));
        assert!(!is_submit_proof_tx_error_retryable(&revert("L1_INVALID_TIER"), 1));
        assert!(is_submit_proof_tx_error_retryable(&revert("L1_NOT_SPECIAL_PROVER"), 1));
        assert!(is_submit_proof_tx_error_retryable(&revert("execution reverted"), 1));
        assert!(is_submit_proof_tx_error_retryable(&RpcError::NonceTooLow, 1));
        assert!(is_submit_proof_tx_error_retryable(
            &RpcError::Transport("connection reset".into()),
            1
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lands_proof() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        let outcome = sender(chain.clone(), Some(3))
            .send(&result(&chain, 2), build)
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Landed(r) if r.status));
        assert_eq!(chain.sent_txs().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandons_after_reorg() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        let result = result(&chain, 2);
        chain.reorg_l1_origin(2);

        let outcome = sender(chain.clone(), Some(3)).send(&result, build).await.unwrap();
        assert_eq!(outcome, SendOutcome::Abandoned(AbandonReason::Reorged));
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abandons_verified_blocks() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.set_last_verified_block_id(2);

        let outcome = sender(chain.clone(), Some(3))
            .send(&result(&chain, 2), build)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Abandoned(AbandonReason::AlreadyVerified));
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_reverts_stop_the_loop() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.push_send_error(RpcError::Revert("L1_ALREADY_PROVED".into()));

        let err = sender(chain.clone(), None)
            .send(&result(&chain, 2), build)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Unretryable { block_id: 2, .. }));
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_and_stale_nonces() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.push_send_error(RpcError::Revert("L1_NOT_SPECIAL_PROVER".into()));
        chain.push_send_error(RpcError::NonceTooLow);
        chain.push_send_error(RpcError::Transport("timeout".into()));

        let outcome = sender(chain.clone(), Some(5))
            .send(&result(&chain, 2), build)
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Landed(_)));
        assert_eq!(chain.sent_txs().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_unretryable() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.set_receipt_status(false);

        let err = sender(chain.clone(), Some(2))
            .send(&result(&chain, 2), build)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Unretryable { .. }));
        assert_eq!(chain.sent_txs().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_timeout_is_retried() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.withhold_receipts();

        let err = sender(chain.clone(), Some(1))
            .send(&result(&chain, 2), build)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Unretryable { .. }));
        let nonces: Vec<_> = chain.sent_txs().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_a_hard_error() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.withhold_receipts();
        let cancel = CancellationToken::new();
        let sender = TxSender::new(
            chain.clone(),
            TxSenderConfig {
                backoff: BackoffPolicy::constant(Duration::from_secs(1)),
                wait_receipt_timeout: Duration::from_secs(10),
                receipt_poll_interval: Duration::from_secs(1),
            },
            cancel.clone(),
        );
        cancel.cancel();
        let err = sender.send(&result(&chain, 2), build).await.unwrap_err();
        assert!(matches!(err, SendError::Cancelled(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn build_failures_are_returned() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        let err = sender(chain.clone(), None)
            .send(&result(&chain, 2), |_| Err(SendError::Build("no calldata".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Build(_)));
    }
}
