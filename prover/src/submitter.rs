//! Builds proof requests from proposal events, and turns the producers'
//! results into `proveBlock` transactions.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::anchor::AnchorTxValidator;
use crate::evidence::{EvidenceAssembler, EvidenceError};
use crate::proof_types::{BlockProposedEvent, ProofRequest, ProofRequestOptions, ProofResult, TierId};
use crate::rpc::bindings::prove_block_calldata;
use crate::rpc::methods::{get_block_proof_status, l2_parent_by_block_id, wait_l1_origin};
use crate::rpc::{ChainClient, ProtocolTx, RpcError};
use crate::sender::{SendError, SendOutcome, TxSender};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Send(#[from] SendError),
}

#[derive(Clone, Debug)]
pub struct SubmitterConfig {
    pub prover_address: Address,
    pub l2_protocol_address: Address,
    pub l1_signal_service: Address,
    pub l2_signal_service: Address,
    pub graffiti: B256,
    pub l1_origin_poll_interval: Duration,
}

pub struct ProofSubmitter<C> {
    client: Arc<C>,
    assembler: EvidenceAssembler<C>,
    sender: Arc<TxSender<C>>,
    config: SubmitterConfig,
}

impl<C: ChainClient> ProofSubmitter<C> {
    pub fn new(client: Arc<C>, sender: Arc<TxSender<C>>, config: SubmitterConfig) -> Self {
        let assembler = EvidenceAssembler::new(
            client.clone(),
            AnchorTxValidator::new(config.l2_protocol_address),
        );
        Self {
            client,
            assembler,
            sender,
            config,
        }
    }

    /// Gathers everything needed to prove the block `event` proposed, once
    /// the L2 execution engine inserted it. `None` if cancelled while waiting.
    pub async fn build_request(
        &self,
        event: &BlockProposedEvent,
        tier: TierId,
        cancel: &CancellationToken,
    ) -> Result<Option<ProofRequest>, SubmitError> {
        let block_id = event.block_id;
        let Some(origin) = wait_l1_origin(
            self.client.as_ref(),
            block_id,
            self.config.l1_origin_poll_interval,
            cancel,
        )
        .await
        else {
            return Ok(None);
        };

        let header = self.client.l2_header_by_hash(origin.l2_block_hash).await?;
        let parent = l2_parent_by_block_id(self.client.as_ref(), block_id).await?;
        let info = self.client.block_info(block_id).await?;
        let signal_root = self
            .client
            .signal_root(self.config.l2_signal_service, header.hash)
            .await?;

        let opts = ProofRequestOptions {
            block_id,
            prover_address: self.config.prover_address,
            propose_block_tx_hash: event.raw.tx_hash,
            l2_protocol_address: self.config.l2_protocol_address,
            l1_signal_service: self.config.l1_signal_service,
            l2_signal_service: self.config.l2_signal_service,
            meta_hash: info.meta_hash,
            block_hash: header.hash,
            parent_hash: parent.hash,
            signal_root,
            graffiti: self.config.graffiti,
            event_l1_height: event.raw.l1_block_number,
            event_l1_hash: event.raw.l1_block_hash,
        };

        Ok(Some(ProofRequest {
            block_id,
            meta: event.meta.clone(),
            header,
            opts,
            tier,
        }))
    }

    /// Submits `result` unless a valid proof of the block already landed.
    /// Submissions the protocol rejects are logged and dropped.
    pub async fn submit_proof(&self, result: ProofResult) -> Result<(), SubmitError> {
        let block_id = result.block_id;

        let status =
            get_block_proof_status(self.client.as_ref(), block_id, self.config.l2_signal_service)
                .await?;
        if status.is_submitted && !status.invalid {
            info!(block_id, "A valid proof was already submitted, skipping");
            return Ok(());
        }

        let evidence = self.assembler.build(&result).await?;
        let calldata = prove_block_calldata(block_id, &evidence);

        match self
            .sender
            .send(&result, |nonce| {
                Ok(ProtocolTx {
                    nonce,
                    calldata: calldata.clone(),
                })
            })
            .await
        {
            Ok(SendOutcome::Landed(receipt)) => {
                info!(
                    block_id,
                    tier = result.tier,
                    tx_hash = %receipt.tx_hash,
                    "Proof submitted"
                );
                Ok(())
            }
            Ok(SendOutcome::Abandoned(reason)) => {
                info!(block_id, ?reason, "Proof submission abandoned");
                Ok(())
            }
            Err(e @ SendError::Unretryable { .. }) => {
                warn!(block_id, "{e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Bytes;
    use rollup_common::tiers;

    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::producer::DummyProducer;
    use crate::proof_types::TransitionState;
    use crate::sender::TxSenderConfig;
    use crate::testing::{FakeChain, ASSIGNED_PROVER, L2_PROTOCOL_ADDRESS, L2_SIGNAL_SERVICE};

    fn config() -> SubmitterConfig {
        SubmitterConfig {
            prover_address: ASSIGNED_PROVER,
            l2_protocol_address: L2_PROTOCOL_ADDRESS,
            l1_signal_service: Address::repeat_byte(0x05),
            l2_signal_service: L2_SIGNAL_SERVICE,
            graffiti: B256::ZERO,
            l1_origin_poll_interval: Duration::from_secs(1),
        }
    }

    fn submitter(chain: Arc<FakeChain>) -> ProofSubmitter<FakeChain> {
        let sender = TxSender::new(
            chain.clone(),
            TxSenderConfig {
                backoff: BackoffPolicy::constant(Duration::from_secs(1)).with_max_retries(Some(2)),
                wait_receipt_timeout: Duration::from_secs(10),
                receipt_poll_interval: Duration::from_secs(1),
            },
            CancellationToken::new(),
        );
        ProofSubmitter::new(chain, Arc::new(sender), config())
    }

    #[tokio::test(start_paused = true)]
    async fn builds_request_from_chain_view() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        let request = submitter(chain.clone())
            .build_request(&chain.proposed_event(3), tiers::SGX, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request, chain.proof_request(3, tiers::SGX));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_yields_nothing() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.remove_l1_origin(3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = submitter(chain.clone())
            .build_request(&chain.proposed_event(3), tiers::SGX, &cancel)
            .await
            .unwrap();
        assert!(request.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn submits_assembled_evidence() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        let result = DummyProducer::new(tiers::SGX).proof_for(chain.proof_request(2, tiers::SGX));

        submitter(chain.clone()).submit_proof(result.clone()).await.unwrap();

        let evidence = EvidenceAssembler::new(
            chain.clone(),
            AnchorTxValidator::new(L2_PROTOCOL_ADDRESS),
        )
        .build(&result)
        .await
        .unwrap();
        let sent = chain.sent_txs();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].calldata, prove_block_calldata(2, &evidence));
    }

    #[tokio::test(start_paused = true)]
    async fn skips_blocks_with_a_valid_proof() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.set_transition(
            2,
            TransitionState {
                block_hash: chain.l2_header(2).hash,
                signal_root: chain.local_signal_root(2),
                tier: tiers::SGX,
                ..Default::default()
            },
        );
        let result = DummyProducer::new(tiers::SGX).proof_for(chain.proof_request(2, tiers::SGX));

        submitter(chain.clone()).submit_proof(result).await.unwrap();
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resubmits_over_an_invalid_proof() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.set_transition(
            2,
            TransitionState {
                block_hash: B256::repeat_byte(0xde),
                tier: tiers::SGX,
                ..Default::default()
            },
        );
        let result = DummyProducer::new(tiers::SGX_AND_ZKVM)
            .proof_for(chain.proof_request(2, tiers::SGX_AND_ZKVM));

        submitter(chain.clone()).submit_proof(result).await.unwrap();
        assert_eq!(chain.sent_txs().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_rejections_are_swallowed() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.push_send_error(RpcError::Revert("L1_INVALID_TIER".into()));
        let result = DummyProducer::new(tiers::SGX).proof_for(chain.proof_request(2, tiers::SGX));

        submitter(chain.clone()).submit_proof(result).await.unwrap();
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_blocks_are_reported() {
        let chain = Arc::new(FakeChain::with_blocks(4));
        chain.set_transactions(2, vec![]);
        let result = ProofResult::for_request(
            chain.proof_request(2, tiers::SGX),
            Bytes::from_static(&[0xff]),
            0,
        );

        let err = submitter(chain.clone()).submit_proof(result).await.unwrap_err();
        assert!(matches!(err, SubmitError::Evidence(EvidenceError::EmptyBlock(2))));
    }
}
