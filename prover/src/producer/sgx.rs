//! Attested proofs from an SGX enclave, requested from a raiko style proving
//! service over HTTP.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256};
use futures::future::{BoxFuture, FutureExt};
use rollup_common::tiers;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{DummyProducer, ProducerError, ProducerResult, ProofProducer};
use crate::backoff::{retry_if, BackoffPolicy};
use crate::proof_types::{ProofRequest, ProofResult, TierId};

#[derive(Clone, Debug)]
pub struct SgxConfig {
    pub endpoint: Url,
    /// RPC endpoints the proving service reads the chain from.
    pub l1_rpc: String,
    pub l2_rpc: String,
    pub l1_beacon_rpc: String,
    pub instance_id: u64,
    pub request_timeout: Duration,
    /// Interval between two polls while the proof is being generated.
    pub poll_interval: Duration,
    pub max_polls: Option<u64>,
    /// Skip the service and answer with a dummy proof.
    pub dummy: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SgxProofParams {
    instance_id: u64,
    setup: bool,
    bootstrap: bool,
    prove: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SgxRequestBody {
    #[serde(rename = "type")]
    proof_type: &'static str,
    block: u64,
    l1_rpc: String,
    l2_rpc: String,
    l1_beacon_rpc: String,
    prover: Address,
    graffiti: B256,
    sgx: SgxProofParams,
}

#[derive(Clone, Debug, Deserialize)]
struct SgxProofData {
    proof: Bytes,
}

#[derive(Clone, Debug, Deserialize)]
struct SgxResponse {
    data: Option<SgxProofData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct SgxProducer {
    config: SgxConfig,
    client: reqwest::Client,
    dummy: DummyProducer,
}

impl SgxProducer {
    pub fn new(config: SgxConfig) -> ProducerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            dummy: DummyProducer::new(tiers::SGX),
        })
    }

    fn request_body(&self, request: &ProofRequest) -> SgxRequestBody {
        SgxRequestBody {
            proof_type: "sgx",
            block: request.block_id,
            l1_rpc: self.config.l1_rpc.clone(),
            l2_rpc: self.config.l2_rpc.clone(),
            l1_beacon_rpc: self.config.l1_beacon_rpc.clone(),
            prover: request.opts.prover_address,
            graffiti: request.opts.graffiti,
            sgx: SgxProofParams {
                instance_id: self.config.instance_id,
                setup: false,
                bootstrap: false,
                prove: true,
            },
        }
    }

    async fn call_once(&self, body: &SgxRequestBody) -> ProducerResult<Bytes> {
        let response = self
            .client
            .post(self.config.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProducerError::Service(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(ProducerError::InvalidResponse(format!("status {status}")));
        }

        let response: SgxResponse = response.json().await?;
        parse_response(body.block, response)
    }

    async fn prove(&self, request: ProofRequest) -> ProducerResult<ProofResult> {
        if self.config.dummy {
            return Ok(self.dummy.proof_for(request));
        }

        let body = self.request_body(&request);
        let policy =
            BackoffPolicy::constant(self.config.poll_interval).with_max_retries(self.config.max_polls);
        info!(block_id = request.block_id, "Requesting SGX proof");

        let proof = retry_if(&policy, || self.call_once(&body), ProducerError::is_retryable)
            .await
            .map_err(|e| e.into_inner())?;

        info!(block_id = request.block_id, size = proof.len(), "SGX proof generated");
        Ok(ProofResult::for_request(request, proof, 0))
    }
}

fn parse_response(block_id: u64, response: SgxResponse) -> ProducerResult<Bytes> {
    if let Some(err) = response.error {
        return Err(ProducerError::InvalidResponse(match response.message {
            Some(message) => format!("{err}: {message}"),
            None => err,
        }));
    }
    match response.data {
        Some(data) if !data.proof.is_empty() => Ok(data.proof),
        Some(_) => Err(ProducerError::InvalidResponse("empty proof".to_string())),
        None => {
            debug!(block_id, "SGX proof not ready");
            Err(ProducerError::NotReady(block_id))
        }
    }
}

impl ProofProducer for SgxProducer {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        self.prove(request).boxed()
    }

    fn tier(&self) -> TierId {
        tiers::SGX
    }
}
