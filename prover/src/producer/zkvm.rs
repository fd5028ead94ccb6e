//! ZK proofs from an external proving daemon speaking JSON-RPC.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use futures::future::{BoxFuture, FutureExt};
use rollup_common::tiers;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{DummyProducer, ProducerError, ProducerResult, ProofProducer};
use crate::backoff::{retry_if, BackoffPolicy};
use crate::proof_types::{ProofRequest, ProofResult, TierId};

/// Degree reported for dummy proofs, so they still get a valid circuit index.
const DUMMY_DEGREE: u64 = 21;

#[derive(Clone, Debug)]
pub struct ZkvmConfig {
    pub endpoint: Url,
    pub l2_rpc: String,
    /// Circuit parameters file name on the daemon side.
    pub param: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: Option<u64>,
    pub dummy: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct ProofRequestParam {
    circuit: &'static str,
    block: u64,
    rpc: String,
    retry: bool,
    param: String,
    prover: Address,
    l1_signal_service: Address,
    l2_signal_service: Address,
    l2_contract: Address,
    meta_hash: B256,
    block_hash: B256,
    parent_hash: B256,
    signal_root: B256,
    graffiti: B256,
    gas_used: u64,
}

#[derive(Clone, Debug, Serialize)]
struct JsonRpcRequest<P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [P; 1],
}

#[derive(Clone, Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Clone, Debug, Deserialize)]
struct CircuitProof {
    instances: Vec<String>,
    proof: Bytes,
    degree: u64,
}

#[derive(Clone, Debug, Deserialize)]
struct ProofOutput {
    circuit: CircuitProof,
}

#[derive(Clone, Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<ProofOutput>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

pub struct ZkvmProducer {
    config: ZkvmConfig,
    client: reqwest::Client,
    dummy: DummyProducer,
    next_id: AtomicU64,
}

impl ZkvmProducer {
    pub fn new(config: ZkvmConfig) -> ProducerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            dummy: DummyProducer::new(tiers::SGX_AND_ZKVM),
            next_id: AtomicU64::new(1),
        })
    }

    fn request_param(&self, request: &ProofRequest) -> ProofRequestParam {
        let opts = &request.opts;
        ProofRequestParam {
            circuit: "super",
            block: request.block_id,
            rpc: self.config.l2_rpc.clone(),
            retry: true,
            param: self.config.param.clone(),
            prover: opts.prover_address,
            l1_signal_service: opts.l1_signal_service,
            l2_signal_service: opts.l2_signal_service,
            l2_contract: opts.l2_protocol_address,
            meta_hash: opts.meta_hash,
            block_hash: opts.block_hash,
            parent_hash: opts.parent_hash,
            signal_root: opts.signal_root,
            graffiti: opts.graffiti,
            gas_used: request.header.gas_used,
        }
    }

    async fn call_once(&self, param: &ProofRequestParam) -> ProducerResult<(Bytes, u64)> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "proof",
            params: [param],
        };
        let response = self
            .client
            .post(self.config.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProducerError::Service(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(ProducerError::InvalidResponse(format!("status {status}")));
        }

        parse_response(param.block, response.json().await?)
    }

    async fn prove(&self, request: ProofRequest) -> ProducerResult<ProofResult> {
        if self.config.dummy {
            let mut result = self.dummy.proof_for(request);
            result.degree = DUMMY_DEGREE;
            return Ok(result);
        }

        let param = self.request_param(&request);
        let policy =
            BackoffPolicy::constant(self.config.poll_interval).with_max_retries(self.config.max_polls);
        info!(block_id = request.block_id, "Requesting ZK proof");

        let (proof, degree) = retry_if(&policy, || self.call_once(&param), ProducerError::is_retryable)
            .await
            .map_err(|e| e.into_inner())?;

        info!(block_id = request.block_id, degree, size = proof.len(), "ZK proof generated");
        Ok(ProofResult::for_request(request, proof, degree))
    }
}

fn parse_response(block_id: u64, response: JsonRpcResponse) -> ProducerResult<(Bytes, u64)> {
    if let Some(err) = response.error {
        return Err(ProducerError::InvalidResponse(format!(
            "code {}: {}",
            err.code, err.message
        )));
    }
    let Some(output) = response.result else {
        debug!(block_id, "ZK proof not ready");
        return Err(ProducerError::NotReady(block_id));
    };
    let proof = encode_circuit_proof(&output.circuit)?;
    Ok((proof, output.circuit.degree))
}

/// The calldata form of a circuit proof: each public instance as a 32 byte
/// big endian word, followed by the proof itself.
fn encode_circuit_proof(circuit: &CircuitProof) -> ProducerResult<Bytes> {
    let mut out = Vec::with_capacity(circuit.instances.len() * 32 + circuit.proof.len());
    for instance in &circuit.instances {
        let value = U256::from_str(instance).map_err(|e| {
            ProducerError::InvalidResponse(format!("invalid instance {instance}: {e}"))
        })?;
        out.extend_from_slice(&value.to_be_bytes::<32>());
    }
    out.extend_from_slice(&circuit.proof);
    Ok(out.into())
}

impl ProofProducer for ZkvmProducer {
    fn request_proof(&self, request: ProofRequest) -> BoxFuture<'_, ProducerResult<ProofResult>> {
        self.prove(request).boxed()
    }

    fn cancel(&self, block_id: u64) -> BoxFuture<'_, ProducerResult<()>> {
        warn!(block_id, "The proving daemon does not support cancellation");
        async { Ok(()) }.boxed()
    }

    fn tier(&self) -> TierId {
        tiers::SGX_AND_ZKVM
    }
}
