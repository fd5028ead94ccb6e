//! HTTP endpoints proposers query before assigning a block to this prover.
//!
//! `GET /status` advertises the fees and capacity of the prover.
//! `POST /assignment` validates a proposer's offer, reserves one temporary
//! capacity slot and answers with a signature over the assignment, which the
//! proposer attaches to its `proposeBlock` transaction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rollup_common::tiers;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capacity::CapacityManager;
use crate::handler::Clock;
use crate::proof_types::TierId;
use crate::rpc::bindings::assignment_hash;
use crate::rpc::{ChainClient, RpcError};
use crate::state::SharedState;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub prover_address: Address,
    /// The L1 protocol contract, part of every signed assignment.
    pub l1_protocol: Address,
    pub min_optimistic_tier_fee: u128,
    pub min_sgx_tier_fee: u128,
    pub min_sgx_and_zkvm_tier_fee: u128,
    pub max_expiry: Duration,
    /// Blocks past the current block count an assignment can be used for.
    pub max_slippage: u64,
    /// L1 blocks past the head an assignment can be used within.
    pub max_proposed_in: u64,
}

impl ServerConfig {
    fn min_tier_fee(&self, tier: TierId) -> Option<u128> {
        match tier {
            tiers::OPTIMISTIC => Some(self.min_optimistic_tier_fee),
            tiers::SGX => Some(self.min_sgx_tier_fee),
            tiers::SGX_AND_ZKVM => Some(self.min_sgx_and_zkvm_tier_fee),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub min_optimistic_tier_fee: u128,
    pub min_sgx_tier_fee: u128,
    pub min_sgx_and_zkvm_tier_fee: u128,
    /// Seconds.
    pub max_expiry: u64,
    pub current_capacity: u64,
    pub prover: Address,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFee {
    pub tier: TierId,
    pub fee: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub fee_token: Address,
    pub tier_fees: Vec<TierFee>,
    /// Unix timestamp after which the assignment can not be used anymore.
    pub expiry: u64,
    pub tx_list_hash: B256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub signed_payload: Bytes,
    pub prover: Address,
    pub max_block_id: u64,
    pub max_proposed_in: u64,
}

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("expiry {0} is in the past")]
    Expired(u64),

    #[error("expiry {expiry} is past the maximum {max}")]
    ExpiryTooFar { expiry: u64, max: u64 },

    #[error("tier {0} is not offered")]
    UnsupportedTier(TierId),

    #[error("fee {fee} of tier {tier} is below the minimum {min}")]
    FeeTooLow { tier: TierId, fee: u128, min: u128 },

    #[error("bond balance {balance} is below the required {required}")]
    InsufficientBond { balance: U256, required: U256 },

    #[error("prover does not have capacity")]
    NoCapacity,

    #[error("failed to sign assignment: {0}")]
    Signing(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AssignmentError {
    fn into_response(self) -> Response {
        let status = match self {
            AssignmentError::Rpc(_) | AssignmentError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub struct ProverServer<C> {
    client: Arc<C>,
    capacity: Arc<CapacityManager>,
    state: Arc<SharedState>,
    signer: PrivateKeySigner,
    clock: Arc<dyn Clock>,
    config: ServerConfig,
}

impl<C: ChainClient> ProverServer<C> {
    pub fn new(
        client: Arc<C>,
        capacity: Arc<CapacityManager>,
        state: Arc<SharedState>,
        signer: PrivateKeySigner,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        Self {
            client,
            capacity,
            state,
            signer,
            clock,
            config,
        }
    }

    fn status(&self) -> StatusResponse {
        StatusResponse {
            min_optimistic_tier_fee: self.config.min_optimistic_tier_fee,
            min_sgx_tier_fee: self.config.min_sgx_tier_fee,
            min_sgx_and_zkvm_tier_fee: self.config.min_sgx_and_zkvm_tier_fee,
            max_expiry: self.config.max_expiry.as_secs(),
            current_capacity: self.capacity.read_capacity(),
            prover: self.config.prover_address,
        }
    }

    /// Checks `req` is worth accepting. Nothing is reserved yet.
    async fn validate(&self, req: &AssignmentRequest) -> Result<(), AssignmentError> {
        let now = self.clock.now_unix();
        if req.expiry <= now {
            return Err(AssignmentError::Expired(req.expiry));
        }
        let max = now + self.config.max_expiry.as_secs();
        if req.expiry > max {
            return Err(AssignmentError::ExpiryTooFar {
                expiry: req.expiry,
                max,
            });
        }

        let mut required = U256::ZERO;
        for &TierFee { tier, fee } in &req.tier_fees {
            let min = self
                .config
                .min_tier_fee(tier)
                .ok_or(AssignmentError::UnsupportedTier(tier))?;
            if fee < min {
                return Err(AssignmentError::FeeTooLow { tier, fee, min });
            }
            if let Some(info) = self.state.tier(tier) {
                required = required.max(info.validity_bond);
            }
        }

        let balance = self.client.bond_balance(self.config.prover_address).await?;
        if balance < required {
            return Err(AssignmentError::InsufficientBond { balance, required });
        }
        Ok(())
    }

    pub async fn create_assignment(
        &self,
        req: AssignmentRequest,
    ) -> Result<AssignmentResponse, AssignmentError> {
        self.validate(&req).await?;

        let vars = self.client.state_variables().await?;
        let l1_head = self.client.l1_block_number().await?;
        let max_block_id = vars.num_blocks + self.config.max_slippage;
        let max_proposed_in = l1_head + self.config.max_proposed_in;

        if self.capacity.read_capacity() == 0 {
            return Err(AssignmentError::NoCapacity);
        }

        let tier_fees: Vec<_> = req.tier_fees.iter().map(|f| (f.tier, f.fee)).collect();
        let hash = assignment_hash(
            self.config.l1_protocol,
            req.tx_list_hash,
            req.fee_token,
            req.expiry,
            max_block_id,
            max_proposed_in,
            &tier_fees,
        );
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| AssignmentError::Signing(e.to_string()))?;

        // Reserve last, a failed request must not hold a slot until its TTL.
        let (remaining, taken) = self.capacity.take_one_temp_capacity();
        if !taken {
            return Err(AssignmentError::NoCapacity);
        }

        info!(
            tx_list_hash = %req.tx_list_hash,
            expiry = req.expiry,
            max_block_id,
            remaining,
            "Accepted block assignment"
        );

        Ok(AssignmentResponse {
            signed_payload: Bytes::from(signature.as_bytes().to_vec()),
            prover: self.config.prover_address,
            max_block_id,
            max_proposed_in,
        })
    }
}

async fn status<C: ChainClient>(State(server): State<Arc<ProverServer<C>>>) -> Json<StatusResponse> {
    Json(server.status())
}

async fn assignment<C: ChainClient>(
    State(server): State<Arc<ProverServer<C>>>,
    Json(req): Json<AssignmentRequest>,
) -> Result<Json<AssignmentResponse>, AssignmentError> {
    debug!(?req, "Received assignment request");
    server.create_assignment(req).await.map(Json).map_err(|e| {
        warn!("Rejected assignment: {e}");
        e
    })
}

pub fn router<C: ChainClient>(server: Arc<ProverServer<C>>) -> Router {
    Router::new()
        .route("/status", get(status::<C>))
        .route("/assignment", post(assignment::<C>))
        .with_state(server)
}

/// Serves the prover endpoints until `cancel` fires.
pub async fn serve<C: ChainClient>(
    server: Arc<ProverServer<C>>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], server.config.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Prover server listening");

    Ok(axum::serve(listener, router(server))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?)
}
