use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use alloy::{
    providers::{ProviderBuilder, RootProvider},
    rpc::{
        client::ClientBuilder,
        json_rpc::{RequestPacket, Response, ResponsePacket},
    },
    transports::{http::ReqwestTransport, TransportError},
};
use tower::{retry::Policy, Layer, Service};
use tracing::warn;

use crate::backoff::BackoffPolicy;

/// JSON-RPC error codes nodes and gateways answer with when rate limiting.
const RATE_LIMIT_CODES: [i64; 3] = [-32005, 429, -32098];

/// Retries transport failures and rate limited responses of a single RPC
/// endpoint. Reverts and other JSON-RPC errors are passed through untouched.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    backoff: BackoffPolicy,
    retries: u64,
}

impl RetryPolicy {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            retries: 0,
        }
    }

    fn should_retry(&self, result: Result<&ResponsePacket, &TransportError>) -> bool {
        let failed = match result {
            Err(_) => true,
            Ok(packet) => is_rate_limited(packet),
        };
        failed
            && self
                .backoff
                .max_retries()
                .map_or(true, |max| self.retries < max)
    }
}

fn is_rate_limited(packet: &ResponsePacket) -> bool {
    let rate_limited = |r: &Response| {
        r.payload
            .as_error()
            .is_some_and(|e| RATE_LIMIT_CODES.contains(&e.code))
    };
    match packet {
        ResponsePacket::Single(r) => rate_limited(r),
        ResponsePacket::Batch(rs) => rs.iter().any(rate_limited),
    }
}

impl Policy<RequestPacket, ResponsePacket, TransportError> for RetryPolicy {
    type Future = Pin<Box<dyn Future<Output = Self> + Send + 'static>>;

    fn retry(
        &self,
        _req: &RequestPacket,
        result: Result<&ResponsePacket, &TransportError>,
    ) -> Option<Self::Future> {
        if !self.should_retry(result) {
            return None;
        }

        let mut policy = self.clone();
        let delay = policy.backoff.delay(policy.retries);
        warn!(retry = policy.retries + 1, ?delay, "RPC request failed, retrying");
        Some(Box::pin(async move {
            tokio::time::sleep(delay).await;
            policy.retries += 1;
            policy
        }))
    }

    fn clone_request(&self, req: &RequestPacket) -> Option<RequestPacket> {
        Some(req.clone())
    }
}

pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<RequestPacket> for RetryService<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>
        + Send
        + 'static
        + Clone,
    S::Future: Send + 'static,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RequestPacket) -> Self::Future {
        let inner = self.inner.clone();
        let mut policy = self.policy.clone();

        let mut inner = std::mem::replace(&mut self.inner, inner);
        Box::pin(async move {
            let mut res = inner.call(req.clone()).await;

            while let Some(new_policy) = policy.retry(&req, res.as_ref()) {
                policy = new_policy.await;
                res = inner.call(req.clone()).await;
            }

            res
        })
    }
}

pub type RetryTransport = RetryService<ReqwestTransport>;

/// Builds a client over HTTP whose every request goes through [`RetryLayer`].
pub fn build_http_retry_client(
    rpc_url: url::Url,
    backoff: BackoffPolicy,
) -> alloy::rpc::client::RpcClient<RetryTransport> {
    ClientBuilder::default()
        .layer(RetryLayer::new(RetryPolicy::new(backoff)))
        .http(rpc_url)
}

/// Read only provider over [`build_http_retry_client`].
pub fn build_http_retry_provider(
    rpc_url: url::Url,
    backoff: BackoffPolicy,
) -> RootProvider<RetryTransport> {
    ProviderBuilder::new().on_client(build_http_retry_client(rpc_url, backoff))
}
