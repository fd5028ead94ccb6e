//! The prover's main loop.
//!
//! [`Prover::run`] polls L1 for protocol events and hands them to the
//! handlers, which queue proof requests. Every request then runs in its own
//! task: admission through the proving gate and the capacity manager, proof
//! generation by the producer of the right tier, and finally submission. A
//! per-block cancellation token stops the work of blocks that got verified or
//! reorged out in the meantime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{retry, retry_if, BackoffPolicy, RetryError};
use crate::capacity::CapacityManager;
use crate::handler::{
    AssignmentExpiredHandler, BlockProposedHandler, Clock, Flow, HandlerConfig, HandlerContext,
    TransitionContestedHandler, TransitionProvedHandler,
};
use crate::producer::{ProducerError, ProofProducer};
use crate::proof_types::{BlockProposedEvent, ProofRequestBody, ProofResult, TierId};
use crate::rpc::{ChainClient, RpcError};
use crate::state::SharedState;
use crate::submitter::ProofSubmitter;
use crate::PROOF_CHANNEL_SIZE;

/// The configured producers, ordered by ascending tier.
#[derive(Clone, Default)]
pub struct ProducerSet {
    producers: Vec<Arc<dyn ProofProducer>>,
}

impl ProducerSet {
    pub fn new(mut producers: Vec<Arc<dyn ProofProducer>>) -> Self {
        producers.sort_by_key(|p| p.tier());
        Self { producers }
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn tiers(&self) -> Vec<TierId> {
        self.producers.iter().map(|p| p.tier()).collect()
    }

    /// The cheapest producer whose tier is at least `min_tier`.
    pub fn select(&self, min_tier: TierId) -> Option<Arc<dyn ProofProducer>> {
        self.producers
            .iter()
            .find(|p| p.tier() >= min_tier)
            .cloned()
    }

    /// The cheapest producer whose tier is strictly above `tier`.
    pub fn higher_tier_than(&self, tier: TierId) -> Option<Arc<dyn ProofProducer>> {
        self.producers.iter().find(|p| p.tier() > tier).cloned()
    }
}

#[derive(Clone, Debug)]
pub struct ProverOptions {
    pub event_poll_interval: Duration,
    /// Permits of the proving gate.
    pub max_concurrent_proving_jobs: usize,
    /// L1 height to start scanning from, instead of the L1 origin of the last
    /// verified block.
    pub start_height: Option<u64>,
    /// Retries of transient producer failures.
    pub proving_backoff: BackoffPolicy,
    /// Retries while waiting for a free capacity slot.
    pub capacity_backoff: BackoffPolicy,
    /// Guardians prove every block and do not account capacity.
    pub skip_capacity: bool,
}

/// Cancellation tokens of the blocks being proven.
#[derive(Default)]
struct InFlight {
    inner: Mutex<InFlightInner>,
}

#[derive(Default)]
struct InFlightInner {
    next_generation: u64,
    tokens: HashMap<u64, (u64, CancellationToken)>,
}

impl InFlight {
    /// Tracks a new proving task for `block_id`, superseding the previous one.
    fn register(&self, block_id: u64, parent: &CancellationToken) -> (u64, CancellationToken) {
        let mut inner = self.inner.lock();
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let token = parent.child_token();
        if let Some((_, previous)) = inner.tokens.insert(block_id, (generation, token.clone())) {
            debug!(block_id, "Superseding in-flight proof request");
            previous.cancel();
        }
        (generation, token)
    }

    fn finish(&self, block_id: u64, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.tokens.get(&block_id).is_some_and(|(g, _)| *g == generation) {
            inner.tokens.remove(&block_id);
        }
    }

    /// Cancels every in-flight block matching `pred`, returning their ids.
    fn cancel_where(&self, pred: impl Fn(u64) -> bool) -> Vec<u64> {
        let mut inner = self.inner.lock();
        let mut cancelled = Vec::new();
        inner.tokens.retain(|&block_id, (_, token)| {
            if pred(block_id) {
                token.cancel();
                cancelled.push(block_id);
                false
            } else {
                true
            }
        });
        cancelled.sort_unstable();
        cancelled
    }

    #[cfg(test)]
    fn contains(&self, block_id: u64) -> bool {
        self.inner.lock().tokens.contains_key(&block_id)
    }
}

/// What the proving and submitting tasks share.
struct ProvingContext<C> {
    client: Arc<C>,
    capacity: Arc<CapacityManager>,
    producers: ProducerSet,
    submitter: Arc<ProofSubmitter<C>>,
    in_flight: InFlight,
    permits: Arc<Semaphore>,
    results: mpsc::Sender<ProofResult>,
    options: ProverOptions,
    cancel: CancellationToken,
}

impl<C: ChainClient> ProvingContext<C> {
    async fn prove(&self, body: ProofRequestBody) -> anyhow::Result<()> {
        let block_id = body.event.block_id;
        let Some(producer) = self.producers.select(body.tier) else {
            warn!(block_id, tier = body.tier, "No producer for the requested tier, dropping");
            return Ok(());
        };

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            permit = self.permits.clone().acquire_owned() => {
                permit.context("proving gate closed")?
            }
        };

        if !self.options.skip_capacity {
            let taken = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                taken = retry(&self.options.capacity_backoff, || async move {
                    match self.capacity.take_one_capacity(block_id) {
                        (_, true) => Ok(()),
                        (_, false) => Err(anyhow!("no capacity left")),
                    }
                }) => taken,
            };
            if let Err(e) = taken {
                warn!(block_id, "Dropping proof request: {}", e.into_inner());
                return Ok(());
            }
        }

        let (generation, token) = self.in_flight.register(block_id, &self.cancel);
        let produced = self.produce(producer.as_ref(), &body.event, &token).await;
        self.in_flight.finish(block_id, generation);

        match produced {
            Ok(Some(result)) => {
                if self.results.send(result).await.is_err() {
                    self.release(block_id);
                }
                Ok(())
            }
            Ok(None) => {
                info!(block_id, "Proof request cancelled");
                self.release(block_id);
                Ok(())
            }
            Err(e) => {
                self.release(block_id);
                Err(e)
            }
        }
    }

    async fn produce(
        &self,
        producer: &dyn ProofProducer,
        event: &BlockProposedEvent,
        token: &CancellationToken,
    ) -> anyhow::Result<Option<ProofResult>> {
        let block_id = event.block_id;
        let Some(request) = self
            .submitter
            .build_request(event, producer.tier(), token)
            .await?
        else {
            return Ok(None);
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                if producer.cancellable() {
                    if let Err(e) = producer.cancel(block_id).await {
                        warn!(block_id, "Failed to cancel proof generation: {e}");
                    }
                }
                Ok(None)
            }
            res = retry_if(
                &self.options.proving_backoff,
                || producer.request_proof(request.clone()),
                ProducerError::is_retryable,
            ) => res.map(Some).map_err(|e: RetryError<ProducerError>| e.into_inner().into()),
        }
    }

    async fn submit(&self, result: ProofResult) {
        let block_id = result.block_id;
        if let Err(e) = self.submitter.submit_proof(result).await {
            error!(block_id, "Failed to submit proof: {e}");
        }
        self.release(block_id);
    }

    fn release(&self, block_id: u64) {
        if !self.options.skip_capacity {
            self.capacity.release_one_capacity(block_id);
        }
    }
}

/// The parts [`Prover::new`] wires together.
pub struct ProverParts<C> {
    pub client: Arc<C>,
    pub state: Arc<SharedState>,
    pub capacity: Arc<CapacityManager>,
    pub producers: ProducerSet,
    pub submitter: Arc<ProofSubmitter<C>>,
    pub clock: Arc<dyn Clock>,
}

pub struct Prover<C> {
    proving: Arc<ProvingContext<C>>,
    handler_ctx: Arc<HandlerContext<C>>,
    block_proposed: BlockProposedHandler<C>,
    requests: mpsc::Receiver<ProofRequestBody>,
    results: mpsc::Receiver<ProofResult>,
    assignment_expired: mpsc::Receiver<BlockProposedEvent>,
    /// Last L1 block scanned for the events other than `BlockProposed`.
    scanned_to: Option<u64>,
}

impl<C: ChainClient> Prover<C> {
    pub fn new(
        parts: ProverParts<C>,
        handler_config: HandlerConfig,
        options: ProverOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (requests_tx, requests) = mpsc::channel(PROOF_CHANNEL_SIZE);
        let (results_tx, results) = mpsc::channel(PROOF_CHANNEL_SIZE);
        let (expired_tx, assignment_expired) = mpsc::channel(PROOF_CHANNEL_SIZE);

        let handler_ctx = Arc::new(HandlerContext {
            client: parts.client.clone(),
            state: parts.state,
            config: handler_config,
            clock: parts.clock,
            requests: requests_tx,
            assignment_expired: expired_tx,
            cancel: cancel.clone(),
        });

        let proving = Arc::new(ProvingContext {
            client: parts.client,
            capacity: parts.capacity,
            producers: parts.producers,
            submitter: parts.submitter,
            in_flight: InFlight::default(),
            permits: Arc::new(Semaphore::new(options.max_concurrent_proving_jobs)),
            results: results_tx,
            options,
            cancel,
        });

        Self {
            proving,
            block_proposed: BlockProposedHandler::new(handler_ctx.clone()),
            handler_ctx,
            requests,
            results,
            assignment_expired,
            scanned_to: None,
        }
    }

    /// Loads the protocol tiers and places the L1 cursor.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        let client = self.proving.client.as_ref();
        let state = &self.handler_ctx.state;

        let tiers = client
            .protocol_tiers()
            .await
            .context("failed to fetch protocol tiers")?;
        info!(tiers = ?tiers.iter().map(|t| t.id).collect::<Vec<_>>(), "Protocol tiers loaded");
        state.set_tiers(tiers);

        let vars = client.state_variables().await?;
        let start_height = match self.proving.options.start_height {
            Some(height) => height,
            None if vars.last_verified_block_id == 0 => vars.genesis_height,
            None => match client.l1_origin_by_id(vars.last_verified_block_id).await {
                Ok(origin) => origin.l1_block_height,
                Err(RpcError::NotFound(_)) => vars.genesis_height,
                Err(e) => return Err(e.into()),
            },
        };
        let header = client
            .l1_header_by_number(start_height)
            .await
            .with_context(|| format!("failed to fetch starting L1 block {start_height}"))?;
        info!(
            l1_height = header.number,
            producers = ?self.proving.producers.tiers(),
            "Prover initialized"
        );
        state.set_l1_current(header);
        Ok(())
    }

    /// Drives the prover until cancelled. [`Prover::init`] must have
    /// completed first.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let cancel = self.proving.cancel.clone();
        let mut ticker = tokio::time::interval(self.proving.options.event_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Prover stopped");
                    return Ok(());
                }
                Some(result) = self.results.recv() => {
                    let proving = self.proving.clone();
                    tokio::spawn(async move { proving.submit(result).await });
                }
                Some(body) = self.requests.recv() => {
                    let proving = self.proving.clone();
                    tokio::spawn(async move {
                        let block_id = body.event.block_id;
                        if let Err(e) = proving.prove(body).await {
                            error!(block_id, "Failed to generate proof: {e:#}");
                        }
                    });
                }
                Some(event) = self.assignment_expired.recv() => {
                    let handler = AssignmentExpiredHandler::new(self.handler_ctx.clone());
                    tokio::spawn(async move {
                        let block_id = event.block_id;
                        match handler.handle(event).await {
                            Ok(decision) => debug!(block_id, ?decision, "Assignment expiry handled"),
                            Err(e) => error!(block_id, "Failed to handle assignment expiry: {e:#}"),
                        }
                    });
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_events().await {
                        error!("Failed to handle L1 events: {e:#}");
                    }
                }
            }
        }
    }

    /// Handles the protocol events emitted since the L1 cursor.
    async fn poll_events(&mut self) -> anyhow::Result<()> {
        let client = self.proving.client.clone();
        let state = self.handler_ctx.state.clone();

        let current = state
            .l1_current()
            .ok_or_else(|| anyhow!("L1 cursor not initialized"))?;
        let head = client.l1_block_number().await?;
        // The cursor block itself is scanned again, blocks handled there
        // already are skipped.
        let from = current.number;
        if from > head {
            return Ok(());
        }

        let mut proposed = client.block_proposed_events(from, head).await?;
        proposed.sort_by_key(|e| e.block_id);
        for event in proposed {
            let block_id = event.block_id;
            let flow = self
                .block_proposed
                .handle(event)
                .await
                .with_context(|| format!("failed to handle BlockProposed event of {block_id}"))?;
            if flow == Flow::EndIteration {
                self.after_rewind();
                return Ok(());
            }
        }

        let others_from = self.scanned_to.map_or(from, |s| s + 1);
        if others_from <= head {
            self.dispatch_other_events(others_from, head).await?;
        }

        self.scanned_to = Some(head);
        state.set_l1_current(client.l1_header_by_number(head).await?);
        Ok(())
    }

    fn after_rewind(&mut self) {
        let state = &self.handler_ctx.state;
        if state.take_reorg_detected() {
            let last_handled = state.last_handled_block_id();
            let cancelled = self
                .proving
                .in_flight
                .cancel_where(|block_id| block_id > last_handled);
            info!(last_handled, ?cancelled, "Cancelled proof requests of reorged blocks");
        }
        self.scanned_to = state.l1_current().map(|h| h.number);
    }

    async fn dispatch_other_events(&self, from: u64, to: u64) -> anyhow::Result<()> {
        let client = self.proving.client.as_ref();

        for event in client.transition_proved_events(from, to).await? {
            let handler = TransitionProvedHandler::new(self.handler_ctx.clone());
            tokio::spawn(async move {
                let block_id = event.block_id;
                if let Err(e) = handler.handle(event).await {
                    error!(block_id, "Failed to handle TransitionProved event: {e:#}");
                }
            });
        }

        for event in client.transition_contested_events(from, to).await? {
            let handler = TransitionContestedHandler::new(self.handler_ctx.clone());
            tokio::spawn(async move {
                let block_id = event.block_id;
                if let Err(e) = handler.handle(event).await {
                    error!(block_id, "Failed to handle TransitionContested event: {e:#}");
                }
            });
        }

        for event in client.block_verified_events(from, to).await? {
            info!(
                block_id = event.block_id,
                block_hash = %event.block_hash,
                tier = event.tier,
                "Block verified"
            );
            let cancelled = self
                .proving
                .in_flight
                .cancel_where(|block_id| block_id <= event.block_id);
            if !cancelled.is_empty() {
                info!(?cancelled, "Cancelled proof requests of verified blocks");
            }
        }
        Ok(())
    }
}
