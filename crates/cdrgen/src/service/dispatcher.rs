//! Request dispatch and the daemon loop.
//!
//! The daemon loop pulls deliveries off the consumer stream and hands each to
//! [`Dispatcher::dispatch`], which decodes and routes it and then detaches a
//! request task so the loop can go straight back to the stream. A request task
//! runs the task pool and the request's aggregator side by side and settles
//! the delivery once the aggregator has every outcome.
//!
//! Shutdown stops the loop only. Request tasks already running are not
//! cancelled and are lost when the runtime goes away.

use crate::common::{Error, RequestSpec, Result};
use crate::service::aggregator::{self, Tally};
use crate::service::broker::Delivery;
use crate::service::config::Limits;
use crate::service::pool::TaskPool;
use crate::service::router::{Route, Router};
use crate::service::telemetry::{
    decrement_requests_inflight, increment_requests, increment_requests_inflight,
    increment_requests_rejected, record_request_duration,
};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Shared request-processing state. Cloning is cheap; clones share the
/// router, the pool and the counters.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    pool: Arc<TaskPool>,
    limits: Limits,
    next_request: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(router: Router, pool: TaskPool, limits: Limits) -> Self {
        Self {
            router: Arc::new(router),
            pool: Arc::new(pool),
            limits,
            next_request: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    /// Requests dispatched but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Decodes `body`, enforces the size limit and routes the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`], [`Error::RequestTooLarge`] or
    /// [`Error::UnknownVariant`].
    pub fn admit(&self, body: &[u8]) -> Result<(RequestSpec, Route)> {
        let spec = RequestSpec::decode(body)?;
        spec.ensure_within(self.limits.max_records_per_request)?;
        let route = self.router.route(&spec.error_type)?;
        Ok((spec, route))
    }

    /// Handles one inbound delivery.
    ///
    /// A delivery that cannot be admitted is rejected without requeue before
    /// this returns and `None` comes back. Otherwise the request is detached
    /// onto its own task, whose handle is returned; dropping the handle does
    /// not stop the request.
    pub async fn dispatch<D: Delivery>(&self, delivery: D) -> Option<JoinHandle<Result<Tally>>> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        increment_requests();

        let (spec, route) = match self.admit(delivery.body()) {
            Ok(admitted) => admitted,
            Err(e) => {
                increment_requests_rejected();
                tracing::warn!(request = id, "Rejecting request: {e}");
                if let Err(e) = delivery.reject(false).await {
                    tracing::error!(request = id, "Failed to reject request: {e}");
                }
                return None;
            }
        };

        let span = tracing::info_span!("request", id, kind = %route.kind, count = spec.count);
        let this = self.clone();
        this.in_flight.fetch_add(1, Ordering::Relaxed);
        increment_requests_inflight();

        Some(tokio::spawn(
            async move {
                let started = Instant::now();
                let settled = this.process(spec.count, route, &delivery).await;
                this.in_flight.fetch_sub(1, Ordering::Relaxed);
                decrement_requests_inflight();
                record_request_duration(started.elapsed().as_secs_f64() * 1_000.0);

                match &settled {
                    Ok(tally) if tally.is_success() => {
                        tracing::info!("Request acknowledged");
                    }
                    Ok(tally) => {
                        increment_requests_rejected();
                        tracing::warn!(
                            failed = tally.failed,
                            missing = tally.missing,
                            "Request rejected"
                        );
                    }
                    Err(e) => tracing::error!("Failed to settle request: {e}"),
                }
                settled
            }
            .instrument(span),
        ))
    }

    /// Runs `count` tasks for `route` and settles `delivery` once all of them
    /// have reported.
    ///
    /// # Errors
    ///
    /// Returns the broker's error if settling the delivery fails.
    pub async fn process<D: Delivery + ?Sized>(
        &self,
        count: usize,
        route: Route,
        delivery: &D,
    ) -> Result<Tally> {
        let (sink, aggregator) = aggregator::channel(count, self.limits.outcome_backlog);
        let (_, settled) = tokio::join!(
            self.pool.run(count, route.generator, sink),
            aggregator.resolve(delivery)
        );
        settled
    }

    /// Runs `count` tasks for `route` and waits for all of them to report.
    /// Nothing is settled.
    pub async fn execute(&self, count: usize, route: Route) -> Tally {
        let (sink, aggregator) = aggregator::channel(count, self.limits.outcome_backlog);
        let (_, tally) = tokio::join!(
            self.pool.run(count, route.generator, sink),
            aggregator.collect()
        );
        tally
    }
}

/// Serves `deliveries` until `shutdown` is cancelled.
///
/// Each delivery is dispatched and the loop moves on without waiting for the
/// request to finish.
///
/// # Errors
///
/// Returns the consumer's error if the stream fails, and [`Error::Broker`]
/// if it ends while shutdown has not been requested.
pub async fn run_daemon<S, D>(
    dispatcher: &Dispatcher,
    mut deliveries: S,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: Stream<Item = Result<D>> + Unpin,
    D: Delivery,
{
    tracing::info!("Waiting for UDR requests");

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!(
                    in_flight = dispatcher.in_flight(),
                    "Shutdown requested, no longer consuming"
                );
                return Ok(());
            }
            next = deliveries.next() => next,
        };

        match next {
            Some(Ok(delivery)) => {
                // Detached: the request settles on its own.
                let _ = dispatcher.dispatch(delivery).await;
            }
            Some(Err(e)) => {
                tracing::error!("Consumer failed: {e}");
                return Err(e);
            }
            None => {
                return Err(Error::Broker {
                    context: "consumer stream ended".into(),
                });
            }
        }
    }
}
