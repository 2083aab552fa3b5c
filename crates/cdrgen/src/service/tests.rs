use crate::common::{Error, Result};
use crate::service::batch::run_batch;
use crate::service::broker::Publisher;
use crate::service::broker::memory::{MemoryDelivery, MemoryPublisher, Settlement};
use crate::service::config::Limits;
use crate::service::dispatcher::{Dispatcher, run_daemon};
use crate::service::pool::TaskPool;
use crate::service::router::Router;
use async_trait::async_trait;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use udr::{EuiErrorUdr, Generate, JsonCodec, NormalUdr, TimeErrorUdr, Udr, UdrKind};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports itself as the format error generator but never produces a record.
struct FailingFormatUdr;

impl Generate for FailingFormatUdr {
    fn kind(&self) -> UdrKind {
        UdrKind::FormatError
    }

    fn generate(&self) -> udr::Result<Udr> {
        Err(udr::Error::Generation {
            reason: "refusing".into(),
        })
    }
}

/// Holds the first publish until [`GatedPublisher::open`] is called.
struct GatedPublisher {
    gate: Semaphore,
    first_taken: AtomicBool,
    inner: MemoryPublisher,
}

impl GatedPublisher {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            first_taken: AtomicBool::new(false),
            inner: MemoryPublisher::new("udr"),
        }
    }

    fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Publisher for GatedPublisher {
    fn queue(&self) -> &str {
        self.inner.queue()
    }

    async fn publish(&self, payload: &str) -> Result<()> {
        if !self.first_taken.swap(true, Ordering::SeqCst) {
            let _permit = self.gate.acquire().await.map_err(|e| Error::ChannelError {
                context: e.to_string(),
            })?;
        }
        self.inner.publish(payload).await
    }
}

fn dispatcher_with(publisher: Arc<dyn Publisher>, router: Router, limits: Limits) -> Dispatcher {
    let pool = TaskPool::new(limits.max_inflight_tasks, publisher, Arc::new(JsonCodec));
    Dispatcher::new(router, pool, limits)
}

fn standard(publisher: Arc<dyn Publisher>) -> Dispatcher {
    dispatcher_with(publisher, Router::standard(), Limits::default())
}

async fn settle(rx: oneshot::Receiver<Settlement>) -> Settlement {
    timeout(SETTLE_TIMEOUT, rx)
        .await
        .expect("delivery was never settled")
        .expect("delivery dropped unsettled")
}

#[tokio::test]
async fn scenario_a_normal_request_is_acknowledged() {
    let publisher = Arc::new(MemoryPublisher::new("udr"));
    let dispatcher = standard(publisher.clone());
    let (delivery, settled) = MemoryDelivery::new(&br#"{"errorType": 0, "count": 3}"#[..]);

    let tally = dispatcher
        .dispatch(delivery)
        .await
        .expect("request was admitted")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(tally.succeeded, 3);
    assert_eq!(settle(settled).await, Settlement::Acknowledged);
    assert_eq!(publisher.published().len(), 3);
    for payload in publisher.published() {
        let udr: Udr = serde_json::from_str(&payload).unwrap();
        assert_eq!(udr.validate(), Ok(()));
    }
}

#[tokio::test]
async fn scenario_b_one_failed_publish_rejects_the_request() {
    let publisher = Arc::new(MemoryPublisher::failing_on("udr", [0]));
    let dispatcher = standard(publisher.clone());
    let (delivery, settled) =
        MemoryDelivery::new(&br#"{"errorType": "time_error", "count": 2}"#[..]);

    let tally = dispatcher
        .dispatch(delivery)
        .await
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!((tally.succeeded, tally.failed), (1, 1));
    assert_eq!(
        settle(settled).await,
        Settlement::Rejected { requeue: false }
    );
    assert!(publisher.published().len() <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_c_concurrent_requests_keep_their_own_outcomes() {
    let publisher = Arc::new(MemoryPublisher::new("udr"));
    let router = Router::builder()
        .bind(Arc::new(NormalUdr))
        .bind(Arc::new(TimeErrorUdr))
        .bind(Arc::new(EuiErrorUdr))
        .bind(Arc::new(FailingFormatUdr))
        .build()
        .unwrap();
    let limits = Limits {
        max_inflight_tasks: 2,
        outcome_backlog: 1,
        ..Limits::default()
    };
    let dispatcher = dispatcher_with(publisher.clone(), router, limits);

    let (normal, normal_settled) = MemoryDelivery::new(&br#"{"errorType": 0, "count": 5}"#[..]);
    let (broken, broken_settled) = MemoryDelivery::new(&br#"{"errorType": 3, "count": 3}"#[..]);

    let normal = dispatcher.dispatch(normal).await.unwrap();
    let broken = dispatcher.dispatch(broken).await.unwrap();
    let (normal, broken) = tokio::join!(normal, broken);
    let (normal, broken) = (normal.unwrap().unwrap(), broken.unwrap().unwrap());

    assert_eq!(
        (normal.expected, normal.succeeded, normal.failed),
        (5, 5, 0)
    );
    assert_eq!(
        (broken.expected, broken.succeeded, broken.failed),
        (3, 0, 3)
    );
    assert_eq!(settle(normal_settled).await, Settlement::Acknowledged);
    assert_eq!(
        settle(broken_settled).await,
        Settlement::Rejected { requeue: false }
    );
    assert_eq!(publisher.published().len(), 5);
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn inadmissible_requests_are_rejected_before_any_work() {
    let publisher = Arc::new(MemoryPublisher::new("udr"));
    let limits = Limits {
        max_records_per_request: 10,
        ..Limits::default()
    };
    let dispatcher = dispatcher_with(publisher.clone(), Router::standard(), limits);

    for body in [
        &b"garbage"[..],
        br#"{"errorType": 0, "count": -4}"#,
        br#"{"errorType": 9, "count": 1}"#,
        br#"{"errorType": "TIMEOUT", "count": 1}"#,
        br#"{"errorType": 0, "count": 11}"#,
    ] {
        let (delivery, settled) = MemoryDelivery::new(body);
        assert!(dispatcher.dispatch(delivery).await.is_none());
        assert_eq!(
            settle(settled).await,
            Settlement::Rejected { requeue: false }
        );
    }

    assert_eq!(publisher.attempts(), 0);
    assert_eq!(
        dispatcher.pool().available_permits(),
        limits.max_inflight_tasks
    );
}

#[test]
fn admit_reports_the_cause() {
    let dispatcher = standard(Arc::new(MemoryPublisher::new("udr")));

    assert!(matches!(
        dispatcher.admit(b"{"),
        Err(Error::Parse { .. })
    ));
    assert!(matches!(
        dispatcher.admit(br#"{"errorType": "bogus", "count": 1}"#),
        Err(Error::UnknownVariant { .. })
    ));
    assert!(matches!(
        dispatcher.admit(br#"{"count": 2000000}"#),
        Err(Error::RequestTooLarge { count: 2_000_000, .. })
    ));

    let (spec, route) = dispatcher.admit(br#"{"ErrorType": "fmt_err", "Count": 2}"#).unwrap();
    assert_eq!(spec.count, 2);
    assert_eq!(route.kind, UdrKind::FormatError);
}

#[tokio::test]
async fn empty_request_is_acknowledged_without_publishing() {
    let publisher = Arc::new(MemoryPublisher::new("udr"));
    let dispatcher = standard(publisher.clone());
    let (delivery, settled) = MemoryDelivery::new(&br#"{"errorType": 2, "count": 0}"#[..]);

    let tally = dispatcher
        .dispatch(delivery)
        .await
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(tally.expected, 0);
    assert_eq!(settle(settled).await, Settlement::Acknowledged);
    assert_eq!(publisher.attempts(), 0);
}

#[tokio::test]
async fn daemon_serves_until_shutdown() {
    let publisher = Arc::new(MemoryPublisher::new("udr"));
    let dispatcher = standard(publisher.clone());
    let (tx, rx) = mpsc::channel::<Result<MemoryDelivery>>(8);
    let shutdown = CancellationToken::new();

    let daemon = tokio::spawn({
        let shutdown = shutdown.clone();
        let dispatcher = dispatcher.clone();
        async move { run_daemon(&dispatcher, ReceiverStream::new(rx), shutdown).await }
    });

    let (good, good_settled) = MemoryDelivery::new(&br#"{"errorType": "normal", "count": 4}"#[..]);
    let (bad, bad_settled) = MemoryDelivery::new(&b"{not json"[..]);
    tx.send(Ok(good)).await.unwrap();
    tx.send(Ok(bad)).await.unwrap();

    assert_eq!(settle(good_settled).await, Settlement::Acknowledged);
    assert_eq!(
        settle(bad_settled).await,
        Settlement::Rejected { requeue: false }
    );

    shutdown.cancel();
    let stopped = timeout(SETTLE_TIMEOUT, daemon).await.unwrap().unwrap();
    assert!(stopped.is_ok());
    assert_eq!(publisher.published().len(), 4);
}

#[tokio::test]
async fn daemon_does_not_wait_for_a_slow_request() {
    let publisher = Arc::new(GatedPublisher::new());
    let dispatcher = standard(publisher.clone());
    let (tx, rx) = mpsc::channel::<Result<MemoryDelivery>>(8);
    let shutdown = CancellationToken::new();

    let daemon = tokio::spawn({
        let shutdown = shutdown.clone();
        let dispatcher = dispatcher.clone();
        async move { run_daemon(&dispatcher, ReceiverStream::new(rx), shutdown).await }
    });

    let (slow, mut slow_settled) = MemoryDelivery::new(&br#"{"count": 1}"#[..]);
    tx.send(Ok(slow)).await.unwrap();
    // Wait until the slow request holds the gate.
    while !publisher.first_taken.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }

    let (fast, fast_settled) = MemoryDelivery::new(&br#"{"count": 1}"#[..]);
    tx.send(Ok(fast)).await.unwrap();

    assert_eq!(settle(fast_settled).await, Settlement::Acknowledged);
    assert!(matches!(
        slow_settled.try_recv(),
        Err(oneshot::error::TryRecvError::Empty)
    ));

    publisher.open();
    assert_eq!(settle(slow_settled).await, Settlement::Acknowledged);

    shutdown.cancel();
    assert!(daemon.await.unwrap().is_ok());
}

#[tokio::test]
async fn daemon_stops_when_the_consumer_fails_or_ends() {
    let dispatcher = standard(Arc::new(MemoryPublisher::new("udr")));

    let (tx, rx) = mpsc::channel::<Result<MemoryDelivery>>(1);
    tx.send(Err(Error::Broker {
        context: "channel closed by server".into(),
    }))
    .await
    .unwrap();
    let failed = run_daemon(
        &dispatcher,
        ReceiverStream::new(rx),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(failed, Err(Error::Broker { ref context }) if context.contains("server")));

    let (tx, rx) = mpsc::channel::<Result<MemoryDelivery>>(1);
    drop(tx);
    let ended = run_daemon(
        &dispatcher,
        ReceiverStream::new(rx),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(ended, Err(Error::Broker { .. })));
}

#[tokio::test]
async fn batch_publishes_one_normal_record() {
    let publisher = Arc::new(MemoryPublisher::new("udr"));
    let dispatcher = standard(publisher.clone());

    let tally = run_batch(&dispatcher).await.unwrap();

    assert!(tally.is_success());
    assert_eq!(tally.expected, 1);
    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let udr: Udr = serde_json::from_str(&published[0]).unwrap();
    assert_eq!(udr.validate(), Ok(()));
}

#[tokio::test]
async fn batch_reports_a_failed_publish() {
    let dispatcher = standard(Arc::new(MemoryPublisher::unavailable("udr")));

    let tally = run_batch(&dispatcher).await.unwrap();

    assert!(!tally.is_success());
    assert_eq!(tally.failed, 1);
}
