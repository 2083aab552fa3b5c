//! In-memory broker used by the unit tests.

use crate::common::{Error, Result};
use crate::service::broker::{Delivery, Publisher};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Records every payload it is handed. Publish attempts listed in
/// `failing` (zero-based, in call order) fail instead.
pub struct MemoryPublisher {
    queue: String,
    attempts: AtomicUsize,
    failing: HashSet<usize>,
    fail_all: bool,
    published: Mutex<Vec<String>>,
}

impl MemoryPublisher {
    pub fn new(queue: &str) -> Self {
        Self::failing_on(queue, [])
    }

    pub fn failing_on(queue: &str, attempts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            queue: queue.to_owned(),
            attempts: AtomicUsize::new(0),
            failing: attempts.into_iter().collect(),
            fail_all: false,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(queue: &str) -> Self {
        Self {
            fail_all: true,
            ..Self::new(queue)
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn publish(&self, payload: &str) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        // Let sibling tasks interleave the way network I/O would.
        tokio::task::yield_now().await;

        if self.fail_all || self.failing.contains(&attempt) {
            return Err(Error::Publish {
                queue: self.queue.clone(),
                context: format!("injected failure on attempt {attempt}"),
            });
        }
        self.published.lock().push(payload.to_owned());
        Ok(())
    }
}

/// How a [`MemoryDelivery`] was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Acknowledged,
    Rejected { requeue: bool },
}

impl Settlement {
    pub const fn is_acknowledged(self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

/// A delivery that reports its settlement over a oneshot channel and refuses
/// to be settled twice.
pub struct MemoryDelivery {
    body: Vec<u8>,
    settled: Mutex<Option<oneshot::Sender<Settlement>>>,
}

impl MemoryDelivery {
    pub fn new(body: impl Into<Vec<u8>>) -> (Self, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        let delivery = Self {
            body: body.into(),
            settled: Mutex::new(Some(tx)),
        };
        (delivery, rx)
    }

    fn settle(&self, settlement: Settlement) -> Result<()> {
        let tx = self
            .settled
            .lock()
            .take()
            .ok_or_else(|| Error::broker("delivery already settled"))?;
        // The test may have stopped listening; the settlement still happened.
        let _ = tx.send(settlement);
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn acknowledge(&self) -> Result<()> {
        self.settle(Settlement::Acknowledged)
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.settle(Settlement::Rejected { requeue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliveries_settle_once() {
        let (delivery, settled) = MemoryDelivery::new(&b"{}"[..]);
        delivery.reject(false).await.unwrap();
        assert!(delivery.acknowledge().await.is_err());
        assert_eq!(
            settled.await.unwrap(),
            Settlement::Rejected { requeue: false }
        );
    }

    #[tokio::test]
    async fn injected_failures_hit_the_listed_attempts() {
        let publisher = MemoryPublisher::failing_on("udr", [1]);
        assert!(publisher.publish("a").await.is_ok());
        assert!(publisher.publish("b").await.is_err());
        assert!(publisher.publish("c").await.is_ok());
        assert_eq!(publisher.published(), ["a", "c"]);
        assert_eq!(publisher.attempts(), 3);
    }
}
