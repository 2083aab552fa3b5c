//! Per-request completion tracking.
//!
//! Every request gets its own bounded outcome channel from [`channel`]. The
//! task pool holds the sending side and every task it spawns sends exactly
//! one [`TaskOutcome`]; the [`Aggregator`] holds the receiving side and
//! counts outcomes until it has seen as many as the request asked for. Only
//! then is the request's delivery settled, so an acknowledgement can never
//! overtake the work it acknowledges.

use crate::common::Result;
use crate::service::broker::Delivery;
use tokio::sync::mpsc;

/// What became of one generation task.
#[derive(Debug)]
pub struct TaskOutcome {
    /// Position of the task within its request.
    pub task: usize,
    pub result: Result<()>,
}

impl TaskOutcome {
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub type OutcomeSender = mpsc::Sender<TaskOutcome>;

/// Opens the private outcome channel of a request expecting `expected`
/// outcomes.
///
/// The buffer holds at most `backlog` outcomes (and never more than the
/// request can produce); tasks wait when it is full.
pub fn channel(expected: usize, backlog: usize) -> (OutcomeSender, Aggregator) {
    let (tx, rx) = mpsc::channel(expected.min(backlog).max(1));
    (
        tx,
        Aggregator {
            expected,
            outcomes: rx,
        },
    )
}

/// Summary of a request once its outcomes are in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub expected: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Outcomes that can never arrive because every sender is gone.
    pub missing: usize,
}

impl Tally {
    pub const fn received(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Every expected outcome arrived and succeeded. Vacuously true for an
    /// empty request.
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.missing == 0 && self.succeeded == self.expected
    }

    pub const fn disposition(&self) -> Disposition {
        if self.is_success() {
            Disposition::Acknowledge
        } else {
            Disposition::Reject { requeue: false }
        }
    }
}

/// Final settlement of a request's delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Acknowledge,
    Reject { requeue: bool },
}

impl Disposition {
    /// # Errors
    ///
    /// Propagates the broker's refusal to settle.
    pub async fn apply<D: Delivery + ?Sized>(self, delivery: &D) -> Result<()> {
        match self {
            Self::Acknowledge => delivery.acknowledge().await,
            Self::Reject { requeue } => delivery.reject(requeue).await,
        }
    }
}

/// Receiving side of a request's outcome channel.
pub struct Aggregator {
    expected: usize,
    outcomes: mpsc::Receiver<TaskOutcome>,
}

impl Aggregator {
    pub const fn expected(&self) -> usize {
        self.expected
    }

    /// Receives outcomes until `expected` have arrived or every sender has
    /// been dropped, whichever comes first.
    pub async fn collect(mut self) -> Tally {
        let mut tally = Tally {
            expected: self.expected,
            ..Tally::default()
        };

        while tally.received() < self.expected {
            match self.outcomes.recv().await {
                Some(outcome) if outcome.is_success() => tally.succeeded += 1,
                Some(TaskOutcome { task, result }) => {
                    tally.failed += 1;
                    if let Err(e) = result {
                        tracing::debug!(task, "Outcome failed: {e}");
                    }
                }
                None => {
                    tally.missing = self.expected - tally.received();
                    tracing::warn!(
                        missing = tally.missing,
                        "Outcome channel closed before every task reported"
                    );
                    break;
                }
            }
        }

        tally
    }

    /// Collects every outcome, then acknowledges `delivery` if all succeeded
    /// and rejects it without requeue otherwise.
    ///
    /// # Errors
    ///
    /// Returns the broker's error if the settlement itself fails.
    pub async fn resolve<D: Delivery + ?Sized>(self, delivery: &D) -> Result<Tally> {
        let tally = self.collect().await;
        tally.disposition().apply(delivery).await?;
        Ok(tally)
    }
}
