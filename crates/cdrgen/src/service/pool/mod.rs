//! Bounded pool of generation tasks.
//!
//! [`TaskPool::run`] spawns one Tokio task per requested record. All requests
//! share one semaphore of `max_inflight_tasks` permits: a task is spawned only
//! once it holds a permit and gives it back when its record is published (or
//! has failed), so the process never runs more generation tasks at once than
//! configured, however many requests are in flight.

mod worker;

use crate::service::aggregator::OutcomeSender;
use crate::service::broker::Publisher;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;
use udr::{Codec, Generate};

pub struct TaskPool {
    permits: Arc<Semaphore>,
    publisher: Arc<dyn Publisher>,
    codec: Arc<dyn Codec>,
}

impl TaskPool {
    /// # Panics
    ///
    /// Panics if `max_inflight_tasks` is zero or exceeds
    /// [`Semaphore::MAX_PERMITS`]. Configuration validation rules out both.
    pub fn new(
        max_inflight_tasks: usize,
        publisher: Arc<dyn Publisher>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        assert!(
            max_inflight_tasks > 0,
            "task pool needs at least one permit"
        );
        Self {
            permits: Arc::new(Semaphore::new(max_inflight_tasks)),
            publisher,
            codec,
        }
    }

    /// Permits not held by a running task.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawns `count` tasks that each generate, encode and publish one record
    /// and report to `sink`. Returns once every task has been spawned, which
    /// may be before they finish.
    ///
    /// `sink` is dropped on return, so the aggregator sees the channel close
    /// once the last task has reported. Returns the number of tasks spawned,
    /// which is `count` unless the semaphore was closed.
    pub async fn run(
        &self,
        count: usize,
        generator: Arc<dyn Generate>,
        sink: OutcomeSender,
    ) -> usize {
        let mut spawned = 0;

        for task in 0..count {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Task pool closed after {spawned} of {count} tasks: {e}");
                    break;
                }
            };

            tokio::spawn(
                worker::run_task(
                    task,
                    permit,
                    Arc::clone(&generator),
                    Arc::clone(&self.codec),
                    Arc::clone(&self.publisher),
                    sink.clone(),
                )
                .in_current_span(),
            );
            spawned += 1;
        }

        tracing::trace!(spawned, "All tasks spawned");
        spawned
    }

    /// Stops handing out permits. Tasks already running finish normally;
    /// [`Self::run`] spawns nothing further.
    pub fn close(&self) {
        self.permits.close();
    }
}
