//! Message broker seams.
//!
//! The task pool publishes through a shared [`Publisher`]; the daemon loop
//! settles each inbound request through its [`Delivery`]. [`rabbit`] backs
//! both with RabbitMQ. Tests use an in-memory implementation.

use crate::common::Result;
use async_trait::async_trait;

#[cfg(test)]
pub mod memory;
pub mod rabbit;

/// Publish path for generated records, shared by every task.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name of the queue records land in.
    fn queue(&self) -> &str;

    /// Publishes one encoded record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Publish`] if the broker did not take the
    /// record.
    async fn publish(&self, payload: &str) -> Result<()>;
}

/// One inbound request message awaiting settlement.
///
/// Each delivery is settled exactly once, by acknowledging or rejecting it.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    fn body(&self) -> &[u8];

    /// # Errors
    ///
    /// Returns [`crate::Error::Broker`] if the broker refused the settlement.
    async fn acknowledge(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`crate::Error::Broker`] if the broker refused the settlement.
    async fn reject(&self, requeue: bool) -> Result<()>;
}

/// A declared queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueHandle {
    name: String,
}

impl QueueHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
