//! Error types for the UDR generation service.
//!
//! ## Error Cases
//! - `Parse`, `RequestTooLarge`, `UnknownVariant`: the request itself is bad.
//!   These are settled by rejecting the delivery without requeue.
//! - `IncompleteRouting`: a router was built without a generator for every
//!   kind. Raised once at startup.
//! - `Generation`, `Serialization`, `Publish`: a single task failed. Counted by
//!   the aggregator and never propagated past it.
//! - `Broker`, `ChannelError`: infrastructure failures.

use thiserror::Error;
use udr::UdrKind;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the UDR generation service.
#[derive(Error, Debug)]
pub enum Error {
    /// The request body could not be decoded.
    #[error("Malformed request: {reason}")]
    Parse { reason: String },

    /// The request asked for more records than this instance will produce.
    #[error("Request for {count} records exceeds the limit of {limit}")]
    RequestTooLarge { count: usize, limit: usize },

    /// The request's error type does not name a known variant.
    #[error("Unknown error type `{tag}`")]
    UnknownVariant { tag: String },

    /// A router was built without a generator for every variant.
    #[error("No generator bound for {missing:?}")]
    IncompleteRouting { missing: Vec<UdrKind> },

    /// A generator failed to produce a record.
    #[error("UDR generation failed: {0}")]
    Generation(#[source] udr::Error),

    /// A record could not be encoded.
    #[error("UDR serialization failed: {0}")]
    Serialization(#[source] udr::Error),

    /// The broker did not take a record.
    #[error("Publish to `{queue}` failed: {context}")]
    Publish { queue: String, context: String },

    /// Connection, channel, queue or settlement failure.
    #[error("Broker error: {context}")]
    Broker { context: String },

    /// Internal channel or semaphore failure.
    #[error("Channel communication error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Whether the error was caused by the request rather than by this
    /// service.
    pub const fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::RequestTooLarge { .. } | Self::UnknownVariant { .. }
        )
    }

    pub(crate) fn broker(context: impl core::fmt::Display) -> Self {
        Self::Broker {
            context: context.to_string(),
        }
    }
}
