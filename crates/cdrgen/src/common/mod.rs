//! Shared types and error definitions used across the `cdrgen` service.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized error type used by decoding, routing, the task
//!   pool and the broker adapters.
//! - [`request`] - The wire format of a generation request and its decoder.

pub mod error;
pub mod request;

pub use error::{Error, Result};
pub use request::{ErrorTag, RequestSpec};
