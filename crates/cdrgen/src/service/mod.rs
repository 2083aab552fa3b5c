//! Service-side components of `cdrgen`.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`telemetry`] - Logging initialization and optional OpenTelemetry
//!   metrics.
//! - [`broker`] - Publisher and delivery seams, and their RabbitMQ backing.
//! - [`router`] - Error tag to generator mapping.
//! - [`pool`] - Bounded generation task pool.
//! - [`aggregator`] - Per-request outcome collection and settlement.
//! - [`dispatcher`] - Request dispatch and the daemon loop.
//! - [`batch`] - One-shot runner.
//!
//! These components are wired together in the binary's `main.rs`.

pub mod aggregator;
pub mod batch;
pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod pool;
pub mod router;
pub mod telemetry;

#[cfg(test)]
mod tests;
