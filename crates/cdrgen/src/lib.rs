//! # `cdrgen`: synthetic UDR publisher
//!
//! `cdrgen` feeds billing pipelines with test traffic. It consumes generation
//! requests from a RabbitMQ queue, each asking for `count` usage detail
//! records of one variant (normal, or deliberately broken in time, EUI or
//! format), and publishes that many records to the record queue. A request is
//! acknowledged only after every one of its records was published; if any
//! failed, it is rejected without requeue.
//!
//! ## Highlights
//!
//! - **Fire-and-forget dispatch**: the consumer loop never waits on a request,
//!   so many requests overlap.
//! - **Bounded task pool**: one semaphore caps generation tasks process-wide.
//! - **Per-request aggregation**: each request owns a private, bounded outcome
//!   channel, so outcomes are never attributed to the wrong request.
//! - **Explicit routing**: unknown variants are refused, never defaulted.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin cdrgen -- --daemon
//! ```
//!
//! Without `--daemon`, one normal record is published and the process exits.
//!
//! ## Module Overview
//!
//! - [`common`] - Error type and request decoding.
//! - [`service`] - Broker, routing, task pool, aggregation, daemon and batch
//!   runners, configuration and telemetry.

pub mod common;
pub mod service;

pub use crate::common::{Error, Result};
