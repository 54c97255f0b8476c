//! Command-and-control core for a fleet of remote node agents.
//!
//! This crate owns the durable command queue, the dispatch/retry/timeout
//! router, MAC-based host reconciliation, in-process event fan-out, and the
//! webhook/push egress adapters. The operator-facing HTTP surface, node
//! authentication, the WebSocket transport, environment-based config
//! loading, and schema migrations beyond the embedded set are left to the
//! binaries that host this core.

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
