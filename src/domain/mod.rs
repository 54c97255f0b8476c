//! Domain layer: the command-and-control core.
//!
//! This module contains the pure business logic and domain models described
//! in the data model and component design — free of any SQL, HTTP, or wire
//! framing concerns, which live in `adapters`.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
