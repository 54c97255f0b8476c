//! Infrastructure layer: cross-cutting concerns that sit outside the
//! domain/adapters/services split — configuration loading and logging setup.
//! Database connectivity itself lives under `adapters::sqlite::connection`,
//! next to the store implementations that use it.

pub mod config;
pub mod logging;
