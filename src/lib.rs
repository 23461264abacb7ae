//! Configuration loading, logging setup, and the [`client::RadiusClient`]
//! facade around the `radius-client-core` engine. See `main.rs` for the
//! binary entrypoint that wires these together.

pub mod client;
pub mod config;
pub mod logger;
