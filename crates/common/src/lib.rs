//! Shared configuration, error types, IDs, and observability primitives for fedq crates.
//!
//! Architecture role:
//! - defines engine configuration and per-source connection settings
//! - provides the common [`FedqError`] / [`Result`] contracts
//! - hosts the Prometheus metrics registry used by the execution engine
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::{EngineConfig, SourceConfig, StrategyMode};
pub use error::{FedqError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;
