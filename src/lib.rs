//! PgBouncer Exporter Library
//!
//! A pull-based Prometheus exporter for PgBouncer, the PostgreSQL
//! connection-pooling proxy. Statistics are fetched from the PgBouncer
//! admin console on every scrape and served as text exposition over a
//! basic-auth gated HTTP surface.
//!
//! # Architecture
//!
//! Independent producers are composed into one registry behind a
//! credential gate:
//!
//! ```text
//! StatsProducer ──────┐
//! BuildInfoProducer ──┼→ MetricRegistry → ExposureServer
//! ProcessCollector ───┘                         ↑
//!     (optional)                          CredentialGate
//! ```
//!
//! # Design Principles
//!
//! - **Degrade, don't fail**: a producer that cannot collect loses its
//!   samples for that scrape; the scrape itself still answers 200
//! - **Stateless between scrapes**: every request triggers a fresh
//!   collection pass; nothing is cached or persisted
//! - **Closed by default**: absent credentials reject every request
//!   rather than disabling authentication
//!
//! # Example
//!
//! ```
//! use pgbouncer_exporter::{
//!     auth::{CredentialGate, Credentials},
//!     metrics::MetricRegistry,
//!     producers::BuildInfoProducer,
//! };
//!
//! let mut registry = MetricRegistry::new();
//! registry.register(Box::new(BuildInfoProducer::new())).unwrap();
//!
//! let gate = CredentialGate::new(Credentials::from_env());
//!
//! let text = registry.render().unwrap();
//! assert!(text.contains("pgbouncer_exporter_build_info"));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod metrics;
pub mod producers;
pub mod server;

// Re-export commonly used types at crate root
pub use auth::{CredentialGate, Credentials};
pub use config::{Cli, Settings};
pub use metrics::{MetricRegistry, Producer};
pub use producers::{BuildInfoProducer, ProcessCollector, StatsProducer};
pub use server::{ExposureServer, ServerConfig};

/// Metric namespace for PgBouncer statistics and process metrics.
pub const NAMESPACE: &str = "pgbouncer";

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
