//! Metric model, producer capability, and registry.
//!
//! This module is the aggregation core of the exporter. Independent
//! producers each describe a fixed set of metric families and yield
//! samples for them on every scrape; the registry composes their
//! output into one text exposition.
//!
//! # Partial failure
//!
//! A scrape never fails because a single producer failed. The registry
//! renders whatever could be gathered and reports the outcome of the
//! pass through the meta family
//! `pgbouncer_exporter_scrape_producers{state="ok"|"failed"}`.
//!
//! # Example
//!
//! ```
//! use pgbouncer_exporter::metrics::{
//!     CollectError, MetricDescriptor, MetricKind, MetricRegistry, MetricSample, Producer,
//! };
//!
//! struct Constant;
//!
//! impl Producer for Constant {
//!     fn name(&self) -> &str {
//!         "constant"
//!     }
//!
//!     fn describe(&self) -> Vec<MetricDescriptor> {
//!         vec![MetricDescriptor::new(
//!             "constant_value",
//!             "A constant value.",
//!             MetricKind::Gauge,
//!         )]
//!     }
//!
//!     fn collect(&self) -> Result<Vec<MetricSample>, CollectError> {
//!         Ok(vec![MetricSample::gauge("constant_value", 1.0)])
//!     }
//! }
//!
//! let mut registry = MetricRegistry::new();
//! registry.register(Box::new(Constant)).unwrap();
//!
//! let text = registry.render().unwrap();
//! assert!(text.contains("constant_value 1"));
//! ```

mod exposition;
mod producer;
mod registry;
mod sample;

pub use exposition::{ExpositionError, TEXT_FORMAT};
pub use producer::{CollectError, Producer};
pub use registry::{MetricRegistry, RegistryError};
pub use sample::{MetricDescriptor, MetricKind, MetricSample};
