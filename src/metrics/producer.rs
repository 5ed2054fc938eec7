//! The producer capability: describe + collect.
//!
//! Anything that can declare metric families and yield samples for them
//! can be registered with the [`MetricRegistry`](super::MetricRegistry).
//! The registry never depends on a concrete producer type, so the
//! statistics source can be swapped without touching registry or server
//! code.

use super::{MetricDescriptor, MetricSample};
use thiserror::Error;

/// Errors a producer can report from a collect pass.
///
/// These are recovered at the registry level: the failing producer
/// contributes no samples to the scrape, the others still render.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The upstream statistics source could not be reached or queried.
    #[error("upstream unreachable: {0}")]
    Upstream(String),
    /// The process identifier could not be resolved.
    #[error("process identity unresolved: {0}")]
    Pid(String),
    /// An OS resource counter could not be read.
    #[error("resource read failed: {0}")]
    Resource(#[from] std::io::Error),
    /// A resource counter was readable but not in the expected shape.
    #[error("malformed resource data: {0}")]
    Malformed(String),
    /// A yielded sample does not match any declared descriptor.
    #[error("sample does not match a declared descriptor: {0}")]
    SchemaMismatch(String),
}

/// A source of metric samples.
///
/// Implementations must declare every family they will ever yield via
/// [`describe`](Producer::describe); samples collected later are
/// validated against those declarations (name, type, label schema).
pub trait Producer: Send + Sync {
    /// Stable identity used for logging and duplicate detection.
    fn name(&self) -> &str;

    /// Declares the metric families this producer yields.
    fn describe(&self) -> Vec<MetricDescriptor>;

    /// Performs one collection pass.
    ///
    /// Called once per scrape. Implementations must not cache state
    /// between calls that would make a scrape observe stale identity
    /// (for example a pid resolved on a previous pass).
    fn collect(&self) -> Result<Vec<MetricSample>, CollectError>;
}
