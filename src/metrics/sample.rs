//! Metric sample and descriptor types.
//!
//! Descriptors are declared once per producer and fix the name, type,
//! and label schema of a family. Samples are transient observations
//! produced during a single scrape; they are never retained between
//! scrapes.

use std::collections::BTreeMap;

/// The type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing value.
    Counter,
    /// Value that can go up and down.
    Gauge,
    /// Value with no declared semantics.
    Untyped,
}

/// Declaration of a metric family: name, help text, type, and label schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    /// Metric family name.
    pub name: String,
    /// Help text rendered on the `# HELP` line.
    pub help: String,
    /// Family type.
    pub kind: MetricKind,
    /// Label keys every sample of this family must carry.
    pub labels: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a descriptor with no labels.
    pub fn new(name: impl Into<String>, help: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            labels: Vec::new(),
        }
    }

    /// Creates a descriptor with the given label keys.
    pub fn with_labels(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        labels: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
        }
    }
}

/// A single observation yielded during one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Family name; must match a declared descriptor.
    pub name: String,
    /// Label key/value pairs. Keys are unique and iterate in sorted
    /// order, keeping the exposition deterministic.
    pub labels: BTreeMap<String, String>,
    /// Observed value.
    pub value: f64,
    /// Family type; must match the declared descriptor.
    pub kind: MetricKind,
}

impl MetricSample {
    /// Creates a counter sample without labels.
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value,
            kind: MetricKind::Counter,
        }
    }

    /// Creates a gauge sample without labels.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value,
            kind: MetricKind::Gauge,
        }
    }

    /// Attaches a label to the sample.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
