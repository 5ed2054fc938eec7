//! Build metadata producer.

use crate::metrics::{CollectError, MetricDescriptor, MetricKind, MetricSample, Producer};

const BUILD_INFO_METRIC: &str = "pgbouncer_exporter_build_info";

/// Emits a constant `1` gauge labelled with the exporter version, the
/// conventional way to join version metadata against other series.
#[derive(Debug, Default)]
pub struct BuildInfoProducer;

impl BuildInfoProducer {
    /// Creates the producer.
    pub fn new() -> Self {
        Self
    }
}

impl Producer for BuildInfoProducer {
    fn name(&self) -> &str {
        "build_info"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        vec![MetricDescriptor::with_labels(
            BUILD_INFO_METRIC,
            "A metric with a constant '1' value labeled by the exporter version.",
            MetricKind::Gauge,
            &["version"],
        )]
    }

    fn collect(&self) -> Result<Vec<MetricSample>, CollectError> {
        Ok(vec![MetricSample::gauge(BUILD_INFO_METRIC, 1.0)
            .with_label("version", crate::VERSION)])
    }
}
