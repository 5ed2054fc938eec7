//! Text exposition encoding.
//!
//! Collected samples are converted into `prometheus::proto` metric
//! families and serialized with the crate's [`TextEncoder`], so escaping
//! and `# HELP`/`# TYPE` framing follow the reference encoder. Family
//! order is preserved as given, keeping the output deterministic by
//! producer registration order.

use super::{MetricDescriptor, MetricKind, MetricSample};
use prometheus::proto;
use prometheus::{Encoder, TextEncoder};
use thiserror::Error;

/// Content type of the text exposition format.
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Errors that can occur while encoding the exposition text.
#[derive(Debug, Error)]
pub enum ExpositionError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A descriptor together with the samples collected for it this scrape.
#[derive(Debug, Clone)]
pub(super) struct SampleFamily {
    pub descriptor: MetricDescriptor,
    pub samples: Vec<MetricSample>,
}

/// Encodes the families into the text exposition format.
pub(super) fn encode(families: &[SampleFamily]) -> Result<String, ExpositionError> {
    let proto_families: Vec<proto::MetricFamily> =
        families.iter().map(to_proto_family).collect();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&proto_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn to_proto_family(family: &SampleFamily) -> proto::MetricFamily {
    let mut proto_family = proto::MetricFamily::new();
    proto_family.set_name(family.descriptor.name.clone());
    proto_family.set_help(family.descriptor.help.clone());
    proto_family.set_field_type(proto_kind(family.descriptor.kind));

    for sample in &family.samples {
        let mut metric = proto::Metric::new();

        for (key, value) in &sample.labels {
            let mut pair = proto::LabelPair::new();
            pair.set_name(key.clone());
            pair.set_value(value.clone());
            metric.mut_label().push(pair);
        }

        match sample.kind {
            MetricKind::Counter => {
                let mut counter = proto::Counter::new();
                counter.set_value(sample.value);
                metric.set_counter(counter);
            }
            MetricKind::Gauge => {
                let mut gauge = proto::Gauge::new();
                gauge.set_value(sample.value);
                metric.set_gauge(gauge);
            }
            MetricKind::Untyped => {
                let mut untyped = proto::Untyped::new();
                untyped.set_value(sample.value);
                metric.set_untyped(untyped);
            }
        }

        proto_family.mut_metric().push(metric);
    }

    proto_family
}

fn proto_kind(kind: MetricKind) -> proto::MetricType {
    match kind {
        MetricKind::Counter => proto::MetricType::COUNTER,
        MetricKind::Gauge => proto::MetricType::GAUGE,
        MetricKind::Untyped => proto::MetricType::UNTYPED,
    }
}
