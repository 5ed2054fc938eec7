//! Producer aggregation and scrape rendering.
//!
//! The registry accumulates producers during startup and is immutable
//! afterwards; concurrent scrapes share it behind an `Arc` with no
//! locking. Rendering walks producers in registration order so the
//! exposition output is deterministic.

use super::exposition::{self, SampleFamily};
use super::{CollectError, ExpositionError, MetricDescriptor, MetricKind, MetricSample, Producer};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Name of the meta family reporting per-scrape collection outcomes.
const SCRAPE_PRODUCERS_METRIC: &str = "pgbouncer_exporter_scrape_producers";

/// Errors raised during producer registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A producer or metric family name collides with one already
    /// registered. Raised only at startup; fatal.
    #[error("duplicate producer or metric name: {name}")]
    DuplicateProducer {
        /// The colliding producer or family name.
        name: String,
    },
}

/// Aggregation point for metric producers.
///
/// Holds producers in registration order and renders their combined
/// output on demand. A single producer's failure degrades the scrape
/// instead of aborting it.
#[derive(Default)]
pub struct MetricRegistry {
    producers: Vec<Box<dyn Producer>>,
    producer_names: HashSet<String>,
    metric_names: HashSet<String>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer.
    ///
    /// Fails if the producer's name, or any metric family name it
    /// declares, collides with one already registered. On failure the
    /// registry is left unchanged (no partial insert).
    pub fn register(&mut self, producer: Box<dyn Producer>) -> Result<(), RegistryError> {
        let producer_name = producer.name().to_string();
        if self.producer_names.contains(&producer_name) {
            return Err(RegistryError::DuplicateProducer {
                name: producer_name,
            });
        }

        let descriptors = producer.describe();
        let mut batch = HashSet::new();
        for descriptor in &descriptors {
            if self.metric_names.contains(&descriptor.name) || !batch.insert(&descriptor.name) {
                return Err(RegistryError::DuplicateProducer {
                    name: descriptor.name.clone(),
                });
            }
        }

        self.producer_names.insert(producer_name);
        for descriptor in descriptors {
            self.metric_names.insert(descriptor.name);
        }
        self.producers.push(producer);
        Ok(())
    }

    /// Number of registered producers.
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Renders one scrape: every producer's collect pass, in
    /// registration order, serialized as text exposition.
    ///
    /// A producer whose collect pass fails (or yields samples that do
    /// not match its declared descriptors) is logged and counted as
    /// failed; the remaining producers still contribute. The output
    /// ends with the `pgbouncer_exporter_scrape_producers` meta family
    /// carrying the success/failure counts for this pass.
    pub fn render(&self) -> Result<String, ExpositionError> {
        let mut families = Vec::new();
        let mut succeeded = 0u64;
        let mut failed = 0u64;

        for producer in &self.producers {
            match collect_families(producer.as_ref()) {
                Ok(mut produced) => {
                    succeeded += 1;
                    families.append(&mut produced);
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(
                        producer = producer.name(),
                        error = %err,
                        "Producer collection failed"
                    );
                }
            }
        }

        families.push(scrape_outcome_family(succeeded, failed));
        exposition::encode(&families)
    }
}

/// Runs one producer's describe + collect pass and validates every
/// sample against its declared descriptors.
fn collect_families(producer: &dyn Producer) -> Result<Vec<SampleFamily>, CollectError> {
    let descriptors = producer.describe();
    let samples = producer.collect()?;
    group_samples(descriptors, samples)
}

fn group_samples(
    descriptors: Vec<MetricDescriptor>,
    samples: Vec<MetricSample>,
) -> Result<Vec<SampleFamily>, CollectError> {
    let index: HashMap<String, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.clone(), i))
        .collect();

    let mut families: Vec<SampleFamily> = descriptors
        .into_iter()
        .map(|descriptor| SampleFamily {
            descriptor,
            samples: Vec::new(),
        })
        .collect();

    for sample in samples {
        let slot = index
            .get(&sample.name)
            .ok_or_else(|| CollectError::SchemaMismatch(format!("undeclared family {}", sample.name)))?;
        let family = &mut families[*slot];

        if family.descriptor.kind != sample.kind {
            return Err(CollectError::SchemaMismatch(format!(
                "type mismatch for {}",
                sample.name
            )));
        }

        let mut declared: Vec<&str> = family.descriptor.labels.iter().map(String::as_str).collect();
        declared.sort_unstable();
        let yielded: Vec<&str> = sample.labels.keys().map(String::as_str).collect();
        if declared != yielded {
            return Err(CollectError::SchemaMismatch(format!(
                "label schema mismatch for {}",
                sample.name
            )));
        }

        family.samples.push(sample);
    }

    // Families that yielded nothing this pass are omitted rather than
    // rendered as dangling HELP/TYPE lines.
    families.retain(|family| !family.samples.is_empty());
    Ok(families)
}

fn scrape_outcome_family(succeeded: u64, failed: u64) -> SampleFamily {
    SampleFamily {
        descriptor: MetricDescriptor::with_labels(
            SCRAPE_PRODUCERS_METRIC,
            "Number of producers by collection outcome for the current scrape.",
            MetricKind::Gauge,
            &["state"],
        ),
        samples: vec![
            MetricSample::gauge(SCRAPE_PRODUCERS_METRIC, succeeded as f64)
                .with_label("state", "ok"),
            MetricSample::gauge(SCRAPE_PRODUCERS_METRIC, failed as f64)
                .with_label("state", "failed"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProducer {
        name: &'static str,
        descriptors: Vec<MetricDescriptor>,
        outcome: fn() -> Result<Vec<MetricSample>, CollectError>,
    }

    impl Producer for FixedProducer {
        fn name(&self) -> &str {
            self.name
        }

        fn describe(&self) -> Vec<MetricDescriptor> {
            self.descriptors.clone()
        }

        fn collect(&self) -> Result<Vec<MetricSample>, CollectError> {
            (self.outcome)()
        }
    }

    fn gauge_producer(name: &'static str, metric: &'static str) -> Box<FixedProducer> {
        Box::new(FixedProducer {
            name,
            descriptors: vec![MetricDescriptor::new(metric, "Test gauge.", MetricKind::Gauge)],
            outcome: || Ok(Vec::new()),
        })
    }

    #[test]
    fn test_register_rejects_duplicate_producer_name() {
        let mut registry = MetricRegistry::new();
        registry.register(gauge_producer("dup", "metric_a")).unwrap();

        let err = registry
            .register(gauge_producer("dup", "metric_b"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateProducer { ref name } if name == "dup"));
        assert_eq!(registry.producer_count(), 1);
    }

    #[test]
    fn test_register_rejects_duplicate_metric_name() {
        let mut registry = MetricRegistry::new();
        registry.register(gauge_producer("first", "metric_a")).unwrap();

        let err = registry
            .register(gauge_producer("second", "metric_a"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateProducer { ref name } if name == "metric_a"));
        assert_eq!(registry.producer_count(), 1);
    }

    #[test]
    fn test_register_failure_leaves_no_partial_insert() {
        let mut registry = MetricRegistry::new();
        registry.register(gauge_producer("first", "metric_a")).unwrap();

        // One colliding descriptor among two: neither may be inserted.
        let colliding = Box::new(FixedProducer {
            name: "second",
            descriptors: vec![
                MetricDescriptor::new("metric_b", "Fresh.", MetricKind::Gauge),
                MetricDescriptor::new("metric_a", "Colliding.", MetricKind::Gauge),
            ],
            outcome: || Ok(Vec::new()),
        });
        assert!(registry.register(colliding).is_err());
        assert_eq!(registry.producer_count(), 1);

        // metric_b was not reserved by the failed registration.
        registry.register(gauge_producer("third", "metric_b")).unwrap();
    }

    #[test]
    fn test_render_survives_failing_producer() {
        let mut registry = MetricRegistry::new();
        registry
            .register(Box::new(FixedProducer {
                name: "healthy",
                descriptors: vec![MetricDescriptor::new(
                    "healthy_metric",
                    "Always present.",
                    MetricKind::Gauge,
                )],
                outcome: || Ok(vec![MetricSample::gauge("healthy_metric", 7.0)]),
            }))
            .unwrap();
        registry
            .register(Box::new(FixedProducer {
                name: "broken",
                descriptors: vec![MetricDescriptor::new(
                    "broken_metric",
                    "Never present.",
                    MetricKind::Gauge,
                )],
                outcome: || Err(CollectError::Upstream("connection refused".into())),
            }))
            .unwrap();

        let text = registry.render().unwrap();
        assert!(text.contains("healthy_metric 7"));
        assert!(!text.contains("broken_metric"));
        assert!(text.contains("pgbouncer_exporter_scrape_producers{state=\"ok\"} 1"));
        assert!(text.contains("pgbouncer_exporter_scrape_producers{state=\"failed\"} 1"));
    }

    #[test]
    fn test_undeclared_sample_fails_that_producer_only() {
        let mut registry = MetricRegistry::new();
        registry
            .register(Box::new(FixedProducer {
                name: "schema_violator",
                descriptors: vec![MetricDescriptor::new(
                    "declared_metric",
                    "Declared.",
                    MetricKind::Gauge,
                )],
                outcome: || Ok(vec![MetricSample::gauge("undeclared_metric", 1.0)]),
            }))
            .unwrap();
        registry
            .register(Box::new(FixedProducer {
                name: "healthy",
                descriptors: vec![MetricDescriptor::new(
                    "healthy_metric",
                    "Always present.",
                    MetricKind::Gauge,
                )],
                outcome: || Ok(vec![MetricSample::gauge("healthy_metric", 1.0)]),
            }))
            .unwrap();

        let text = registry.render().unwrap();
        assert!(!text.contains("undeclared_metric"));
        assert!(text.contains("healthy_metric 1"));
        assert!(text.contains("pgbouncer_exporter_scrape_producers{state=\"failed\"} 1"));
    }

    #[test]
    fn test_label_schema_mismatch_is_a_collection_fault() {
        let descriptors = vec![MetricDescriptor::with_labels(
            "labelled_metric",
            "Needs a database label.",
            MetricKind::Gauge,
            &["database"],
        )];
        let samples = vec![MetricSample::gauge("labelled_metric", 1.0)];
        assert!(matches!(
            group_samples(descriptors, samples),
            Err(CollectError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_type_mismatch_is_a_collection_fault() {
        let descriptors = vec![MetricDescriptor::new(
            "typed_metric",
            "Declared as counter.",
            MetricKind::Counter,
        )];
        let samples = vec![MetricSample::gauge("typed_metric", 1.0)];
        assert!(matches!(
            group_samples(descriptors, samples),
            Err(CollectError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut registry = MetricRegistry::new();
        registry
            .register(Box::new(FixedProducer {
                name: "second_alphabetically",
                descriptors: vec![MetricDescriptor::new(
                    "zzz_metric",
                    "Registered first.",
                    MetricKind::Gauge,
                )],
                outcome: || Ok(vec![MetricSample::gauge("zzz_metric", 1.0)]),
            }))
            .unwrap();
        registry
            .register(Box::new(FixedProducer {
                name: "first_alphabetically",
                descriptors: vec![MetricDescriptor::new(
                    "aaa_metric",
                    "Registered second.",
                    MetricKind::Gauge,
                )],
                outcome: || Ok(vec![MetricSample::gauge("aaa_metric", 1.0)]),
            }))
            .unwrap();

        let first = registry.render().unwrap();
        let second = registry.render().unwrap();
        assert_eq!(first, second);
        // Output follows registration order, not name order.
        assert!(first.find("zzz_metric").unwrap() < first.find("aaa_metric").unwrap());
    }

    #[test]
    fn test_empty_registry_renders_meta_family_only() {
        let registry = MetricRegistry::new();
        let text = registry.render().unwrap();
        assert!(text.contains("pgbouncer_exporter_scrape_producers{state=\"ok\"} 0"));
        assert!(text.contains("pgbouncer_exporter_scrape_producers{state=\"failed\"} 0"));
    }
}
