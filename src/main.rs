//! PgBouncer Exporter
//!
//! Reads configuration, populates the metric registry, and serves the
//! gated exposition surface until a fatal error or external signal.

use clap::Parser;
use pgbouncer_exporter::{
    auth::{CredentialGate, Credentials},
    config::{Cli, Settings},
    metrics::MetricRegistry,
    producers::{BuildInfoProducer, ProcessCollector, StatsProducer},
    server::{ExposureServer, ServerConfig},
    NAMESPACE,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = match Settings::load(cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    info!("Starting pgbouncer-exporter v{}", pgbouncer_exporter::VERSION);

    let mut registry = MetricRegistry::new();
    let registrations: Vec<Box<dyn pgbouncer_exporter::Producer>> = {
        let mut producers: Vec<Box<dyn pgbouncer_exporter::Producer>> = vec![
            Box::new(StatsProducer::new(settings.connection_string.clone())),
            Box::new(BuildInfoProducer::new()),
        ];
        if let Some(pid_file) = settings.pid_file.clone() {
            info!(pid_file = %pid_file.display(), "Process metrics enabled");
            producers.push(Box::new(ProcessCollector::from_pid_file(
                NAMESPACE, pid_file,
            )));
        }
        producers
    };

    for producer in registrations {
        if let Err(e) = registry.register(producer) {
            error!(error = %e, "Producer registration failed");
            std::process::exit(1);
        }
    }

    let gate = CredentialGate::new(Credentials::from_env());
    let server = ExposureServer::new(
        ServerConfig::new(settings.listen_port, settings.metrics_path.clone()),
        registry,
        gate,
    );

    if let Err(e) = server.run().await {
        error!(error = %e, "Exporter terminated");
        std::process::exit(1);
    }
}
