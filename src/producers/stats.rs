//! PgBouncer statistics producer.
//!
//! Connects to the PgBouncer admin console and maps the rows of
//! `SHOW STATS`, `SHOW POOLS`, `SHOW DATABASES`, and `SHOW LISTS` onto
//! metric samples through per-command column tables. Unknown columns
//! are ignored so newer PgBouncer releases do not break the scrape;
//! time-valued columns are reported in seconds (the console reports
//! microseconds).
//!
//! The admin console does not speak the extended query protocol, so
//! every command goes through the simple-query path. A fresh
//! connection is opened per collect pass; there is no state between
//! scrapes, and a restarted PgBouncer needs no exporter restart.

use crate::metrics::{CollectError, MetricDescriptor, MetricKind, MetricSample, Producer};
use postgres::{Client, NoTls, SimpleQueryMessage};

/// Microseconds to seconds.
const MICROS: f64 = 1e-6;

const LISTS_METRIC: &str = "pgbouncer_lists_items";

/// One admin-console column mapped onto a metric family.
struct ColumnSpec {
    column: &'static str,
    metric: &'static str,
    help: &'static str,
    kind: MetricKind,
    scale: f64,
}

const STATS_LABELS: &[&str] = &["database"];
const STATS_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        column: "total_requests",
        metric: "pgbouncer_stats_queries_total",
        help: "Total number of SQL requests pooled by pgbouncer.",
        kind: MetricKind::Counter,
        scale: 1.0,
    },
    ColumnSpec {
        column: "total_query_count",
        metric: "pgbouncer_stats_queries_pooled_total",
        help: "Total number of SQL queries pooled by pgbouncer.",
        kind: MetricKind::Counter,
        scale: 1.0,
    },
    ColumnSpec {
        column: "total_xact_count",
        metric: "pgbouncer_stats_sql_transactions_pooled_total",
        help: "Total number of SQL transactions pooled by pgbouncer.",
        kind: MetricKind::Counter,
        scale: 1.0,
    },
    ColumnSpec {
        column: "total_received",
        metric: "pgbouncer_stats_received_bytes_total",
        help: "Total volume in bytes of network traffic received by pgbouncer.",
        kind: MetricKind::Counter,
        scale: 1.0,
    },
    ColumnSpec {
        column: "total_sent",
        metric: "pgbouncer_stats_sent_bytes_total",
        help: "Total volume in bytes of network traffic sent by pgbouncer.",
        kind: MetricKind::Counter,
        scale: 1.0,
    },
    ColumnSpec {
        column: "total_query_time",
        metric: "pgbouncer_stats_queries_duration_seconds_total",
        help: "Total number of seconds spent actively connected to PostgreSQL, executing queries.",
        kind: MetricKind::Counter,
        scale: MICROS,
    },
    ColumnSpec {
        column: "total_xact_time",
        metric: "pgbouncer_stats_server_in_transaction_seconds_total",
        help: "Total number of seconds spent connected to PostgreSQL in a transaction.",
        kind: MetricKind::Counter,
        scale: MICROS,
    },
    ColumnSpec {
        column: "total_wait_time",
        metric: "pgbouncer_stats_client_wait_seconds_total",
        help: "Time spent by clients waiting for a server, in seconds.",
        kind: MetricKind::Counter,
        scale: MICROS,
    },
];

const POOLS_LABELS: &[&str] = &["database", "user"];
const POOLS_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        column: "cl_active",
        metric: "pgbouncer_pools_client_active_connections",
        help: "Client connections linked to a server connection and able to process queries.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "cl_waiting",
        metric: "pgbouncer_pools_client_waiting_connections",
        help: "Client connections waiting on a server connection.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "sv_active",
        metric: "pgbouncer_pools_server_active_connections",
        help: "Server connections linked to a client connection.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "sv_idle",
        metric: "pgbouncer_pools_server_idle_connections",
        help: "Server connections idle and ready for a client query.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "sv_used",
        metric: "pgbouncer_pools_server_used_connections",
        help: "Server connections idle for longer than server_check_delay.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "sv_tested",
        metric: "pgbouncer_pools_server_testing_connections",
        help: "Server connections currently running either server_reset_query or server_check_query.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "sv_login",
        metric: "pgbouncer_pools_server_login_connections",
        help: "Server connections currently in the process of logging in.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "maxwait",
        metric: "pgbouncer_pools_client_maxwait_seconds",
        help: "Age of the oldest unserved client connection, in seconds.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
];

const DATABASES_LABELS: &[&str] = &["name", "pool_mode"];
const DATABASES_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        column: "pool_size",
        metric: "pgbouncer_databases_pool_size",
        help: "Maximum number of server connections for this database.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "reserve_pool",
        metric: "pgbouncer_databases_reserve_pool_size",
        help: "Maximum number of additional server connections for this database.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
    ColumnSpec {
        column: "current_connections",
        metric: "pgbouncer_databases_current_connections",
        help: "Current number of server connections for this database.",
        kind: MetricKind::Gauge,
        scale: 1.0,
    },
];

/// One admin-console result row: column name and value per cell.
type Row = Vec<(String, Option<String>)>;

/// Producer for PgBouncer's own statistics.
pub struct StatsProducer {
    connection_string: String,
}

impl StatsProducer {
    /// Creates a producer that connects with the given connection
    /// string on every collect pass.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

impl Producer for StatsProducer {
    fn name(&self) -> &str {
        "stats"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        let mut descriptors = Vec::new();
        for (specs, labels) in [
            (STATS_COLUMNS, STATS_LABELS),
            (POOLS_COLUMNS, POOLS_LABELS),
            (DATABASES_COLUMNS, DATABASES_LABELS),
        ] {
            for spec in specs {
                descriptors.push(MetricDescriptor::with_labels(
                    spec.metric,
                    spec.help,
                    spec.kind,
                    labels,
                ));
            }
        }
        descriptors.push(MetricDescriptor::with_labels(
            LISTS_METRIC,
            "Count of items registered with pgbouncer, by list.",
            MetricKind::Gauge,
            &["list"],
        ));
        descriptors
    }

    fn collect(&self) -> Result<Vec<MetricSample>, CollectError> {
        let mut client = Client::connect(&self.connection_string, NoTls)
            .map_err(|e| CollectError::Upstream(e.to_string()))?;

        let mut samples = Vec::new();
        samples.extend(map_rows(
            &fetch_rows(&mut client, "SHOW STATS")?,
            STATS_COLUMNS,
            STATS_LABELS,
        ));
        samples.extend(map_rows(
            &fetch_rows(&mut client, "SHOW POOLS")?,
            POOLS_COLUMNS,
            POOLS_LABELS,
        ));
        samples.extend(map_rows(
            &fetch_rows(&mut client, "SHOW DATABASES")?,
            DATABASES_COLUMNS,
            DATABASES_LABELS,
        ));
        samples.extend(map_list_rows(&fetch_rows(&mut client, "SHOW LISTS")?));
        Ok(samples)
    }
}

fn fetch_rows(client: &mut Client, command: &str) -> Result<Vec<Row>, CollectError> {
    let messages = client
        .simple_query(command)
        .map_err(|e| CollectError::Upstream(format!("{command}: {e}")))?;

    let mut rows = Vec::new();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let mut cells = Vec::with_capacity(row.len());
            for (index, column) in row.columns().iter().enumerate() {
                cells.push((column.name().to_string(), row.get(index).map(str::to_string)));
            }
            rows.push(cells);
        }
    }
    Ok(rows)
}

fn cell(row: &Row, column: &str) -> Option<String> {
    row.iter()
        .find(|(name, _)| name == column)
        .and_then(|(_, value)| value.clone())
}

/// Maps rows onto samples through a column table. Label values come
/// from the named label columns; a missing label column yields an empty
/// label value rather than dropping the row. Cells that are null,
/// non-numeric, or not in the table are skipped.
fn map_rows(rows: &[Row], specs: &[ColumnSpec], label_columns: &[&str]) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    for row in rows {
        let labels: Vec<(&str, String)> = label_columns
            .iter()
            .map(|column| (*column, cell(row, column).unwrap_or_default()))
            .collect();

        for (column, value) in row {
            let Some(spec) = specs.iter().find(|spec| spec.column == column) else {
                continue;
            };
            let Some(number) = value.as_deref().and_then(|v| v.parse::<f64>().ok()) else {
                continue;
            };

            let mut sample = match spec.kind {
                MetricKind::Counter => MetricSample::counter(spec.metric, number * spec.scale),
                _ => MetricSample::gauge(spec.metric, number * spec.scale),
            };
            for (key, value) in &labels {
                sample = sample.with_label(*key, value.clone());
            }
            samples.push(sample);
        }
    }
    samples
}

/// `SHOW LISTS` is shaped as (list, items) pairs rather than one column
/// per metric, so it gets its own mapping.
fn map_list_rows(rows: &[Row]) -> Vec<MetricSample> {
    rows.iter()
        .filter_map(|row| {
            let list = cell(row, "list")?;
            let items = cell(row, "items")?.parse::<f64>().ok()?;
            Some(MetricSample::gauge(LISTS_METRIC, items).with_label("list", list))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> Row {
        cells
            .iter()
            .map(|(name, value)| ((*name).to_string(), Some((*value).to_string())))
            .collect()
    }

    #[test]
    fn test_stats_row_mapping_scales_time_columns() {
        let rows = vec![row(&[
            ("database", "pgbouncer"),
            ("total_query_count", "5000"),
            ("total_query_time", "2500000"),
        ])];

        let samples = map_rows(&rows, STATS_COLUMNS, STATS_LABELS);
        assert_eq!(samples.len(), 2);

        let queries = samples
            .iter()
            .find(|s| s.name == "pgbouncer_stats_queries_pooled_total")
            .unwrap();
        assert_eq!(queries.value, 5000.0);
        assert_eq!(queries.labels["database"], "pgbouncer");

        let duration = samples
            .iter()
            .find(|s| s.name == "pgbouncer_stats_queries_duration_seconds_total")
            .unwrap();
        assert_eq!(duration.value, 2.5);
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let rows = vec![row(&[
            ("database", "pgbouncer"),
            ("total_query_count", "1"),
            ("some_future_column", "99"),
        ])];
        let samples = map_rows(&rows, STATS_COLUMNS, STATS_LABELS);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_non_numeric_cells_are_skipped() {
        let rows = vec![row(&[("database", "pgbouncer"), ("total_query_count", "n/a")])];
        assert!(map_rows(&rows, STATS_COLUMNS, STATS_LABELS).is_empty());
    }

    #[test]
    fn test_null_cells_are_skipped() {
        let rows = vec![vec![
            ("database".to_string(), Some("pgbouncer".to_string())),
            ("total_query_count".to_string(), None),
        ]];
        assert!(map_rows(&rows, STATS_COLUMNS, STATS_LABELS).is_empty());
    }

    #[test]
    fn test_pools_row_carries_database_and_user_labels() {
        let rows = vec![row(&[
            ("database", "appdb"),
            ("user", "app"),
            ("cl_active", "3"),
            ("cl_waiting", "1"),
        ])];

        let samples = map_rows(&rows, POOLS_COLUMNS, POOLS_LABELS);
        assert_eq!(samples.len(), 2);
        for sample in &samples {
            assert_eq!(sample.labels["database"], "appdb");
            assert_eq!(sample.labels["user"], "app");
        }
    }

    #[test]
    fn test_missing_label_column_yields_empty_label() {
        // Older PgBouncer releases omit pool_mode from SHOW DATABASES.
        let rows = vec![row(&[("name", "appdb"), ("pool_size", "20")])];
        let samples = map_rows(&rows, DATABASES_COLUMNS, DATABASES_LABELS);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels["pool_mode"], "");
    }

    #[test]
    fn test_list_rows_mapping() {
        let rows = vec![
            row(&[("list", "databases"), ("items", "2")]),
            row(&[("list", "pools"), ("items", "3")]),
        ];

        let samples = map_list_rows(&rows);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, LISTS_METRIC);
        assert_eq!(samples[0].labels["list"], "databases");
        assert_eq!(samples[0].value, 2.0);
    }

    #[test]
    fn test_every_mapped_sample_matches_a_descriptor() {
        let producer = StatsProducer::new("postgres://localhost:6543/pgbouncer");
        let descriptors = producer.describe();

        let find = |metric: &str| descriptors.iter().find(|d| d.name == metric);
        for spec in STATS_COLUMNS.iter().chain(POOLS_COLUMNS).chain(DATABASES_COLUMNS) {
            let descriptor = find(spec.metric).expect("every column spec is declared");
            assert_eq!(descriptor.kind, spec.kind);
        }
        assert!(find(LISTS_METRIC).is_some());
    }

    #[test]
    fn test_collect_against_unreachable_upstream_is_an_upstream_error() {
        let producer = StatsProducer::new("postgres://localhost:1/pgbouncer?connect_timeout=1");
        assert!(matches!(
            producer.collect(),
            Err(CollectError::Upstream(_))
        ));
    }
}
