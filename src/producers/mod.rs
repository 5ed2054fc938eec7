//! Concrete metric producers.
//!
//! Each producer implements the `describe + collect` capability from
//! [`crate::metrics`] and is registered once at startup:
//!
//! - [`StatsProducer`] — PgBouncer statistics via admin-console `SHOW`
//!   queries.
//! - [`BuildInfoProducer`] — constant build metadata gauge.
//! - [`ProcessCollector`] — OS resource usage for the PgBouncer
//!   process, present only when a pid file is configured.

mod build_info;
mod process;
mod stats;

pub use build_info::BuildInfoProducer;
pub use process::{read_pid_file, PidSource, ProcessCollector};
pub use stats::StatsProducer;
