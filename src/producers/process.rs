//! Process resource collector.
//!
//! Reports OS-level resource usage (CPU time, memory, file
//! descriptors) for an external process whose pid is re-resolved on
//! every collect pass, so a restarted PgBouncer is picked up without
//! restarting the exporter. Counters are read from `/proc`; on hosts
//! without it every pass fails and the scrape degrades per the
//! registry's partial-failure rules.

use crate::metrics::{CollectError, MetricDescriptor, MetricKind, MetricSample, Producer};
use nix::unistd::{sysconf, SysconfVar};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves the target process identifier. Invoked once per collect
/// pass; must not cache a stale pid.
pub type PidSource = Box<dyn Fn() -> Result<i32, CollectError> + Send + Sync>;

/// Fields extracted from `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    utime_ticks: u64,
    stime_ticks: u64,
    vsize_bytes: u64,
    rss_pages: u64,
}

/// Producer for per-process resource metrics.
pub struct ProcessCollector {
    prefix: String,
    pid_source: PidSource,
}

impl ProcessCollector {
    /// Creates a collector with an arbitrary pid source and metric-name
    /// prefix.
    pub fn new(prefix: impl Into<String>, pid_source: PidSource) -> Self {
        Self {
            prefix: prefix.into(),
            pid_source,
        }
    }

    /// Creates a collector that re-reads the given pid file on every
    /// collect pass.
    pub fn from_pid_file(prefix: impl Into<String>, path: PathBuf) -> Self {
        Self::new(prefix, Box::new(move || read_pid_file(&path)))
    }

    fn metric(&self, suffix: &str) -> String {
        format!("{}_process_{}", self.prefix, suffix)
    }
}

impl Producer for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        vec![
            MetricDescriptor::new(
                self.metric("cpu_seconds_total"),
                "Total user and system CPU time spent in seconds.",
                MetricKind::Counter,
            ),
            MetricDescriptor::new(
                self.metric("virtual_memory_bytes"),
                "Virtual memory size in bytes.",
                MetricKind::Gauge,
            ),
            MetricDescriptor::new(
                self.metric("resident_memory_bytes"),
                "Resident memory size in bytes.",
                MetricKind::Gauge,
            ),
            MetricDescriptor::new(
                self.metric("open_fds"),
                "Number of open file descriptors.",
                MetricKind::Gauge,
            ),
            MetricDescriptor::new(
                self.metric("max_fds"),
                "Maximum number of open file descriptors.",
                MetricKind::Gauge,
            ),
        ]
    }

    fn collect(&self) -> Result<Vec<MetricSample>, CollectError> {
        let pid = (self.pid_source)()?;

        let stat_raw = fs::read_to_string(format!("/proc/{pid}/stat"))?;
        let stat = parse_stat(&stat_raw)
            .ok_or_else(|| CollectError::Malformed(format!("/proc/{pid}/stat")))?;
        let open_fds = fs::read_dir(format!("/proc/{pid}/fd"))?.count();

        let mut samples = vec![
            MetricSample::counter(
                self.metric("cpu_seconds_total"),
                (stat.utime_ticks + stat.stime_ticks) as f64 / clock_ticks_per_second(),
            ),
            MetricSample::gauge(self.metric("virtual_memory_bytes"), stat.vsize_bytes as f64),
            MetricSample::gauge(
                self.metric("resident_memory_bytes"),
                (stat.rss_pages * page_size_bytes()) as f64,
            ),
            MetricSample::gauge(self.metric("open_fds"), open_fds as f64),
        ];

        // The limits file can vanish with the process mid-pass; the
        // max_fds family is then simply omitted from this scrape.
        if let Ok(limits) = fs::read_to_string(format!("/proc/{pid}/limits")) {
            if let Some(max_fds) = parse_max_fds(&limits) {
                samples.push(MetricSample::gauge(self.metric("max_fds"), max_fds as f64));
            }
        }

        Ok(samples)
    }
}

/// Reads and parses a pid file: decimal pid, surrounding whitespace
/// tolerated.
pub fn read_pid_file(path: &Path) -> Result<i32, CollectError> {
    let content = fs::read_to_string(path)
        .map_err(|e| CollectError::Pid(format!("{}: {e}", path.display())))?;
    let pid: i32 = content
        .trim()
        .parse()
        .map_err(|_| CollectError::Pid(format!("malformed pid file {}", path.display())))?;
    if pid <= 0 {
        return Err(CollectError::Pid(format!(
            "non-positive pid in {}",
            path.display()
        )));
    }
    Ok(pid)
}

/// Parses the stat line. The comm field may contain spaces and
/// parentheses, so fields are taken after the last `)`.
fn parse_stat(content: &str) -> Option<ProcStat> {
    let (_, rest) = content.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    Some(ProcStat {
        utime_ticks: fields.get(11)?.parse().ok()?,
        stime_ticks: fields.get(12)?.parse().ok()?,
        vsize_bytes: fields.get(20)?.parse().ok()?,
        rss_pages: fields.get(21)?.parse().ok()?,
    })
}

/// Extracts the soft "Max open files" limit. Returns `None` for an
/// unlimited or missing entry.
fn parse_max_fds(limits: &str) -> Option<u64> {
    let line = limits.lines().find(|l| l.starts_with("Max open files"))?;
    line.split_whitespace().nth(3)?.parse().ok()
}

fn clock_ticks_per_second() -> f64 {
    sysconf(SysconfVar::CLK_TCK)
        .ok()
        .flatten()
        .map(|v| v as f64)
        .filter(|v| *v > 0.0)
        .unwrap_or(100.0)
}

fn page_size_bytes() -> u64 {
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(4096)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_stat_handles_comm_with_spaces_and_parens() {
        let line = "42 (pg bouncer (main)) S 1 42 42 0 -1 4194304 100 0 0 0 \
                    150 75 0 0 20 0 1 0 1000 12345678 900 18446744073709551615";
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.utime_ticks, 150);
        assert_eq!(stat.stime_ticks, 75);
        assert_eq!(stat.vsize_bytes, 12345678);
        assert_eq!(stat.rss_pages, 900);
    }

    #[test]
    fn test_parse_stat_rejects_truncated_line() {
        assert!(parse_stat("42 (pgbouncer) S 1 42").is_none());
        assert!(parse_stat("").is_none());
    }

    #[test]
    fn test_parse_max_fds() {
        let limits = "Limit                     Soft Limit           Hard Limit           Units\n\
                      Max cpu time              unlimited            unlimited            seconds\n\
                      Max open files            1024                 4096                 files\n";
        assert_eq!(parse_max_fds(limits), Some(1024));
    }

    #[test]
    fn test_parse_max_fds_unlimited_is_omitted() {
        let limits = "Max open files            unlimited            unlimited            files\n";
        assert_eq!(parse_max_fds(limits), None);
    }

    #[test]
    fn test_read_pid_file_tolerates_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1234").unwrap();
        assert_eq!(read_pid_file(file.path()).unwrap(), 1234);
    }

    #[test]
    fn test_read_pid_file_missing() {
        let err = read_pid_file(Path::new("/nonexistent/pgbouncer.pid")).unwrap_err();
        assert!(matches!(err, CollectError::Pid(_)));
    }

    #[test]
    fn test_read_pid_file_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not-a-pid").unwrap();
        assert!(matches!(
            read_pid_file(file.path()),
            Err(CollectError::Pid(_))
        ));
    }

    #[test]
    fn test_read_pid_file_rejects_non_positive() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "-7").unwrap();
        assert!(matches!(
            read_pid_file(file.path()),
            Err(CollectError::Pid(_))
        ));
    }

    #[test]
    fn test_unresolvable_pid_fails_the_pass() {
        let collector = ProcessCollector::new(
            "pgbouncer",
            Box::new(|| Err(CollectError::Pid("pid file missing".into()))),
        );
        assert!(matches!(collector.collect(), Err(CollectError::Pid(_))));
    }

    #[test]
    fn test_vanished_process_fails_the_pass() {
        // Resolvable pid, but no such process.
        let collector = ProcessCollector::new("pgbouncer", Box::new(|| Ok(i32::MAX)));
        assert!(collector.collect().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_collect_own_process() {
        let pid = std::process::id() as i32;
        let collector = ProcessCollector::new("pgbouncer", Box::new(move || Ok(pid)));

        let samples = collector.collect().unwrap();
        let open_fds = samples
            .iter()
            .find(|s| s.name == "pgbouncer_process_open_fds")
            .unwrap();
        assert!(open_fds.value >= 1.0);

        let resident = samples
            .iter()
            .find(|s| s.name == "pgbouncer_process_resident_memory_bytes")
            .unwrap();
        assert!(resident.value > 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_from_pid_file_resolves_each_pass() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", std::process::id()).unwrap();

        let collector =
            ProcessCollector::from_pid_file("pgbouncer", file.path().to_path_buf());
        assert!(collector.collect().is_ok());

        // Removing the file makes the next pass fail: nothing is cached.
        let path = file.path().to_path_buf();
        drop(file);
        let collector = ProcessCollector::from_pid_file("pgbouncer", path);
        assert!(matches!(collector.collect(), Err(CollectError::Pid(_))));
    }
}
