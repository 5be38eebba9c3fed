//! Leveled line logging with an optional facility mirror.
//!
//! # Data Flow
//!
//! 1. A call site picks a severity and hands over a message
//! 2. The current config is snapshotted and the severity gate applied
//! 3. Accepted messages are formatted once and written to the line sink
//! 4. The same line is mirrored to the facility sink, rank-clamped
//!
//! # Design Decisions
//!
//! - Severity ranks run 1 (alert) through 7 (debug); a message is emitted
//!   when its rank is at or below the configured rank
//! - Config rides in an `ArcSwap` so hot-path reads never take a lock and
//!   reconfiguration swaps the whole snapshot at once
//! - The line and facility sinks are trait objects, which keeps tests on
//!   recording sinks and production on stdout plus the log socket

pub mod facility;

pub use facility::{Facility, FacilitySink, SyslogSink};

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::error::SiteError;

/// Log severities, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Severity {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// One-letter code used in formatted lines.
    pub fn code(self) -> char {
        match self {
            Severity::Alert => 'A',
            Severity::Critical => 'C',
            Severity::Error => 'E',
            Severity::Warning => 'W',
            Severity::Notice => 'N',
            Severity::Info => 'I',
            Severity::Debug => 'D',
        }
    }

    /// Parse a severity name, case-insensitively. `crit` and `warn` are
    /// accepted aliases.
    pub fn parse(name: &str) -> Option<Severity> {
        let name = name.to_ascii_lowercase();
        let severity = match name.as_str() {
            "alert" => Severity::Alert,
            "crit" | "critical" => Severity::Critical,
            "error" => Severity::Error,
            "warning" | "warn" => Severity::Warning,
            "notice" => Severity::Notice,
            "info" => Severity::Info,
            "debug" => Severity::Debug,
            _ => return None,
        };
        Some(severity)
    }

    pub fn name(self) -> &'static str {
        match self {
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current logging configuration, replaced whole on reconfiguration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub title: String,
    pub level: Severity,
    pub facility: Facility,
}

impl Default for LoggerConfig {
    fn default() -> LoggerConfig {
        LoggerConfig {
            title: env!("CARGO_PKG_NAME").to_owned(),
            level: Severity::Info,
            facility: Facility::DEFAULT,
        }
    }
}

/// Partial options for [`Logger::set`]; absent fields keep their current
/// values.
#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    pub title: Option<String>,
    pub level: Option<Severity>,
    /// Facility keyword, validated against the allow-list.
    pub facility: Option<String>,
}

/// Destination for formatted lines.
pub trait LineSink: Send + Sync {
    fn write_line(&self, line: &str);
}

impl<T: LineSink + ?Sized> LineSink for Arc<T> {
    fn write_line(&self, line: &str) {
        (**self).write_line(line)
    }
}

struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

struct Shared {
    config: ArcSwap<LoggerConfig>,
    line_sink: Box<dyn LineSink>,
    facility_sink: Option<Box<dyn FacilitySink>>,
}

/// Cloneable handle to the shared logging state.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
}

impl Logger {
    /// Logger writing to stdout, optionally mirrored to a facility sink.
    pub fn new(facility_sink: Option<Box<dyn FacilitySink>>) -> Logger {
        Logger::with_sink(Box::new(StdoutSink), facility_sink)
    }

    /// Logger with a custom line destination. Tests use this to record
    /// output instead of printing it.
    pub fn with_sink(
        line_sink: Box<dyn LineSink>,
        facility_sink: Option<Box<dyn FacilitySink>>,
    ) -> Logger {
        Logger {
            shared: Arc::new(Shared {
                config: ArcSwap::from_pointee(LoggerConfig::default()),
                line_sink,
                facility_sink,
            }),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<LoggerConfig> {
        self.shared.config.load_full()
    }

    /// Merge `options` over the current configuration and swap the result
    /// in whole. Unknown facility keywords fall back to
    /// [`Facility::DEFAULT`]. Safe to call repeatedly.
    pub fn set(&self, options: LoggerOptions) {
        let current = self.shared.config.load();
        let facility = match options.facility.as_deref() {
            Some(keyword) => Facility::from_keyword(keyword).unwrap_or(Facility::DEFAULT),
            None => current.facility,
        };
        let next = LoggerConfig {
            title: options.title.unwrap_or_else(|| current.title.clone()),
            level: options.level.unwrap_or(current.level),
            facility,
        };
        if let Some(sink) = &self.shared.facility_sink {
            sink.configure(next.facility);
        }
        self.shared.config.store(Arc::new(next));
    }

    /// Emit `message` at `severity` if the configured level admits it.
    pub fn log(&self, severity: Severity, message: &str) {
        let config = self.shared.config.load();
        if severity.rank() > config.level.rank() {
            return;
        }
        let line = format_line(&config.title, severity, Utc::now(), std::process::id(), message);
        self.shared.line_sink.write_line(&line);
        if let Some(sink) = &self.shared.facility_sink {
            sink.emit(severity.rank().min(sink.max_rank()), &line);
        }
    }

    pub fn alert(&self, message: impl AsRef<str>) {
        self.log(Severity::Alert, message.as_ref());
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.log(Severity::Critical, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Severity::Error, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(Severity::Warning, message.as_ref());
    }

    pub fn notice(&self, message: impl AsRef<str>) {
        self.log(Severity::Notice, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Severity::Info, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Severity::Debug, message.as_ref());
    }

    /// Log a failure with its full causal chain at error severity.
    pub fn log_error(&self, err: &SiteError) {
        self.log(Severity::Error, &err.full_stack());
    }
}

/// Render one log line: UTC millisecond timestamp, title, zero-padded pid,
/// one-letter severity code, then the message.
fn format_line(
    title: &str,
    severity: Severity,
    at: DateTime<Utc>,
    pid: u32,
    message: &str,
) -> String {
    format!(
        "{} {}[{:05}] {} | {}",
        at.format("%Y-%m-%d %H:%M:%S%.3f"),
        title,
        pid,
        severity.code(),
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use chrono::NaiveDate;

    use crate::error::ErrorKind;

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl LineSink for RecordingSink {
        fn write_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_owned());
        }
    }

    #[derive(Default)]
    struct RecordingFacility {
        max: u8,
        emitted: Mutex<Vec<(u8, String)>>,
        configured: Mutex<Vec<Facility>>,
    }

    impl FacilitySink for RecordingFacility {
        fn max_rank(&self) -> u8 {
            self.max
        }

        fn emit(&self, rank: u8, line: &str) {
            self.emitted.lock().unwrap().push((rank, line.to_owned()));
        }

        fn configure(&self, facility: Facility) {
            self.configured.lock().unwrap().push(facility);
        }
    }

    fn recording_logger() -> (Logger, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let logger = Logger::with_sink(Box::new(Arc::clone(&sink)), None);
        (logger, sink)
    }

    #[test]
    fn test_severity_ranks_and_codes() {
        let order = [
            (Severity::Alert, 1, 'A'),
            (Severity::Critical, 2, 'C'),
            (Severity::Error, 3, 'E'),
            (Severity::Warning, 4, 'W'),
            (Severity::Notice, 5, 'N'),
            (Severity::Info, 6, 'I'),
            (Severity::Debug, 7, 'D'),
        ];
        for (severity, rank, code) in order {
            assert_eq!(severity.rank(), rank);
            assert_eq!(severity.code(), code);
            assert_eq!(Severity::parse(severity.name()), Some(severity));
        }
        assert_eq!(Severity::parse("warn"), Some(Severity::Warning));
        assert_eq!(Severity::parse("crit"), Some(Severity::Critical));
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("verbose"), None);
    }

    #[test]
    fn test_configured_level_gates_emission() {
        let (logger, sink) = recording_logger();
        logger.set(LoggerOptions {
            level: Some(Severity::Warning),
            ..LoggerOptions::default()
        });

        logger.info("suppressed");
        logger.debug("suppressed");
        logger.error("kept");
        logger.critical("kept");
        logger.warning("kept");

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.contains("kept")));

        logger.set(LoggerOptions {
            level: Some(Severity::Debug),
            ..LoggerOptions::default()
        });
        logger.debug("now visible");
        assert_eq!(sink.lines().len(), 4);
    }

    #[test]
    fn test_format_line_is_exact() {
        let at = NaiveDate::from_ymd_opt(2015, 6, 5)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 123)
            .unwrap()
            .and_utc();
        let line = format_line("inspector", Severity::Info, at, 42, "hello");
        assert_eq!(line, "2015-06-05 08:30:00.123 inspector[00042] I | hello");
    }

    #[test]
    fn test_live_lines_carry_title_pid_and_code() {
        let (logger, sink) = recording_logger();
        logger.set(LoggerOptions {
            title: Some("unit".to_owned()),
            level: Some(Severity::Debug),
            ..LoggerOptions::default()
        });
        logger.debug("payload");

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.contains(" unit["), "{line}");
        assert!(line.contains("] D | payload"), "{line}");
        assert!(line.contains(&format!("[{:05}]", std::process::id())), "{line}");
    }

    #[test]
    fn test_facility_mirror_clamps_rank() {
        let facility = Arc::new(RecordingFacility {
            max: 5,
            ..RecordingFacility::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let logger = Logger::with_sink(
            Box::new(Arc::clone(&sink)),
            Some(Box::new(Arc::clone(&facility))),
        );
        logger.set(LoggerOptions {
            level: Some(Severity::Debug),
            ..LoggerOptions::default()
        });

        logger.debug("clamped");
        logger.error("passed through");
        logger.set(LoggerOptions {
            level: Some(Severity::Error),
            ..LoggerOptions::default()
        });
        logger.info("suppressed entirely");

        let emitted = facility.emitted.lock().unwrap().clone();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].0, 5);
        assert_eq!(emitted[1].0, Severity::Error.rank());
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn test_set_merges_partial_options() {
        let (logger, _sink) = recording_logger();
        logger.set(LoggerOptions {
            title: Some("merged".to_owned()),
            level: Some(Severity::Notice),
            facility: Some("local5".to_owned()),
        });
        logger.set(LoggerOptions {
            level: Some(Severity::Error),
            ..LoggerOptions::default()
        });

        let config = logger.config();
        assert_eq!(config.title, "merged");
        assert_eq!(config.level, Severity::Error);
        assert_eq!(config.facility, Facility::Local5);
    }

    #[test]
    fn test_set_rejects_unknown_facility() {
        let facility = Arc::new(RecordingFacility {
            max: 7,
            ..RecordingFacility::default()
        });
        let logger = Logger::with_sink(
            Box::new(Arc::new(RecordingSink::default())),
            Some(Box::new(Arc::clone(&facility))),
        );
        logger.set(LoggerOptions {
            facility: Some("local6".to_owned()),
            ..LoggerOptions::default()
        });
        logger.set(LoggerOptions {
            facility: Some("attic".to_owned()),
            ..LoggerOptions::default()
        });

        assert_eq!(logger.config().facility, Facility::DEFAULT);
        let configured = facility.configured.lock().unwrap().clone();
        assert_eq!(configured, vec![Facility::Local6, Facility::DEFAULT]);
    }

    #[test]
    fn test_log_error_walks_the_chain() {
        let (logger, sink) = recording_logger();
        let inner = SiteError::new(ErrorKind::NotFound, "missing row");
        let outer = SiteError::new(ErrorKind::Internal, "query failed").with_source(inner);

        logger.log_error(&outer);

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("SiteError[Internal]: query failed"));
        assert!(lines[0].contains("SiteError[NotFound]: missing row"));
    }
}
