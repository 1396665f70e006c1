//! Console output plus two daily-rotated log files next to the price files.

use std::{fmt, num::NonZeroUsize, path::Path};

use chrono::Utc;
use chrono_tz::Tz;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    Layer,
    filter::{LevelFilter, Targets},
    fmt::{format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::prelude::*;

const FETCH_TARGETS: &[&str] = &[
    "nordpeak::api::nordpool",
    "nordpeak::core::scheduler",
    "nordpeak::store",
    "nordpeak::cli::hunt",
];

const DISCHARGE_TARGETS: &[&str] = &[
    "nordpeak::api::modbus",
    "nordpeak::core::peak",
    "nordpeak::core::discharge",
    "nordpeak::cli::discharge",
];

/// Timestamps in the configured local time zone.
pub struct LocalTime(pub Tz);

impl FormatTime for LocalTime {
    fn format_time(&self, writer: &mut Writer<'_>) -> fmt::Result {
        write!(writer, "{}", Utc::now().with_timezone(&self.0).format("%Y-%m-%d %H:%M:%S %Z"))
    }
}

/// Flushes the log files when dropped, so it must outlive the application.
#[must_use]
pub struct Guard {
    _fetch_log: WorkerGuard,
    _discharge_log: WorkerGuard,
}

pub fn init(folder: &Path, max_log_files: NonZeroUsize, timezone: Tz) -> Result<Guard> {
    let (fetch_writer, fetch_guard) =
        tracing_appender::non_blocking(new_appender(folder, "fetch_log", max_log_files)?);
    let (discharge_writer, discharge_guard) =
        tracing_appender::non_blocking(new_appender(folder, "discharge_log", max_log_files)?);

    let console = tracing_subscriber::fmt::layer()
        .without_time()
        .compact()
        .with_filter(LevelFilter::INFO);
    let fetch_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(LocalTime(timezone))
        .with_writer(fetch_writer)
        .with_filter(targets(FETCH_TARGETS));
    let discharge_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(LocalTime(timezone))
        .with_writer(discharge_writer)
        .with_filter(targets(DISCHARGE_TARGETS));

    tracing_subscriber::registry()
        .with(console)
        .with(fetch_log)
        .with(discharge_log)
        .try_init()
        .context("failed to initialize the logging")?;
    Ok(Guard { _fetch_log: fetch_guard, _discharge_log: discharge_guard })
}

/// `<folder>/<prefix>.<YYYY-MM-DD>.txt`, one per day, the oldest deleted beyond the limit.
fn new_appender(
    folder: &Path,
    prefix: &str,
    max_log_files: NonZeroUsize,
) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("txt")
        .max_log_files(max_log_files.get())
        .build(folder)
        .with_context(|| format!("failed to create `{prefix}` in `{}`", folder.display()))
}

fn targets(targets: &[&str]) -> Targets {
    Targets::new().with_targets(targets.iter().map(|target| (*target, LevelFilter::INFO)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_ok() {
        let fetch = targets(FETCH_TARGETS);
        assert!(fetch.would_enable("nordpeak::core::scheduler", &Level::INFO));
        assert!(fetch.would_enable("nordpeak::store", &Level::WARN));
        assert!(!fetch.would_enable("nordpeak::core::scheduler", &Level::DEBUG));
        assert!(!fetch.would_enable("nordpeak::core::discharge", &Level::INFO));
        assert!(!fetch.would_enable("reqwest::connect", &Level::INFO));

        let discharge = targets(DISCHARGE_TARGETS);
        assert!(discharge.would_enable("nordpeak::api::modbus", &Level::INFO));
        assert!(!discharge.would_enable("nordpeak::api::nordpool", &Level::INFO));
        assert!(!discharge.would_enable("nordpeak::cli::hunt", &Level::INFO));
    }

    #[test]
    fn creates_log_files() -> Result {
        let folder = tempfile::TempDir::new()?;
        let _appender = new_appender(folder.path(), "fetch_log", NonZeroUsize::MIN)?;
        assert!(folder.path().read_dir()?.next().is_some());
        Ok(())
    }
}
