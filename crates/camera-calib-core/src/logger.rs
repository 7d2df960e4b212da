//! Logging setup shared by the library crates and the CLI.
//!
//! Without the `tracing` feature, [`init_with_level`] installs a small stderr
//! logger. Lines look like
//! `[  12.041s  INFO calibration solver] calibrated 20 views ...`, where the
//! third field is the thread name. Calibration runs on its own thread.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    max_level: LevelFilter,
    epoch: Instant,
}

/// Last path segment of a log target (`camera_calib::worker` -> `worker`).
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let line = format!(
            "[{:8.3}s {:>5} {} {}] {}\n",
            self.epoch.elapsed().as_secs_f64(),
            record.level(),
            thread.name().unwrap_or("-"),
            short_target(record.target()),
            record.args()
        );
        // One write per record so lines from the worker and the caller do
        // not interleave.
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger at `level`. Later calls keep the first logger.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        max_level: level,
        epoch: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// `EnvFilter` directive matching a `log` level filter.
#[cfg(feature = "tracing")]
fn directive(level: LevelFilter) -> String {
    level.to_string().to_ascii_lowercase()
}

/// Install a `tracing-subscriber` formatter filtered by `RUST_LOG`, falling
/// back to `level`. `json` switches to flattened JSON events. Span closings
/// are reported so instrumented stages show their duration.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: LevelFilter) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_thread_names(true);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder.with_timer(fmt::time::Uptime::default()).finish().try_init()
    };
}
