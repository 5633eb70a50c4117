//! Logging infrastructure for kvcheck
//!
//! Everything logs through the `log` facade under the `kvcheck` target.
//! [`init`] installs an `env_logger` backend once per process; if another
//! logger is already installed it is left in place.

use log::{Level, LevelFilter};
use std::io::Write;
use std::sync::Once;
use std::time::{Duration, Instant};

/// Environment variable holding the filter for [`init`], in `RUST_LOG` syntax
pub const LOG_ENV: &str = "KVCHECK_LOG";

/// Default duration after which a timed operation is reported as slow
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(10);

static INIT: Once = Once::new();

fn level_label(level: Level, colored: bool) -> &'static str {
    match (level, colored) {
        (Level::Error, true) => "\x1b[31mERROR\x1b[0m",
        (Level::Warn, true) => "\x1b[33mWARN\x1b[0m",
        (Level::Info, true) => "\x1b[32mINFO\x1b[0m",
        (Level::Debug, true) => "\x1b[36mDEBUG\x1b[0m",
        (Level::Trace, true) => "\x1b[37mTRACE\x1b[0m",
        (level, false) => level.as_str(),
    }
}

fn install(mut builder: env_logger::Builder, colored: bool) {
    builder.format(move |buf, record| {
        writeln!(
            buf,
            "{} [{}] {}: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level_label(record.level(), colored),
            record.target(),
            record.args()
        )
    });
    if builder.try_init().is_err() {
        log::debug!(target: "kvcheck", "Logger already installed; keeping it");
    }
}

/// Initialize the kvcheck logging system
///
/// The filter comes from `KVCHECK_LOG` and defaults to `info`. Levels are
/// colored.
pub fn init() {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(LevelFilter::Info);
        if let Ok(filters) = std::env::var(LOG_ENV) {
            builder.parse_filters(&filters);
        }
        install(builder, true);
        log::info!(target: "kvcheck", "kvcheck logging system initialized");
    });
}

/// Initialize logging with a specific level, without colors
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level);
        install(builder, false);
        log::info!(target: "kvcheck", "kvcheck logging system initialized with level: {level:?}");
    });
}

/// Log an error message with kvcheck context
#[macro_export]
macro_rules! kvcheck_error {
    ($($arg:tt)*) => {
        log::error!(target: "kvcheck", $($arg)*)
    };
}

/// Log a warning message with kvcheck context
#[macro_export]
macro_rules! kvcheck_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "kvcheck", $($arg)*)
    };
}

/// Log an info message with kvcheck context
#[macro_export]
macro_rules! kvcheck_info {
    ($($arg:tt)*) => {
        log::info!(target: "kvcheck", $($arg)*)
    };
}

/// Log a debug message with kvcheck context
#[macro_export]
macro_rules! kvcheck_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "kvcheck", $($arg)*)
    };
}

/// Log a trace message with kvcheck context
#[macro_export]
macro_rules! kvcheck_trace {
    ($($arg:tt)*) => {
        log::trace!(target: "kvcheck", $($arg)*)
    };
}

/// Times one operation and warns when it runs past its threshold
pub struct Timer {
    start: Instant,
    operation: String,
    slow_threshold: Duration,
}

impl Timer {
    /// Start timing with [`DEFAULT_SLOW_THRESHOLD`]
    pub fn start<S: Into<String>>(operation: S) -> Self {
        Self::with_threshold(operation, DEFAULT_SLOW_THRESHOLD)
    }

    /// Start timing an operation that only counts as slow past `slow_threshold`
    pub fn with_threshold<S: Into<String>>(operation: S, slow_threshold: Duration) -> Self {
        let operation = operation.into();
        kvcheck_trace!("Starting operation: {}", operation);
        Self {
            start: Instant::now(),
            operation,
            slow_threshold,
        }
    }

    /// Time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        kvcheck_debug!("Operation '{}' completed in {:?}", self.operation, elapsed);
        elapsed
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if elapsed > self.slow_threshold {
            kvcheck_warn!("Slow operation '{}' took {:?}", self.operation, elapsed);
        }
    }
}
