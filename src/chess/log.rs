use log::{Level, LevelFilter, Log, Metadata, Record};
use std::env;
use std::sync::LazyLock;

fn level_from_str(s: &str) -> LevelFilter {
    match s.trim().to_lowercase().as_str() {
        "off" | "none" => LevelFilter::Off,
        "error" | "err" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Error,
    }
}

static CHESS_LOG: LazyLock<LevelFilter> = LazyLock::new(|| {
    env::var("CHESS_LOG")
        .map(|s| level_from_str(&s))
        .unwrap_or(LevelFilter::Error)
});

/// Writes records to stderr, filtered by the `CHESS_LOG` environment variable.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= *CHESS_LOG
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        eprintln!("{prefix}: {}", record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Installs the stderr logger for hosts that do not bring their own.
///
/// Returns `false` when another logger was already installed; calling it
/// more than once is harmless.
pub fn init_logging() -> bool {
    match log::set_logger(&LOGGER) {
        Ok(()) => {
            log::set_max_level(*CHESS_LOG);
            true
        }
        Err(_) => false,
    }
}
