//! Logger construction helpers shared by the daemons and tests.

use slog::{o, Drain, Level, Logger};
use sloggers::{null::NullLoggerBuilder, Build};

/// A logger that discards everything. Used by tests.
pub fn null_logger() -> Logger {
    NullLoggerBuilder
        .build()
        .expect("the null logger builder is infallible")
}

/// A terminal logger for the daemon binaries.
pub fn term_logger(debug_level: &str) -> Result<Logger, String> {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build();

    let drain = match debug_level {
        "info" => drain.filter_level(Level::Info),
        "debug" => drain.filter_level(Level::Debug),
        "trace" => drain.filter_level(Level::Trace),
        "warn" => drain.filter_level(Level::Warning),
        "error" => drain.filter_level(Level::Error),
        unknown => return Err(format!("unknown debug-level: {}", unknown)),
    };

    Ok(Logger::root(drain.fuse(), o!()))
}
