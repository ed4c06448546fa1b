//! Terminal and test loggers shared by the generator, the mocks and the simulator.
use slog::{o, Drain, Level, Logger};
use slog_term::Decorator;
use std::io::{Result, Write};
use std::sync::atomic::{AtomicU64, Ordering};

pub const MAX_MESSAGE_WIDTH: usize = 40;

/// Channel size of the async drain. Records beyond this are dropped rather than blocking.
pub const LOG_CHANNEL_SIZE: usize = 2048;

static WARNS_LOGGED: AtomicU64 = AtomicU64::new(0);
static ERRORS_LOGGED: AtomicU64 = AtomicU64::new(0);
static CRITS_LOGGED: AtomicU64 = AtomicU64::new(0);

/// Warnings, errors and crits that have passed through an `AlignedTermDecorator` so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogCounts {
    pub warns: u64,
    pub errors: u64,
    pub crits: u64,
}

pub fn log_counts() -> LogCounts {
    LogCounts {
        warns: WARNS_LOGGED.load(Ordering::Relaxed),
        errors: ERRORS_LOGGED.load(Ordering::Relaxed),
        crits: CRITS_LOGGED.load(Ordering::Relaxed),
    }
}

/// Parses a `--debug-level` value.
pub fn parse_level(debug_level: &str) -> std::result::Result<Level, String> {
    match debug_level {
        "info" => Ok(Level::Info),
        "debug" => Ok(Level::Debug),
        "trace" => Ok(Level::Trace),
        "warn" => Ok(Level::Warning),
        "error" => Ok(Level::Error),
        "crit" => Ok(Level::Critical),
        unknown => Err(format!("Unknown debug-level: {}", unknown)),
    }
}

/// Builds the asynchronous terminal logger used by the binaries.
///
/// The logger is "async" because a dedicated thread accepts records and flushes them to the
/// terminal, so the thread that raised the log does not wait on stdout.
pub fn async_logger(debug_level: &str) -> std::result::Result<Logger, String> {
    let level = parse_level(debug_level)?;
    let decorator = slog_term::TermDecorator::new().build();
    let decorator = AlignedTermDecorator::new(decorator, MAX_MESSAGE_WIDTH);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(LOG_CHANNEL_SIZE)
        .build()
        .filter_level(level)
        .fuse();
    Ok(Logger::root(drain, o!()))
}

/// A logger that discards everything.
pub fn null_logger() -> std::result::Result<Logger, String> {
    use sloggers::Build;

    sloggers::null::NullLoggerBuilder
        .build()
        .map_err(|e| format!("Failed to start null logger: {:?}", e))
}

pub struct AlignedTermDecorator<D: Decorator> {
    wrapped: D,
    message_width: usize,
}

impl<D: Decorator> AlignedTermDecorator<D> {
    pub fn new(decorator: D, message_width: usize) -> Self {
        AlignedTermDecorator {
            wrapped: decorator,
            message_width,
        }
    }
}

impl<D: Decorator> Decorator for AlignedTermDecorator<D> {
    fn with_record<F>(
        &self,
        record: &slog::Record,
        _logger_values: &slog::OwnedKVList,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut dyn slog_term::RecordDecorator) -> std::io::Result<()>,
    {
        match record.level() {
            Level::Warning => WARNS_LOGGED.fetch_add(1, Ordering::Relaxed),
            Level::Error => ERRORS_LOGGED.fetch_add(1, Ordering::Relaxed),
            Level::Critical => CRITS_LOGGED.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };

        self.wrapped.with_record(record, _logger_values, |deco| {
            f(&mut AlignedRecordDecorator::new(deco, self.message_width))
        })
    }
}

struct AlignedRecordDecorator<'a> {
    wrapped: &'a mut dyn slog_term::RecordDecorator,
    message_count: usize,
    message_active: bool,
    ignore_comma: bool,
    message_width: usize,
}

impl<'a> AlignedRecordDecorator<'a> {
    fn new(
        decorator: &'a mut dyn slog_term::RecordDecorator,
        message_width: usize,
    ) -> AlignedRecordDecorator<'a> {
        AlignedRecordDecorator {
            wrapped: decorator,
            message_count: 0,
            ignore_comma: false,
            message_active: false,
            message_width,
        }
    }
}

impl<'a> Write for AlignedRecordDecorator<'a> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.ignore_comma {
            self.ignore_comma = false;
            Ok(buf.len())
        } else if self.message_active {
            self.wrapped.write(buf).map(|n| {
                self.message_count += n;
                n
            })
        } else {
            self.wrapped.write(buf)
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.wrapped.flush()
    }
}

impl<'a> slog_term::RecordDecorator for AlignedRecordDecorator<'a> {
    fn reset(&mut self) -> Result<()> {
        self.message_active = false;
        self.message_count = 0;
        self.ignore_comma = false;
        self.wrapped.reset()
    }

    fn start_whitespace(&mut self) -> Result<()> {
        self.wrapped.start_whitespace()
    }

    fn start_msg(&mut self) -> Result<()> {
        self.message_active = true;
        self.ignore_comma = false;
        self.wrapped.start_msg()
    }

    fn start_timestamp(&mut self) -> Result<()> {
        self.wrapped.start_timestamp()
    }

    fn start_level(&mut self) -> Result<()> {
        self.wrapped.start_level()
    }

    fn start_comma(&mut self) -> Result<()> {
        if self.message_active && self.message_count + 1 < self.message_width {
            self.ignore_comma = true;
        }
        self.wrapped.start_comma()
    }

    fn start_key(&mut self) -> Result<()> {
        if self.message_active && self.message_count + 1 < self.message_width {
            write!(
                self,
                "{}",
                " ".repeat(self.message_width - self.message_count)
            )?;
            self.message_active = false;
            self.message_count = 0;
            self.ignore_comma = false;
        }
        self.wrapped.start_key()
    }

    fn start_value(&mut self) -> Result<()> {
        self.wrapped.start_value()
    }

    fn start_separator(&mut self) -> Result<()> {
        self.wrapped.start_separator()
    }
}

/// Return a logger suitable for test usage.
///
/// By default no logs will be printed, but they can be enabled via the `test_logger` feature:
///
/// ```bash
/// cargo test -p clmock --features 'logging/test_logger'
/// ```
pub fn test_logger() -> Logger {
    use sloggers::Build;

    if cfg!(feature = "test_logger") {
        sloggers::terminal::TerminalLoggerBuilder::new()
            .level(sloggers::types::Severity::Debug)
            .build()
            .expect("Should build test_logger")
    } else {
        sloggers::null::NullLoggerBuilder
            .build()
            .expect("Should build null_logger")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slog::{info, warn};

    #[test]
    fn levels() {
        assert_eq!(parse_level("warn"), Ok(Level::Warning));
        assert_eq!(parse_level("crit"), Ok(Level::Critical));
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn aligned_decorator_counts_warnings() {
        let before = log_counts();
        let decorator = slog_term::PlainSyncDecorator::new(std::io::sink());
        let decorator = AlignedTermDecorator::new(decorator, MAX_MESSAGE_WIDTH);
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let log = Logger::root(drain, o!());

        info!(log, "Not counted"; "block" => 1);
        warn!(log, "Counted"; "block" => 2);
        assert!(log_counts().warns > before.warns);
    }

    #[test]
    fn null_logger_builds() {
        let log = null_logger().unwrap();
        info!(log, "Dropped");
    }
}
