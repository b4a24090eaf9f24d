//! Log output for the client SDK.
//!
//! The SDK only emits `tracing` events, so any subscriber installed by the
//! host application receives them. Applications without their own subscriber
//! can call [`init`] to get prefixed lines on stdout:
//!
//! ```text
//! [ConfigDirector:rust-client-sdk] WARN Timed out waiting for initialization after 3000ms. timeout_ms=3000
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_PREFIX: &str = "[ConfigDirector:rust-client-sdk]";

/// Verbosity of the built-in subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl LogLevel {
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }

    /// Parses a level name, falling back to [`LogLevel::Warn`] on unknown input.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: off, error, warn, info, debug",
            )),
        }
    }
}

/// Event formatter prefixing every line with [`LOG_PREFIX`] and the level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{LOG_PREFIX} {} ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs a stdout subscriber using [`Formatter`] as the global default.
///
/// Fails if the process already has a global subscriber.
pub fn init(level: LogLevel) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::fmt()
        .event_format(Formatter)
        .with_max_level(level.as_level_filter())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture(level: LogLevel, f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .event_format(Formatter)
            .with_max_level(level.as_level_filter())
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        capture.contents()
    }

    #[test]
    fn lines_carry_prefix_and_level() {
        let output = capture(LogLevel::Warn, || {
            tracing::warn!(status = 401, "Connection failed");
        });
        assert_eq!(
            output,
            "[ConfigDirector:rust-client-sdk] WARN Connection failed status=401\n"
        );
    }

    #[test]
    fn spans_are_rendered_before_the_message() {
        let output = capture(LogLevel::Debug, || {
            let span = tracing::debug_span!("connect", attempt = 2);
            let _guard = span.enter();
            tracing::debug!("Opening stream");
        });
        assert_eq!(
            output,
            "[ConfigDirector:rust-client-sdk] DEBUG connect{attempt=2}: Opening stream\n"
        );
    }

    #[test]
    fn level_filter_suppresses_verbose_events() {
        let output = capture(LogLevel::Error, || {
            tracing::warn!("hidden");
            tracing::error!("shown");
        });
        assert!(!output.contains("hidden"));
        assert!(output.contains("ERROR shown"));

        assert!(capture(LogLevel::Off, || tracing::error!("nothing")).is_empty());
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!(LogLevel::from_str("DeBuG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("off").unwrap(), LogLevel::Off);
        assert!(LogLevel::from_str("trace").is_err());
        assert_eq!(LogLevel::parse_lenient("verbose"), LogLevel::Warn);
        assert_eq!(LogLevel::Info.as_ref(), "INFO");
    }
}
