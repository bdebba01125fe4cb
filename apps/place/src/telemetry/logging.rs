//! Subscriber setup for the `place` binary and the frame dumps used by trace
//! logging.

use clap::ValueEnum;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Overrides every other filter setting when present.
pub const FILTER_ENV: &str = "PLACE_LOG_FILTER";
/// Lets websocket and TLS internals log at trace too.
pub const TRACE_DEPS_ENV: &str = "PLACE_TRACE_DEPS";

/// Most bytes of a frame rendered by [`dump_head`].
pub const DUMP_LIMIT: usize = 64;

/// Crates whose trace output drowns the session log.
const NOISY_DEPS: &[&str] = &["tungstenite", "tokio_tungstenite", "native_tls", "mio"];

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber once; later calls keep the first one.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let trace_deps = super::env_flag(TRACE_DEPS_ENV);
    let directives = match std::env::var(FILTER_ENV) {
        Ok(custom) => custom,
        Err(_) => directives(config.level, trace_deps),
    };
    let (writer, guard) = tracing_appender::non_blocking(open_sink(config.file.as_deref())?);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&directives))
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Install(err.to_string()))?;
    let _ = GUARD.set(guard);

    tracing::debug!(target: "place::log", %directives, "logging ready");
    Ok(())
}

fn open_sink(file: Option<&Path>) -> Result<Box<dyn io::Write + Send>, InitError> {
    let Some(path) = file else {
        return Ok(Box::new(io::stderr()));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| InitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Box::new(file))
}

/// Filter directives for `level`. Debug and trace raise only this client's
/// targets; at trace the noisy transport crates stay at info unless
/// `trace_deps` is set.
fn directives(level: LogLevel, trace_deps: bool) -> String {
    match level {
        LogLevel::Error => "error".to_owned(),
        LogLevel::Warn => "warn".to_owned(),
        LogLevel::Info => "info".to_owned(),
        LogLevel::Debug => "info,place=debug,place_client_core=debug".to_owned(),
        LogLevel::Trace if trace_deps => "trace".to_owned(),
        LogLevel::Trace => NOISY_DEPS
            .iter()
            .fold("trace".to_owned(), |mut acc, dep| {
                let _ = write!(acc, ",{dep}=info");
                acc
            }),
    }
}

/// Hex and ASCII rendering of the first [`DUMP_LIMIT`] bytes of a frame,
/// sixteen bytes per line.
pub fn dump_head(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(DUMP_LIMIT)];
    let mut out = String::new();
    for (line, chunk) in head.chunks(16).enumerate() {
        let _ = write!(out, "{:04x}:", line * 16);
        for byte in chunk {
            let _ = write!(out, " {byte:02x}");
        }
        out.push_str(&"   ".repeat(16 - chunk.len()));
        out.push_str("  |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    if bytes.len() > head.len() {
        let _ = writeln!(out, "... {} more bytes", bytes.len() - head.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_only_client_targets() {
        assert_eq!(
            directives(LogLevel::Debug, false),
            "info,place=debug,place_client_core=debug"
        );
        assert_eq!(directives(LogLevel::Warn, true), "warn");
    }

    #[test]
    fn trace_keeps_transport_crates_at_info() {
        let filter = directives(LogLevel::Trace, false);
        assert!(filter.starts_with("trace,"));
        assert!(filter.contains("tungstenite=info"));
        assert!(filter.contains("native_tls=info"));
        assert_eq!(directives(LogLevel::Trace, true), "trace");
    }

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }

    #[test]
    fn dump_shows_hex_and_printable_bytes() {
        let dump = dump_head(b"AB\x00");
        assert!(dump.starts_with("0000: 41 42 00 "));
        assert!(dump.trim_end().ends_with("|AB.|"));
    }

    #[test]
    fn dump_truncates_long_frames() {
        let frame = vec![0x2a; DUMP_LIMIT + 10];
        let dump = dump_head(&frame);
        assert_eq!(dump.lines().count(), DUMP_LIMIT / 16 + 1);
        assert!(dump.ends_with("... 10 more bytes\n"));
    }
}
