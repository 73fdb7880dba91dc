//! Tracing subscriber setup for the binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding application's call.

use crate::config::{LogFormat, LoggingConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Diagnostics go to stderr so stdout
/// stays free for traffic. With `config.file` set, a daily-rotated copy is
/// written through a non-blocking appender whose guard is returned; keep it
/// alive for the life of the process. A second call is a no-op.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr = match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match config.file.as_deref().and_then(rolling_writer) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .compact(),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init()
        .ok()?;

    guard
}

fn rolling_writer(path: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path.file_name()?;

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {}", dir.display(), e);
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, prefix);
    Some(tracing_appender::non_blocking(appender))
}
