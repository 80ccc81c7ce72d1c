//! Process-wide logging and telemetry setup
//!
//! Installs a `tracing` subscriber with an env filter, a stderr layer
//! (pretty or JSON) and an optional daily-rolling file layer.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{EngineConfig, LogFormat, LoggingConfig};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "bidi_agent_engine=info";

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "bidi-agent-engine.log";

/// Keeps the file writer alive; drop it on shutdown to flush.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize logging
///
/// Safe to call more than once: later calls leave the first subscriber in
/// place and return a guard with no file writer.
pub fn init_logging(config: &LoggingConfig) -> LoggingGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(format = ?config.format, log_dir = ?config.log_dir, "Logging initialized");
        LoggingGuard { _file: guard }
    } else {
        LoggingGuard { _file: None }
    }
}

/// Report the telemetry settings resolved at startup
///
/// Settings travel in `EngineConfig`; the process environment is never
/// modified here.
pub fn setup_telemetry(config: &EngineConfig) {
    tracing::info!(
        project = %config.project,
        location = %config.location,
        logs_bucket = config.logs_bucket_name.as_deref().unwrap_or("<none>"),
        managed = config.is_managed(),
        capture_message_content = config.telemetry.capture_message_content,
        "Telemetry configured"
    );
}
