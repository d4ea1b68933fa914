//! Tracing initialization for lakesync services.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Guard that flushes buffered log lines when dropped.
///
/// Hold it for the lifetime of the process; dropping it early silently
/// discards the tail of the log output.
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Errors raised during tracing initialization.
#[derive(Debug)]
pub enum InitTracingError {
    /// A global subscriber was already installed.
    Subscriber(TryInitError),
    /// The log-to-tracing bridge was already installed.
    LogBridge(tracing_log::log::SetLoggerError),
}

impl std::fmt::Display for InitTracingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitTracingError::Subscriber(err) => {
                write!(f, "failed to install tracing subscriber: {err}")
            }
            InitTracingError::LogBridge(err) => {
                write!(f, "failed to install log bridge: {err}")
            }
        }
    }
}

impl std::error::Error for InitTracingError {}

/// Initializes the global tracing subscriber for a service.
///
/// The filter honors `RUST_LOG`, defaulting to `info`. Output goes through a
/// non-blocking stdout writer; `json_output` selects machine-readable lines
/// (production) over the human-readable format (development).
pub fn init_tracing(service_name: &str, json_output: bool) -> Result<LogFlusher, InitTracingError> {
    // Route `log`-based crates through tracing so their lines carry the same
    // filtering and formatting.
    tracing_log::LogTracer::init().map_err(InitTracingError::LogBridge)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json_output {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(writer),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .try_init()
    };
    result.map_err(InitTracingError::Subscriber)?;

    tracing::info!(service_name, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}
