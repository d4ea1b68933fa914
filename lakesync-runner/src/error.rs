//! Error type for the runner service.

use lakesync::error::SyncError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Captured backtrace wrapper for infrastructure error variants.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the runner service.
///
/// Wraps [`SyncError`] for pipeline failures and adds variants for
/// infrastructure failures around the pipeline itself.
#[derive(Debug)]
pub enum RunnerError {
    /// Pipeline failure.
    Sync(SyncError),
    /// Configuration loading or validation failure.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Lake storage backend construction failure.
    Storage(object_store::Error, CapturedBacktrace),
    /// Telemetry initialization failure.
    Telemetry(Box<dyn Error + Send + Sync>, CapturedBacktrace),
}

impl RunnerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            RunnerError::Sync(_) => "synchronization error",
            RunnerError::Config(_, _) => "configuration error",
            RunnerError::Storage(_, _) => "lake storage error",
            RunnerError::Telemetry(_, _) => "telemetry error",
        }
    }

    /// Returns the backtrace for this error, when one was captured.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            RunnerError::Sync(err) => err.backtrace(),
            RunnerError::Config(_, cb)
            | RunnerError::Telemetry(_, cb)
            | RunnerError::Storage(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any boxed source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RunnerError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Creates a telemetry error from any boxed source.
    pub fn telemetry<E: Error + Send + Sync + 'static>(err: E) -> Self {
        RunnerError::Telemetry(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("lakesync run failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace() {
            if let Some(backtrace) = self.backtrace() {
                out.push_str("backtrace:\n");
                out.push_str(&backtrace.to_string());
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        out
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::Sync(err) => write!(f, "{err}"),
            RunnerError::Config(source, _) => write!(f, "configuration error: {source}"),
            RunnerError::Storage(source, _) => write!(f, "lake storage error: {source}"),
            RunnerError::Telemetry(source, _) => write!(f, "telemetry error: {source}"),
        }
    }
}

impl Error for RunnerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunnerError::Sync(err) => err.source(),
            RunnerError::Config(source, _) | RunnerError::Telemetry(source, _) => {
                Some(source.as_ref())
            }
            RunnerError::Storage(source, _) => Some(source),
        }
    }
}

impl From<SyncError> for RunnerError {
    fn from(err: SyncError) -> Self {
        RunnerError::Sync(err)
    }
}

impl From<object_store::Error> for RunnerError {
    fn from(err: object_store::Error) -> Self {
        RunnerError::Storage(err, CapturedBacktrace::capture())
    }
}
