//! Error types and result definitions for lake-to-warehouse synchronization.
//!
//! Provides a classified error system with captured diagnostic metadata for every
//! pipeline operation. [`SyncError`] supports single errors, errors with additional
//! detail, and multiple aggregated errors (for batched staging loads).

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for synchronization operations using [`SyncError`].
pub type SyncResult<T> = Result<T, SyncError>;

/// Detailed payload stored for single [`SyncError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for synchronization operations.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// Users should not interact with this type directly but use [`SyncError`] methods
/// instead.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, e.g. from a batched load where several
    /// insert batches failed independently.
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur while synchronizing a lake table
/// into the warehouse.
///
/// Error kinds are organized by the side of the bridge they originate from and by
/// failure mode, so callers can decide whether a failure is retryable and how to
/// report it.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Lake (source) errors
    /// The commit log is absent or contains no parseable commit entries.
    NoCommitsFound,
    /// Lake storage could not be read (auth, network, or backend failure).
    SourceUnavailable,
    /// The commit log is internally inconsistent (gap in the version sequence,
    /// or a commit body that cannot be parsed).
    InvalidCommitLog,

    // Data errors
    ConversionError,
    InvalidData,

    // Warehouse (destination) errors
    DestinationQueryFailed,
    DestinationIoError,
    DestinationTableNameInvalid,
    /// The staging load or external-table registration did not complete.
    LoadFailed,
    /// The merge statement errored or was rejected by the warehouse.
    MergeFailed,

    // Configuration & security errors
    ConfigError,
    AuthenticationError,

    // General errors
    InvalidState,
    Unknown,
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For aggregated errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the aggregated errors when this error wraps more than one failure.
    pub fn errors(&self) -> Option<&[SyncError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    ///
    /// The stored source is preserved across clones and exposed via
    /// [`error::Error::source`]. Has no effect on aggregated errors because
    /// aggregates forward their first contained error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates a [`SyncError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (i, line) in rendered.lines().enumerate() {
                        if i == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`SyncError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

/// Creates a [`SyncError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

/// Creates a [`SyncError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly without
/// wrapping it.
impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SyncError {
        let location = Location::caller();

        let mut errors: Vec<SyncError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        SyncError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_exposes_kind_and_detail() {
        let err = SyncError::from((
            ErrorKind::NoCommitsFound,
            "No commits in lake table",
            "prefix `_delta_log/` listed zero entries".to_string(),
        ));

        assert_eq!(err.kind(), ErrorKind::NoCommitsFound);
        assert_eq!(
            err.detail(),
            Some("prefix `_delta_log/` listed zero entries")
        );
        assert!(err.errors().is_none());
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let errors = vec![
            SyncError::from((ErrorKind::LoadFailed, "batch 0 failed")),
            SyncError::from((ErrorKind::DestinationIoError, "batch 1 failed")),
        ];
        let err = SyncError::from(errors);

        assert_eq!(err.kind(), ErrorKind::LoadFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::LoadFailed, ErrorKind::DestinationIoError]
        );
        assert_eq!(err.errors().map(<[SyncError]>::len), Some(2));
    }

    #[test]
    fn singleton_vector_unwraps_to_single_error() {
        let err = SyncError::from(vec![SyncError::from((
            ErrorKind::MergeFailed,
            "merge rejected",
        ))]);

        assert!(err.errors().is_none());
        assert_eq!(err.kind(), ErrorKind::MergeFailed);
    }

    #[test]
    fn equality_compares_kinds_only() {
        let a = SyncError::from((ErrorKind::SourceUnavailable, "read failed"));
        let b = SyncError::from((
            ErrorKind::SourceUnavailable,
            "other read failed",
            "detail".to_string(),
        ));

        assert_eq!(a, b);
    }
}
