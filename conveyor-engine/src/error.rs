//! Error types and result definitions for engine operations.
//!
//! Provides an error system with classification and captured diagnostic metadata for
//! pipeline execution. The [`EngineError`] type supports single errors, errors with
//! additional detail, and multiple aggregated errors for worker failure scenarios.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for engine operations using [`EngineError`] as the error type.
pub type EngineResult<T> = Result<T, EngineError>;

/// Detailed payload stored for single [`EngineError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for engine operations.
///
/// [`EngineError`] can represent single errors, errors with additional detail, or
/// multiple aggregated errors. Classification via [`ErrorKind`] drives both the
/// error-handling policies during job execution and the HTTP status mapping at the
/// API boundary.
#[derive(Debug, Clone)]
pub struct EngineError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// This variant is mainly useful to capture multiple worker failures.
    Many {
        errors: Vec<EngineError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during pipeline execution.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration errors
    ConfigError,
    InvalidCronExpression,

    // Connection errors
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Data errors
    RecordLoadFailed,
    ConversionError,
    SerializationError,
    DeserializationError,

    // Lifecycle errors
    InvalidTransition,
    Conflict,
    JobTimeout,
    PipelineNotFound,
    JobNotFound,

    // Execution errors
    ExecutorWorkerPanic,
    SourceError,
    DestinationError,
    IoError,

    // Unknown / uncategorized
    Unknown,
}

impl EngineError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
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
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error.
    ///
    /// For multiple errors, returns the description of the first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("no errors aggregated"),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
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

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    /// Has no effect when called on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates an [`EngineError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        EngineError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &EngineError) -> bool {
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

impl fmt::Display for EngineError {
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
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
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

impl error::Error for EngineError {
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

/// Creates an [`EngineError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EngineError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EngineError {
        EngineError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EngineError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EngineError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EngineError {
        EngineError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates an [`EngineError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly without wrapping
/// it in an aggregate.
impl<E> From<Vec<E>> for EngineError
where
    E: Into<EngineError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EngineError {
        let location = Location::caller();

        let mut errors: Vec<EngineError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        EngineError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`EngineError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for EngineError {
    #[track_caller]
    fn from(err: std::io::Error) -> EngineError {
        let detail = err.to_string();
        let source = Arc::new(err);
        EngineError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`EngineError`] with the appropriate error kind.
impl From<serde_json::Error> for EngineError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EngineError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        EngineError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`reqwest::Error`] to [`EngineError`].
///
/// Connect-phase failures map to [`ErrorKind::SourceConnectionFailed`]; everything else
/// is classified as [`ErrorKind::SourceError`] since the HTTP adapters are the only
/// reqwest users.
impl From<reqwest::Error> for EngineError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EngineError {
        let kind = if err.is_connect() || err.is_timeout() {
            ErrorKind::SourceConnectionFailed
        } else {
            ErrorKind::SourceError
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        EngineError::from_components(
            kind,
            Cow::Borrowed("HTTP request failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_reports_kind_and_detail() {
        let err = EngineError::from((
            ErrorKind::ConfigError,
            "missing adapter field",
            "field `base_url` is required",
        ));

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.detail(), Some("field `base_url` is required"));
        assert!(err.to_string().contains("missing adapter field"));
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let errors = vec![
            EngineError::from((ErrorKind::SourceError, "source failed")),
            EngineError::from((ErrorKind::DestinationError, "destination failed")),
        ];
        let err = EngineError::from(errors);

        assert_eq!(err.kind(), ErrorKind::SourceError);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SourceError, ErrorKind::DestinationError]
        );
    }

    #[test]
    fn single_element_vector_unwraps() {
        let err = EngineError::from(vec![EngineError::from((ErrorKind::JobTimeout, "timed out"))]);
        assert_eq!(err.kind(), ErrorKind::JobTimeout);
        assert!(!err.to_string().contains("aggregated"));
    }

    #[test]
    fn equality_compares_kinds_only() {
        let a = EngineError::from((ErrorKind::Conflict, "one description"));
        let b = EngineError::from((ErrorKind::Conflict, "another description"));
        assert_eq!(a, b);
    }
}
