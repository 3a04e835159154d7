//! Error taxonomy for provisioning and append operations.
//!
//! Every failure carries enough structure for the caller to decide between
//! retrying, fixing the input, or fixing the configuration:
//!
//! | Kind | Remedy |
//! |------|--------|
//! | `Auth` | fix configuration (credentials, warehouse) |
//! | `Transport` | retry with backoff when `retryable`, otherwise fix configuration |
//! | `Load` | operator intervention (table vanished or was replaced) |
//! | `SchemaMismatch` | operator intervention (schema evolution is not automatic) |
//! | `Validation` | fix input (raised before any network call) |
//! | `CommitConflict` | resolve contention (bounded retries exhausted) |
//! | `Encoding` | fix input |
//! | `InvalidConfig` | fix configuration (raised before any network call) |
//!
//! A create that races with an existing table is not an error at all: it is
//! reported as [`CreateOutcome::AlreadyExists`](crate::transport::CreateOutcome).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::schema::ColumnMismatch;
use crate::transport::TransportError;

/// Boxed error cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors surfaced by session, provisioning and append operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Identity resolution or the catalog handshake failed.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description.
        message: String,
        /// The underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// A catalog round trip failed or timed out.
    #[error("transport error during {operation}: {message}")]
    Transport {
        /// The catalog operation that failed.
        operation: &'static str,
        /// Human-readable description.
        message: String,
        /// Whether repeating the whole call may succeed.
        retryable: bool,
        /// Whether the round trip exceeded the configured timeout.
        timed_out: bool,
        /// The underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// The table could not be loaded after provisioning.
    #[error("table {table} could not be loaded: {message}")]
    Load {
        /// Table identifier.
        table: String,
        /// Human-readable description.
        message: String,
    },

    /// The remote schema is incompatible with the expected schema.
    #[error("schema mismatch for table {table}: {}", render_mismatches(.mismatches))]
    SchemaMismatch {
        /// Table identifier.
        table: String,
        /// Every incompatible column.
        mismatches: Vec<ColumnMismatch>,
    },

    /// The batch does not match the table schema.
    #[error("invalid batch: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Index of the offending record, if the defect is record-specific.
        record: Option<usize>,
    },

    /// Every commit attempt lost the version race.
    #[error("commit to {table} lost the version race on all {attempts} attempts")]
    CommitConflict {
        /// Table identifier.
        table: String,
        /// Number of commit attempts made.
        attempts: u32,
    },

    /// The batch could not be encoded into a data file.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Human-readable description.
        message: String,
        /// The underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// Local configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable description.
        message: String,
    },
}

/// Discriminant of a [`CatalogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`CatalogError::Auth`].
    Auth,
    /// See [`CatalogError::Transport`].
    Transport,
    /// See [`CatalogError::Load`].
    Load,
    /// See [`CatalogError::SchemaMismatch`].
    SchemaMismatch,
    /// See [`CatalogError::Validation`].
    Validation,
    /// See [`CatalogError::CommitConflict`].
    CommitConflict,
    /// See [`CatalogError::Encoding`].
    Encoding,
    /// See [`CatalogError::InvalidConfig`].
    InvalidConfig,
}

impl ErrorKind {
    /// Returns the stable machine-readable name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth_error",
            Self::Transport => "transport_error",
            Self::Load => "load_error",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Validation => "validation_error",
            Self::CommitConflict => "commit_conflict",
            Self::Encoding => "encoding_error",
            Self::InvalidConfig => "invalid_config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remedy {
    /// Repeat the whole call, with backoff.
    Retry,
    /// Correct the supplied records.
    FixInput,
    /// Correct credentials, endpoint or other settings.
    FixConfiguration,
    /// Writers are contending for the table; retry later or reduce concurrency.
    ResolveContention,
    /// The remote table needs manual attention.
    OperatorIntervention,
}

impl fmt::Display for Remedy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retry => "retry",
            Self::FixInput => "fix input",
            Self::FixConfiguration => "fix configuration",
            Self::ResolveContention => "resolve contention",
            Self::OperatorIntervention => "operator intervention",
        };
        f.write_str(s)
    }
}

impl CatalogError {
    /// Creates an authentication error with a source cause.
    #[must_use]
    pub fn auth(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Auth {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps a transport failure for the given operation.
    #[must_use]
    pub fn transport(operation: &'static str, err: TransportError) -> Self {
        Self::Transport {
            operation,
            message: err.to_string(),
            retryable: err.is_retryable(),
            timed_out: false,
            source: Some(Box::new(err)),
        }
    }

    /// Creates a timeout error for the given operation.
    #[must_use]
    pub fn timeout(operation: &'static str, limit: Duration) -> Self {
        Self::Transport {
            operation,
            message: format!("no response within {}ms", limit.as_millis()),
            retryable: true,
            timed_out: true,
            source: None,
        }
    }

    /// Creates a validation error for a specific record.
    #[must_use]
    pub fn invalid_record(index: usize, message: impl fmt::Display) -> Self {
        Self::Validation {
            message: format!("record {index}: {message}"),
            record: Some(index),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns the discriminant of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Load { .. } => ErrorKind::Load,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::CommitConflict { .. } => ErrorKind::CommitConflict,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// Returns what the caller should do about this error.
    #[must_use]
    pub const fn remedy(&self) -> Remedy {
        match self {
            Self::Transport {
                retryable: true, ..
            } => Remedy::Retry,
            Self::Auth { .. } | Self::Transport { .. } | Self::InvalidConfig { .. } => {
                Remedy::FixConfiguration
            }
            Self::Validation { .. } | Self::Encoding { .. } => Remedy::FixInput,
            Self::CommitConflict { .. } => Remedy::ResolveContention,
            Self::Load { .. } | Self::SchemaMismatch { .. } => Remedy::OperatorIntervention,
        }
    }

    /// Returns true if repeating the whole call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.remedy(), Remedy::Retry)
    }
}

fn render_mismatches(mismatches: &[ColumnMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
