//! Error types for Person Sync
//!
//! Uses `thiserror` for ergonomic error handling with full context preservation.

use std::fmt;
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Primary error type for all sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// A field failed its constraint predicate
    #[error("Validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    /// Requested id is absent from the primary store
    #[error("Person not found: {id}")]
    NotFound { id: String },

    /// An id was supplied where none is expected, or is missing or mismatched
    #[error("Id conflict: {message}")]
    IdConflict { message: String },

    /// Primary store unreachable or erroring
    #[error("Record store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Search index unreachable or erroring during a mirror write
    #[error("Search index write error: {message}")]
    IndexWrite {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Search index unreachable or erroring during a read
    #[error("Search index query error: {message}")]
    IndexQuery {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Record serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    IdConflict,
    StoreFailure,
    IndexWriteFailure,
    IndexQueryFailure,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case label, used for metrics and error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::NotFound => "not_found",
            Self::IdConflict => "id_conflict",
            Self::StoreFailure => "store_failure",
            Self::IndexWriteFailure => "index_write_failure",
            Self::IndexQueryFailure => "index_query_failure",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    /// Create a validation error for a field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an id conflict error
    pub fn id_conflict(message: impl Into<String>) -> Self {
        Self::IdConflict {
            message: message.into(),
        }
    }

    /// Create a record store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a record store error with source
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search index write error
    pub fn index_write(message: impl Into<String>) -> Self {
        Self::IndexWrite {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search index write error with source
    pub fn index_write_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::IndexWrite {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search index query error
    pub fn index_query(message: impl Into<String>) -> Self {
        Self::IndexQuery {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search index query error with source
    pub fn index_query_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::IndexQuery {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a serialization error with source
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationFailed,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::IdConflict { .. } => ErrorKind::IdConflict,
            Self::Store { .. } => ErrorKind::StoreFailure,
            Self::IndexWrite { .. } => ErrorKind::IndexWriteFailure,
            Self::IndexQuery { .. } => ErrorKind::IndexQueryFailure,
            Self::Configuration { .. } | Self::Serialization { .. } | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if the caller can act on the error (bad input or unknown id)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ValidationFailed | ErrorKind::NotFound | ErrorKind::IdConflict
        )
    }

    /// Check if error means a backing store is unavailable
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreFailure | ErrorKind::IndexWriteFailure | ErrorKind::IndexQueryFailure
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization_with_source("JSON encoding failed", e)
    }
}

/// Error context for enhanced debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub component: &'static str,
    pub operation: String,
    pub record_id: Option<String>,
}

impl ErrorContext {
    pub fn new(component: &'static str, operation: impl Into<String>) -> Self {
        Self {
            component,
            operation: operation.into(),
            record_id: None,
        }
    }

    pub fn with_record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}::{}]", self.component, self.operation)?;
        if let Some(ref id) = self.record_id {
            write!(f, " id={}", id)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContextExt<T> {
    fn with_context(self, ctx: ErrorContext) -> Result<T>;
}

impl<T> ErrorContextExt<T> for Result<T> {
    fn with_context(self, ctx: ErrorContext) -> Result<T> {
        self.map_err(|e| {
            // Expected outcomes are not worth an error line
            if e.is_client_error() {
                tracing::debug!(error = %e, context = %ctx, "Operation rejected");
            } else {
                tracing::error!(
                    error = %e,
                    component = ctx.component,
                    operation = %ctx.operation,
                    record_id = ?ctx.record_id,
                    "Operation failed"
                );
            }
            e
        })
    }
}
