use docrel_core::{CoercionError, ConfigurationError};

use crate::store::StoreError;

/// A document could not be turned into a row.
#[derive(Debug)]
pub enum ResolutionError {
    /// An edge chain ended at a document outside the join's collection.
    CollectionMismatch {
        alias: String,
        expected: String,
        handle: String,
    },
    /// The key path resolved to nothing after all joins succeeded.
    MissingKey {
        unit: String,
        key_field: String,
        document: String,
    },
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionError::CollectionMismatch {
                alias,
                expected,
                handle,
            } => write!(
                f,
                "Join '{}' expected a document from {} but reached {}",
                alias, expected, handle
            ),
            ResolutionError::MissingKey {
                unit,
                key_field,
                document,
            } => write!(
                f,
                "Key field {} resolved to null for document {} in {}",
                key_field, document, unit
            ),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// Errors that abort a sync run.
#[derive(Debug)]
pub enum SyncError {
    /// The mapping failed validation.
    Configuration(ConfigurationError),
    /// The relational store could not be opened.
    Connection(String),
    /// A document store call failed.
    Store(StoreError),
    /// A document store call failed while resolving a join.
    Join { alias: String, source: StoreError },
    Resolution(ResolutionError),
    /// A value could not be converted for its destination column.
    Coercion {
        table: String,
        column: String,
        source: CoercionError,
    },
    /// The relational store rejected a statement.
    Persistence(sqlx::Error),
    /// A unit failed; its transaction was rolled back.
    Unit {
        unit: String,
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn in_unit(self, unit: &str) -> Self {
        SyncError::Unit {
            unit: unit.to_string(),
            source: Box::new(self),
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Configuration(e) => write!(f, "Configuration error: {}", e),
            SyncError::Connection(e) => write!(f, "Connection error: {}", e),
            SyncError::Store(e) => write!(f, "{}", e),
            SyncError::Join { alias, source } => {
                write!(f, "Join '{}' failed: {}", alias, source)
            }
            SyncError::Resolution(e) => write!(f, "{}", e),
            SyncError::Coercion {
                table,
                column,
                source,
            } => write!(f, "Cannot write {}.{}: {}", table, column, source),
            SyncError::Persistence(e) => write!(f, "Database error: {}", e),
            SyncError::Unit { unit, source } => {
                write!(f, "Sync unit {} failed: {}", unit, source)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Configuration(e) => Some(e),
            SyncError::Connection(_) => None,
            SyncError::Store(e) => Some(e),
            SyncError::Join { source, .. } => Some(source),
            SyncError::Resolution(e) => Some(e),
            SyncError::Coercion { source, .. } => Some(source),
            SyncError::Persistence(e) => Some(e),
            SyncError::Unit { source, .. } => Some(source.as_ref()),
        }
    }
}

impl From<ConfigurationError> for SyncError {
    fn from(e: ConfigurationError) -> Self {
        SyncError::Configuration(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

impl From<ResolutionError> for SyncError {
    fn from(e: ResolutionError) -> Self {
        SyncError::Resolution(e)
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Persistence(e)
    }
}
