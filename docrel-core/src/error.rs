//! Error types shared by the core components.

use thiserror::Error;

/// A structurally invalid sync specification.
///
/// Raised while loading or validating the configuration, before any store
/// connection is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Cyclic dependency detected among tables: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("Table '{table}' declares unknown dependency '{dependency}'")]
    UnknownDependency { table: String, dependency: String },

    #[error("Table '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("{context}: invalid path '{path}'")]
    InvalidPath { context: String, path: String },

    #[error("{context}: invalid identifier '{name}'")]
    InvalidIdentifier { context: String, name: String },

    #[error("{context}: missing required field '{field}'")]
    MissingField { context: String, field: &'static str },

    #[error("{0}")]
    Invalid(String),
}

/// A source value that cannot be converted to its destination column type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    #[error("Failed to convert value '{value}' to {target}")]
    Unparsable { value: String, target: &'static str },

    #[error("Unsupported value type {kind} for {target} column")]
    UnsupportedValue {
        kind: &'static str,
        target: &'static str,
    },

    #[error("Failed to serialise structured value: {0}")]
    Serialization(String),
}

/// Errors building a [`Document`](crate::Document) from raw JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}
