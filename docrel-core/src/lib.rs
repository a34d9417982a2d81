//! docrel core library
//!
//! Shared types and pure logic for moving documents into relational tables:
//! the document model, the sync specification, field path resolution,
//! dependency ordering and value coercion.

pub mod coerce;
pub mod document;
pub mod error;
pub mod mapping;
pub mod order;
pub mod path;

pub use coerce::{coerce_to_column, normalize, to_sql_value, ColumnKind, SqlValue};
pub use document::{handle_collection, AliasContext, Document, MAIN_ALIAS};
pub use error::{CoercionError, ConfigurationError, DocumentError};
pub use mapping::{
    CollectionKind, CollectionMapping, CollectionRequirement, Direction, EdgeStep, JoinSpec,
    JoinStrategy, MergeMapping, SourceConfig, SyncSpec, TargetConfig,
};
pub use order::{order_units, DependencyUnit};
pub use path::{resolve_alias_path, resolve_document_field};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
