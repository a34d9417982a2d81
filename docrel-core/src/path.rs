//! Field path resolution against documents and alias contexts.
//!
//! Missing paths are never an error: absence and JSON `null` both resolve
//! to `None`.

use serde_json::Value;

use crate::document::{AliasContext, Document, ID_FIELD, KEY_FIELD, REV_FIELD};

/// Resolves a dotted path (`a.b.c`) inside a document.
///
/// The reserved metadata names resolve directly to their metadata value.
pub fn resolve_document_field<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    if path.trim().is_empty() {
        return None;
    }
    match path {
        KEY_FIELD | ID_FIELD | REV_FIELD => non_null(document.metadata_value(path)),
        _ => resolve_in_value(document.as_value(), path),
    }
}

/// Resolves an alias-qualified path (`alias` or `alias.a.b`) against a context.
///
/// A bare alias resolves to the whole aliased document.
pub fn resolve_alias_path<'a>(context: &'a AliasContext, path: &str) -> Option<&'a Value> {
    if path.trim().is_empty() {
        return None;
    }
    let (alias, remainder) = split_alias(path);
    let document = context.get(alias)?;
    match remainder {
        None => Some(document.as_value()),
        Some(rest) => resolve_document_field(document, rest),
    }
}

/// Splits a path into its alias and optional remainder at the first `.`.
pub fn split_alias(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((alias, rest)) => (alias, Some(rest)),
        None => (path, None),
    }
}

fn resolve_in_value<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    non_null(Some(current))
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
