//! Join resolution for merge mappings.
//!
//! Joins run in declaration order against a context seeded with the main
//! document, so later joins may read fields of earlier ones. A join that
//! finds nothing either drops the whole document (required) or leaves its
//! alias unbound (optional).

use docrel_core::{
    handle_collection, resolve_alias_path, AliasContext, Document, EdgeStep, JoinSpec,
    JoinStrategy,
};
use serde_json::Value;

use super::error::{ResolutionError, SyncError};
use crate::store::{DocumentStore, StoreError};

/// Result of resolving every join of a merge for one main document.
#[derive(Debug)]
pub enum JoinOutcome {
    Resolved(AliasContext),
    /// A required join found nothing; the document produces no row.
    Skipped { alias: String },
}

/// Resolves `joins` for `main`.
pub async fn resolve_joins<S>(
    store: &S,
    joins: &[JoinSpec],
    main: Document,
) -> Result<JoinOutcome, SyncError>
where
    S: DocumentStore + ?Sized,
{
    let mut context = AliasContext::new(main);

    for join in joins {
        let found = match &join.strategy {
            JoinStrategy::Lookup {
                collection,
                local_field,
                foreign_field,
            } => lookup(store, &context, collection, local_field, foreign_field).await,
            JoinStrategy::EdgeChain { steps, collection } => {
                match follow_chain(store, context.main(), steps).await {
                    Ok(found) => check_collection(&join.alias, found, collection.as_deref()),
                    Err(e) => Err(e),
                }
            }
        }
        .map_err(|source| match source {
            JoinFailure::Store(source) => SyncError::Join {
                alias: join.alias.clone(),
                source,
            },
            JoinFailure::Resolution(e) => SyncError::Resolution(e),
        })?;

        match found {
            Some(doc) => context.insert(join.alias.clone(), doc),
            None if join.required => {
                return Ok(JoinOutcome::Skipped {
                    alias: join.alias.clone(),
                });
            }
            None => {
                tracing::debug!(alias = %join.alias, "Optional join found nothing");
                context.remove(&join.alias);
            }
        }
    }

    Ok(JoinOutcome::Resolved(context))
}

enum JoinFailure {
    Store(StoreError),
    Resolution(ResolutionError),
}

impl From<StoreError> for JoinFailure {
    fn from(e: StoreError) -> Self {
        JoinFailure::Store(e)
    }
}

async fn lookup<S>(
    store: &S,
    context: &AliasContext,
    collection: &str,
    local_field: &str,
    foreign_field: &str,
) -> Result<Option<Document>, JoinFailure>
where
    S: DocumentStore + ?Sized,
{
    let value: Value = match resolve_alias_path(context, local_field) {
        Some(value) => value.clone(),
        None => return Ok(None),
    };
    Ok(store.find_one(collection, foreign_field, &value).await?)
}

/// Walks `steps` from the main document's handle and fetches the document
/// at the end. Any step without a matching edge ends the walk.
async fn follow_chain<S>(
    store: &S,
    main: &Document,
    steps: &[EdgeStep],
) -> Result<Option<Document>, JoinFailure>
where
    S: DocumentStore + ?Sized,
{
    let Some(start) = main.id() else {
        return Ok(None);
    };
    let mut handle = start.to_string();

    for step in steps {
        match store
            .follow_edge(&step.collection, step.direction, &handle)
            .await?
        {
            Some(next) => handle = next,
            None => return Ok(None),
        }
    }

    Ok(store.fetch(&handle).await?)
}

fn check_collection(
    alias: &str,
    found: Option<Document>,
    expected: Option<&str>,
) -> Result<Option<Document>, JoinFailure> {
    if let (Some(doc), Some(expected)) = (found.as_ref(), expected) {
        let handle = doc.id().unwrap_or_default();
        if handle_collection(handle) != Some(expected) {
            return Err(JoinFailure::Resolution(
                ResolutionError::CollectionMismatch {
                    alias: alias.to_string(),
                    expected: expected.to_string(),
                    handle: handle.to_string(),
                },
            ));
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use docrel_core::{resolve_alias_path, Direction};
    use serde_json::json;

    fn lookup_join(alias: &str, required: bool, local_field: &str) -> JoinSpec {
        JoinSpec {
            alias: alias.to_string(),
            required,
            strategy: JoinStrategy::Lookup {
                collection: "users".to_string(),
                local_field: local_field.to_string(),
                foreign_field: "_key".to_string(),
            },
        }
    }

    fn chain_join(directions: &[Direction], collection: Option<&str>) -> JoinSpec {
        JoinSpec {
            alias: "project".to_string(),
            required: true,
            strategy: JoinStrategy::EdgeChain {
                steps: directions
                    .iter()
                    .enumerate()
                    .map(|(i, direction)| EdgeStep {
                        collection: format!("hop{}", i + 1),
                        direction: *direction,
                    })
                    .collect(),
                collection: collection.map(str::to_string),
            },
        }
    }

    fn resolved(outcome: JoinOutcome) -> AliasContext {
        match outcome {
            JoinOutcome::Resolved(context) => context,
            JoinOutcome::Skipped { alias } => panic!("unexpected skip on {}", alias),
        }
    }

    #[tokio::test]
    async fn test_lookup_binds_alias() {
        let store = MemoryStore::new();
        store.insert("users", "u1", json!({ "name": "Ada" }));
        let task = store.insert("tasks", "t1", json!({ "owner": "u1" }));

        let context = resolved(
            resolve_joins(&store, &[lookup_join("owner", true, "main.owner")], task)
                .await
                .unwrap(),
        );
        assert_eq!(
            resolve_alias_path(&context, "owner.name"),
            Some(&json!("Ada"))
        );
    }

    #[tokio::test]
    async fn test_later_join_reads_earlier_alias() {
        let store = MemoryStore::new();
        store.insert("users", "u1", json!({ "manager": "u2" }));
        store.insert("users", "u2", json!({ "name": "Grace" }));
        let task = store.insert("tasks", "t1", json!({ "owner": "u1" }));

        let joins = [
            lookup_join("owner", true, "main.owner"),
            lookup_join("manager", true, "owner.manager"),
        ];
        let context = resolved(resolve_joins(&store, &joins, task).await.unwrap());
        assert_eq!(
            resolve_alias_path(&context, "manager.name"),
            Some(&json!("Grace"))
        );
    }

    #[tokio::test]
    async fn test_required_miss_skips_document() {
        let store = MemoryStore::new();
        let task = store.insert("tasks", "t1", json!({ "owner": "ghost" }));

        let outcome = resolve_joins(&store, &[lookup_join("owner", true, "main.owner")], task)
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Skipped { alias } if alias == "owner"));
    }

    #[tokio::test]
    async fn test_null_local_value_is_not_queried() {
        let store = MemoryStore::new();
        let task = store.insert("tasks", "t1", json!({ "owner": null }));

        let context = resolved(
            resolve_joins(&store, &[lookup_join("owner", false, "main.owner")], task)
                .await
                .unwrap(),
        );
        assert!(!context.contains("owner"));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_edge_chain_forward_then_reverse() {
        let store = MemoryStore::new();
        let task = store.insert("tasks", "t0", json!({}));
        store.insert("milestones", "m1", json!({}));
        store.insert("projects", "p2", json!({ "name": "Apollo" }));
        store.insert_edge("hop1", "e1", "tasks/t0", "milestones/m1");
        store.insert_edge("hop2", "e2", "projects/p2", "milestones/m1");

        let joins = [chain_join(&[Direction::Forward, Direction::Reverse], Some("projects"))];
        let context = resolved(resolve_joins(&store, &joins, task).await.unwrap());
        assert_eq!(
            resolve_alias_path(&context, "project.name"),
            Some(&json!("Apollo"))
        );
        assert_eq!(
            store.calls(),
            vec![
                "follow_edge hop1 forward tasks/t0",
                "follow_edge hop2 reverse milestones/m1",
                "fetch projects/p2",
            ]
        );
    }

    #[tokio::test]
    async fn test_edge_chain_stops_at_first_missing_step() {
        let store = MemoryStore::new();
        let task = store.insert("tasks", "t0", json!({}));
        store.insert_edge("hop2", "e2", "projects/p2", "milestones/m1");

        let joins = [chain_join(&[Direction::Forward, Direction::Reverse], None)];
        let outcome = resolve_joins(&store, &joins, task).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Skipped { .. }));
        assert_eq!(store.calls(), vec!["follow_edge hop1 forward tasks/t0"]);
    }

    #[tokio::test]
    async fn test_edge_chain_collection_mismatch_is_an_error() {
        let store = MemoryStore::new();
        let task = store.insert("tasks", "t0", json!({}));
        store.insert("milestones", "m1", json!({}));
        store.insert_edge("hop1", "e1", "tasks/t0", "milestones/m1");

        let joins = [chain_join(&[Direction::Forward], Some("projects"))];
        let err = resolve_joins(&store, &joins, task).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Resolution(ResolutionError::CollectionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_dangling_edge_resolves_to_not_found() {
        let store = MemoryStore::new();
        let task = store.insert("tasks", "t0", json!({}));
        store.insert_edge("hop1", "e1", "tasks/t0", "projects/gone");

        let mut join = chain_join(&[Direction::Forward], Some("projects"));
        join.required = false;
        let context = resolved(resolve_joins(&store, &[join], task).await.unwrap());
        assert!(!context.contains("project"));
    }
}
