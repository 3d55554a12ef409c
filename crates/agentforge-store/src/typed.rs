// SPDX-License-Identifier: Apache-2.0
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::document::{DocumentKind, CURRENT_SCHEMA_VERSION};
use crate::error::{PatchAbort, StoreError};
use crate::memory::{ListFilter, Store};

/// Serializes `value` and writes it through `store`. Thin wrapper kept
/// separate from [`Store`] itself so the trait stays object-safe for
/// `Arc<dyn Store>` to cross the orchestrator/gateway boundary.
pub async fn put<T: Serialize + Send + Sync>(
    store: &dyn Store,
    kind: DocumentKind,
    id: &str,
    partition: &str,
    value: &T,
) -> Result<(), StoreError> {
    let data = serde_json::to_value(value)
        .map_err(|e| StoreError::Fatal(format!("serialize {kind:?}/{id}: {e}")))?;
    store.put(kind, id, partition, CURRENT_SCHEMA_VERSION, data).await
}

/// Reads and deserializes a document, or `Ok(None)` if absent.
pub async fn get<T: DeserializeOwned>(
    store: &dyn Store,
    kind: DocumentKind,
    id: &str,
    partition: &str,
) -> Result<Option<T>, StoreError> {
    let Some(doc) = store.get(kind, id, partition).await? else {
        return Ok(None);
    };
    let value = serde_json::from_value(doc.data)
        .map_err(|e| StoreError::Fatal(format!("deserialize {kind:?}/{id}: {e}")))?;
    Ok(Some(value))
}

/// Like [`get`] but returns `StoreError::NotFound` instead of `None` —
/// convenient at call sites where absence is always an error (e.g. loading a
/// plan by id from a command handler).
pub async fn get_required<T: DeserializeOwned>(
    store: &dyn Store,
    kind: DocumentKind,
    id: &str,
    partition: &str,
) -> Result<T, StoreError> {
    get(store, kind, id, partition)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind,
            id: id.to_string(),
            partition: partition.to_string(),
        })
}

/// Lists and deserializes every document of `kind` in `partition`.
pub async fn list<T: DeserializeOwned>(
    store: &dyn Store,
    kind: DocumentKind,
    partition: &str,
    filter: ListFilter,
) -> Result<Vec<T>, StoreError> {
    let docs = store.list(kind, partition, filter).await?;
    docs.into_iter()
        .map(|doc| {
            serde_json::from_value(doc.data)
                .map_err(|e| StoreError::Fatal(format!("deserialize {kind:?}/{}: {e}", doc.id)))
        })
        .collect()
}

/// Optimistic read-modify-write over a typed value. `patch_fn` sees `None`
/// when the document doesn't exist yet (the typed layer does not
/// distinguish "create" from "update" — callers decide what a missing
/// document means).
pub async fn patch<T, F>(
    store: &dyn Store,
    kind: DocumentKind,
    id: &str,
    partition: &str,
    max_attempts: u32,
    patch_fn: F,
) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: Fn(Option<T>) -> Result<T, PatchAbort> + Send + Sync,
{
    let raw_fn = |current: Option<serde_json::Value>| -> Result<serde_json::Value, PatchAbort> {
        let typed_current = match current {
            Some(v) => Some(serde_json::from_value(v).map_err(|e| {
                PatchAbort(format!("corrupt document while patching {kind:?}/{id}: {e}"))
            })?),
            None => None,
        };
        let new_value = patch_fn(typed_current)?;
        serde_json::to_value(new_value)
            .map_err(|e| PatchAbort(format!("serialize patched {kind:?}/{id}: {e}")))
    };
    let result = store
        .patch(kind, id, partition, CURRENT_SCHEMA_VERSION, max_attempts, &raw_fn)
        .await?;
    serde_json::from_value(result)
        .map_err(|e| StoreError::Fatal(format!("deserialize patched {kind:?}/{id}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct Widget {
        count: u32,
    }

    #[tokio::test]
    async fn typed_put_get_round_trips() {
        let store = InMemoryStore::new();
        put(&store, DocumentKind::Plan, "p1", "s1", &Widget { count: 1 })
            .await
            .unwrap();
        let got: Widget = get(&store, DocumentKind::Plan, "p1", "s1").await.unwrap().unwrap();
        assert_eq!(got, Widget { count: 1 });
    }

    #[tokio::test]
    async fn get_required_errors_when_absent() {
        let store = InMemoryStore::new();
        let err = get_required::<Widget>(&store, DocumentKind::Plan, "missing", "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn typed_patch_increments() {
        let store = InMemoryStore::new();
        put(&store, DocumentKind::Plan, "p1", "s1", &Widget { count: 1 })
            .await
            .unwrap();
        let updated: Widget = patch(&store, DocumentKind::Plan, "p1", "s1", 5, |current| {
            let mut w = current.unwrap_or(Widget { count: 0 });
            w.count += 1;
            Ok(w)
        })
        .await
        .unwrap();
        assert_eq!(updated.count, 2);
    }

    #[tokio::test]
    async fn typed_list_round_trips() {
        let store = InMemoryStore::new();
        put(&store, DocumentKind::Step, "a", "s1", &Widget { count: 1 })
            .await
            .unwrap();
        put(&store, DocumentKind::Step, "b", "s1", &Widget { count: 2 })
            .await
            .unwrap();
        let all: Vec<Widget> = list(&store, DocumentKind::Step, "s1", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
