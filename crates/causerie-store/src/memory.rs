//! In-memory [`DocumentStore`] used by every test in the workspace.
//!
//! Behaves like the remote store the core is written against: per-write
//! server timestamps from a strictly monotonic clock, last-write-wins field
//! merges, continuous listeners re-evaluated on every mutation of their
//! collection, and one-shot disconnect hooks.  Failure injection
//! ([`MemoryStore::set_unavailable`], [`MemoryStore::sever_listeners`])
//! exercises the error paths.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::document::{set_path, Document, Fields, SERVER_TIMESTAMP};
use crate::error::{StoreError, StoreResult};
use crate::query::Query;
use crate::store::{DocumentStore, ListenerGuard, QueryEvent, QueryListener};

struct Listener {
    id: u64,
    query: Query,
    tx: mpsc::UnboundedSender<QueryEvent>,
}

struct DisconnectHook {
    collection: String,
    doc_id: String,
    fields: Fields,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
    listeners: Vec<Listener>,
    hooks: Vec<DisconnectHook>,
    next_listener_id: u64,
    last_timestamp: i64,
    unavailable: bool,
}

impl Inner {
    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let ts = now.max(self.last_timestamp + 1);
        self.last_timestamp = ts;
        ts
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let docs = self
            .collections
            .get(&query.collection)
            .map(|coll| {
                coll.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        query.apply(docs)
    }

    fn notify(&mut self, collection: &str) {
        let snapshots: Vec<(usize, Vec<Document>)> = self
            .listeners
            .iter()
            .enumerate()
            .filter(|(_, l)| l.query.collection == collection)
            .map(|(idx, l)| (idx, self.snapshot(&l.query)))
            .collect();

        let mut closed: Vec<u64> = Vec::new();
        for (idx, snapshot) in snapshots {
            let listener = &self.listeners[idx];
            if listener.tx.send(QueryEvent::Snapshot(snapshot)).is_err() {
                closed.push(listener.id);
            }
        }
        self.listeners.retain(|l| !closed.contains(&l.id));
    }
}

/// Substitute the server-timestamp sentinel, including inside nested maps.
fn resolve_server_timestamps(value: &mut Value, ts: i64) {
    match value {
        Value::String(s) if s == SERVER_TIMESTAMP => *value = Value::from(ts),
        Value::Object(map) => {
            for nested in map.values_mut() {
                resolve_server_timestamps(nested, ts);
            }
        }
        Value::Array(list) => {
            for nested in list.iter_mut() {
                resolve_server_timestamps(nested, ts);
            }
        }
        _ => {}
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    fn check_available(inner: &Inner) -> StoreResult<()> {
        if inner.unavailable {
            Err(StoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Terminate all attached listeners with an error, as a dropped
    /// connection would.
    pub fn sever_listeners(&self) {
        let mut inner = self.lock();
        for listener in inner.listeners.drain(..) {
            let _ = listener.tx.send(QueryEvent::Terminated(StoreError::Unavailable(
                "connection severed".to_string(),
            )));
        }
    }

    /// Apply and clear all registered disconnect hooks, as the store would
    /// after an ungraceful client disconnect.
    pub fn simulate_disconnect(&self) {
        let mut inner = self.lock();
        let hooks: Vec<DisconnectHook> = inner.hooks.drain(..).collect();
        for hook in hooks {
            let ts = inner.next_timestamp();
            if let Some(doc) = inner
                .collections
                .get_mut(&hook.collection)
                .and_then(|coll| coll.get_mut(&hook.doc_id))
            {
                for (path, mut value) in hook.fields {
                    resolve_server_timestamps(&mut value, ts);
                    set_path(doc, &path, value);
                }
            }
            inner.notify(&hook.collection);
        }
    }

    /// Number of attached listeners (diagnostics for leak tests).
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.create_with_id(collection, &id, fields).await?;
        Ok(id)
    }

    async fn create_with_id(
        &self,
        collection: &str,
        id: &str,
        mut fields: Fields,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;

        let coll = inner.collections.entry(collection.to_string()).or_default();
        if coll.contains_key(id) {
            return Err(StoreError::AlreadyExists);
        }

        let ts = inner.next_timestamp();
        for value in fields.values_mut() {
            resolve_server_timestamps(value, ts);
        }
        inner
            .collections
            .get_mut(collection)
            .expect("collection ensured above")
            .insert(id.to_string(), fields);

        debug!(collection, id, "document created");
        inner.notify(collection);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;

        let ts = inner.next_timestamp();
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|coll| coll.get_mut(id))
            .ok_or(StoreError::NotFound)?;

        for (path, mut value) in fields {
            resolve_server_timestamps(&mut value, ts);
            set_path(doc, &path, value);
        }

        debug!(collection, id, "document updated");
        inner.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        if let Some(coll) = inner.collections.get_mut(collection) {
            coll.remove(id);
        }
        inner.notify(collection);
        Ok(())
    }

    async fn fetch(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.snapshot(query))
    }

    async fn watch(&self, query: Query) -> StoreResult<QueryListener> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;

        // Initial snapshot is delivered as the first event.
        let _ = tx.send(QueryEvent::Snapshot(inner.snapshot(&query)));
        inner.listeners.push(Listener { id, query, tx });

        let weak = Arc::downgrade(&self.inner);
        let guard = ListenerGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.lock() {
                    inner.listeners.retain(|l| l.id != id);
                }
            }
        });
        Ok(QueryListener::new(rx, guard))
    }

    async fn install_disconnect_hook(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        inner
            .hooks
            .retain(|h| !(h.collection == collection && h.doc_id == id));
        inner.hooks.push(DisconnectHook {
            collection: collection.to_string(),
            doc_id: id.to_string(),
            fields,
        });
        Ok(())
    }

    async fn clear_disconnect_hook(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        inner
            .hooks
            .retain(|h| !(h.collection == collection && h.doc_id == id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::server_timestamp;
    use serde_json::json;

    fn fields(entries: &[(&str, Value)]) -> Fields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_get_round_trip() {
        let store = MemoryStore::new();
        let id = store
            .create("users", fields(&[("nickname", json!("alex"))]))
            .await
            .unwrap();

        let doc = store.get("users", &id).await.unwrap().unwrap();
        assert_eq!(doc.str_field("nickname"), Some("alex"));
        assert!(store.get("users", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_with_id_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .create_with_id("nicknames", "alex", fields(&[("uid", json!("u1"))]))
            .await
            .unwrap();

        let err = store
            .create_with_id("nicknames", "alex", fields(&[("uid", json!("u2"))]))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists);

        // The original reservation is untouched.
        let doc = store.get("nicknames", "alex").await.unwrap().unwrap();
        assert_eq!(doc.str_field("uid"), Some("u1"));
    }

    #[tokio::test]
    async fn server_timestamps_are_strictly_monotonic() {
        let store = MemoryStore::new();
        let a = store
            .create("messages", fields(&[("timestamp", server_timestamp())]))
            .await
            .unwrap();
        let b = store
            .create("messages", fields(&[("timestamp", server_timestamp())]))
            .await
            .unwrap();

        let ts_a = store
            .get("messages", &a)
            .await
            .unwrap()
            .unwrap()
            .i64_field("timestamp")
            .unwrap();
        let ts_b = store
            .get("messages", &b)
            .await
            .unwrap()
            .unwrap()
            .i64_field("timestamp")
            .unwrap();
        assert!(ts_b > ts_a);
    }

    #[tokio::test]
    async fn update_merges_and_honors_dot_paths() {
        let store = MemoryStore::new();
        let id = store
            .create(
                "chats",
                fields(&[("lastMessage", json!("")), ("typingStatus", json!({}))]),
            )
            .await
            .unwrap();

        store
            .update("chats", &id, fields(&[("typingStatus.u1", json!(true))]))
            .await
            .unwrap();
        store
            .update("chats", &id, fields(&[("typingStatus.u2", json!(true))]))
            .await
            .unwrap();

        let doc = store.get("chats", &id).await.unwrap().unwrap();
        let typing = doc.map_field("typingStatus").unwrap();
        assert_eq!(typing.get("u1"), Some(&json!(true)));
        assert_eq!(typing.get("u2"), Some(&json!(true)));
        assert_eq!(doc.str_field("lastMessage"), Some(""));

        let err = store
            .update("chats", "missing", fields(&[("lastMessage", json!("x"))]))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn watch_emits_initial_and_change_snapshots() {
        let store = MemoryStore::new();
        let mut listener = store
            .watch(Query::collection("users"))
            .await
            .unwrap();

        match listener.next().await.unwrap() {
            QueryEvent::Snapshot(docs) => assert!(docs.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }

        store
            .create("users", fields(&[("nickname", json!("alex"))]))
            .await
            .unwrap();
        match listener.next().await.unwrap() {
            QueryEvent::Snapshot(docs) => assert_eq!(docs.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_listener_deregisters_it() {
        let store = MemoryStore::new();
        let listener = store.watch(Query::collection("users")).await.unwrap();
        assert_eq!(store.listener_count(), 1);
        drop(listener);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_hook_fires_once() {
        let store = MemoryStore::new();
        store
            .create_with_id(
                "users",
                "u1",
                fields(&[("isOnline", json!(true))]),
            )
            .await
            .unwrap();
        store
            .install_disconnect_hook(
                "users",
                "u1",
                fields(&[("isOnline", json!(false)), ("lastSeen", server_timestamp())]),
            )
            .await
            .unwrap();

        store.simulate_disconnect();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.bool_field("isOnline"), Some(false));
        assert!(doc.i64_field("lastSeen").is_some());

        // A second disconnect is a no-op; the hook cleared itself.
        store
            .update("users", "u1", fields(&[("isOnline", json!(true))]))
            .await
            .unwrap();
        store.simulate_disconnect();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.bool_field("isOnline"), Some(true));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.create("users", Fields::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.fetch(&Query::collection("users")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.watch(Query::collection("users")).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
