//! Remote store adapter contract.
//!
//! A remote document database exposing CRUD plus continuous per-query
//! listeners.  The real adapter lives outside this repository; the core only
//! consumes this trait.  [`crate::MemoryStore`] implements it for tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::document::{Document, Fields};
use crate::error::StoreResult;
use crate::query::Query;
use crate::StoreError;

/// One emission of a continuous query listener.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// Full result snapshot after a change (also emitted once on attach).
    Snapshot(Vec<Document>),
    /// The listener failed and will emit nothing further.
    Terminated(StoreError),
}

/// Deregisters a store listener when dropped.
pub struct ListenerGuard {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn noop() -> Self {
        Self { detach: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").finish_non_exhaustive()
    }
}

/// Receiving side of one continuous query.  Dropping it deregisters the
/// listener promptly.
#[derive(Debug)]
pub struct QueryListener {
    rx: mpsc::UnboundedReceiver<QueryEvent>,
    _guard: ListenerGuard,
}

impl QueryListener {
    pub fn new(rx: mpsc::UnboundedReceiver<QueryEvent>, guard: ListenerGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// Next event, or `None` once the store dropped its sending side.
    pub async fn next(&mut self) -> Option<QueryEvent> {
        self.rx.recv().await
    }
}

/// Contract of the remote real-time document store.
///
/// All fields are loosely typed key/value; the core is responsible for its
/// own schema discipline.  Writes containing the
/// [`crate::document::SERVER_TIMESTAMP`] sentinel get the store's clock
/// substituted at apply time.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Create a document with a store-assigned id; returns the id.
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String>;

    /// Create a document under a caller-chosen id.  Fails with
    /// [`StoreError::AlreadyExists`] if the id is taken, the primitive the
    /// nickname reservation builds on.
    async fn create_with_id(&self, collection: &str, id: &str, fields: Fields)
        -> StoreResult<()>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Merge fields into an existing document.  Keys may be dot paths
    /// (`"typingStatus.u1"`) addressing entries of nested maps.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Part of the adapter contract; unused by this core.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// One-shot query evaluation.
    async fn fetch(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Attach a continuous listener.  The initial snapshot is delivered as
    /// the first event.
    async fn watch(&self, query: Query) -> StoreResult<QueryListener>;

    /// Register fields the store applies server-side if this client's
    /// connection drops ungracefully.  Fires once, then clears itself.
    async fn install_disconnect_hook(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> StoreResult<()>;

    /// Remove a previously installed disconnect hook (graceful shutdown).
    async fn clear_disconnect_hook(&self, collection: &str, id: &str) -> StoreResult<()>;
}
