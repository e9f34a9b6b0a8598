//! Live query subscriptions.
//!
//! A [`SharedQuery`] owns at most one store listener per distinct query and
//! fans its snapshots out to any number of subscribers, each with independent
//! cancellation.  The store listener is attached when the first subscriber
//! arrives and torn down when the last one drops.  A failed listener reports
//! [`Outcome::Failed`] once to every subscriber and terminates; the next
//! subscription re-attaches from scratch.
//!
//! Must be used from within a tokio runtime: every live result is one spawned
//! pump task feeding an mpsc channel.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use causerie_shared::{CoreError, Outcome};

use crate::document::Document;
use crate::query::Query;
use crate::store::{DocumentStore, ListenerGuard, QueryEvent};

// ---------------------------------------------------------------------------
// Streamed<T>
// ---------------------------------------------------------------------------

/// Receiving side of a live result.  Dropping it cancels the subscription
/// promptly without affecting other subscribers.
#[derive(Debug)]
pub struct Streamed<T> {
    rx: mpsc::UnboundedReceiver<Outcome<T>>,
    _guard: Option<ListenerGuard>,
}

impl<T> Streamed<T> {
    /// Producer/consumer pair for engine-built streams.
    pub fn channel() -> (StreamSender<T>, Streamed<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            StreamSender { tx },
            Streamed {
                rx,
                _guard: None,
            },
        )
    }

    pub(crate) fn with_guard(rx: mpsc::UnboundedReceiver<Outcome<T>>, guard: ListenerGuard) -> Self {
        Self {
            rx,
            _guard: Some(guard),
        }
    }

    /// Next emission, or `None` once the stream is over.
    pub async fn next(&mut self) -> Option<Outcome<T>> {
        self.rx.recv().await
    }

    /// Skip `Loading` states and return the next snapshot; a failed or
    /// closed stream becomes an error.
    pub async fn next_ready(&mut self) -> Result<T, CoreError> {
        loop {
            match self.next().await {
                Some(Outcome::Loading) => continue,
                Some(Outcome::Ready(value)) => return Ok(value),
                Some(Outcome::Failed(err)) => return Err(err),
                None => return Err(CoreError::Unavailable("stream closed".to_string())),
            }
        }
    }
}

impl<T> futures::Stream for Streamed<T> {
    type Item = Outcome<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Sending side of an engine-built stream.
#[derive(Debug)]
pub struct StreamSender<T> {
    tx: mpsc::UnboundedSender<Outcome<T>>,
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamSender<T> {
    /// Returns `false` once the subscriber has dropped its stream.
    pub fn send(&self, item: Outcome<T>) -> bool {
        self.tx.send(item).is_ok()
    }

    /// Resolves when the subscriber drops its stream.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Pump a document stream through a fallible mapping into a typed stream.
///
/// The mapping task exits as soon as the subscriber drops the returned
/// stream, which in turn releases the upstream subscription.
pub fn map_stream<T, F>(mut source: Streamed<Vec<Document>>, map: F) -> Streamed<T>
where
    T: Send + 'static,
    F: Fn(Vec<Document>) -> Result<T, CoreError> + Send + 'static,
{
    let (tx, out) = Streamed::channel();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                item = source.next() => match item {
                    None => break,
                    Some(outcome) => {
                        let mapped = outcome.and_then(&map);
                        let failed = matches!(mapped, Outcome::Failed(_));
                        if !tx.send(mapped) || failed {
                            break;
                        }
                    }
                },
            }
        }
    });
    out
}

// ---------------------------------------------------------------------------
// SharedQuery
// ---------------------------------------------------------------------------

struct SharedState {
    subscribers: HashMap<u64, mpsc::UnboundedSender<Outcome<Vec<Document>>>>,
    next_subscriber: u64,
    pump: Option<JoinHandle<()>>,
    last: Option<Vec<Document>>,
}

struct SharedInner {
    store: Arc<dyn DocumentStore>,
    query: Query,
    state: Mutex<SharedState>,
}

/// One store listener shared by every subscriber to an identical query.
pub struct SharedQuery {
    inner: Arc<SharedInner>,
}

impl SharedQuery {
    pub fn new(store: Arc<dyn DocumentStore>, query: Query) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                store,
                query,
                state: Mutex::new(SharedState {
                    subscribers: HashMap::new(),
                    next_subscriber: 0,
                    pump: None,
                    last: None,
                }),
            }),
        }
    }

    /// Attach a subscriber.  Emits `Loading` immediately, plus the cached
    /// snapshot when the shared listener is already live.
    pub fn subscribe(&self) -> Streamed<Vec<Document>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Outcome::Loading);

        let id = {
            let mut state = self.inner.state.lock().expect("shared query lock poisoned");
            if let Some(last) = &state.last {
                let _ = tx.send(Outcome::Ready(last.clone()));
            }
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.insert(id, tx);
            if state.pump.is_none() {
                debug!(query = %self.inner.query.key(), "attaching store listener");
                state.pump = Some(tokio::spawn(pump(self.inner.clone())));
            }
            id
        };

        let weak: Weak<SharedInner> = Arc::downgrade(&self.inner);
        let guard = ListenerGuard::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut state) = inner.state.lock() {
                    state.subscribers.remove(&id);
                    if state.subscribers.is_empty() {
                        if let Some(pump) = state.pump.take() {
                            pump.abort();
                        }
                        state.last = None;
                        debug!(query = %inner.query.key(), "last subscriber gone, listener detached");
                    }
                }
            }
        });

        Streamed::with_guard(rx, guard)
    }
}

async fn pump(inner: Arc<SharedInner>) {
    let mut listener = match inner.store.watch(inner.query.clone()).await {
        Ok(listener) => listener,
        Err(err) => {
            broadcast_failure(&inner, err.into());
            return;
        }
    };

    loop {
        match listener.next().await {
            Some(QueryEvent::Snapshot(docs)) => {
                let mut state = inner.state.lock().expect("shared query lock poisoned");
                state.last = Some(docs.clone());
                state
                    .subscribers
                    .retain(|_, tx| tx.send(Outcome::Ready(docs.clone())).is_ok());
                if state.subscribers.is_empty() {
                    state.pump = None;
                    state.last = None;
                    return;
                }
            }
            Some(QueryEvent::Terminated(err)) => {
                broadcast_failure(&inner, err.into());
                return;
            }
            None => {
                broadcast_failure(
                    &inner,
                    CoreError::Unavailable("listener closed".to_string()),
                );
                return;
            }
        }
    }
}

/// Report the failure once to every subscriber, then reset so the next
/// subscription re-attaches.
fn broadcast_failure(inner: &SharedInner, err: CoreError) {
    let mut state = inner.state.lock().expect("shared query lock poisoned");
    for (_, tx) in state.subscribers.drain() {
        let _ = tx.send(Outcome::Failed(err.clone()));
    }
    state.pump = None;
    state.last = None;
}

// ---------------------------------------------------------------------------
// WatchRegistry
// ---------------------------------------------------------------------------

/// Deduplicates [`SharedQuery`] instances by query identity so equal queries
/// issued from different call sites share one store listener.
pub struct WatchRegistry {
    store: Arc<dyn DocumentStore>,
    queries: Mutex<HashMap<String, SharedQuery>>,
}

impl WatchRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            queries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn subscribe(&self, query: Query) -> Streamed<Vec<Document>> {
        let mut queries = self.queries.lock().expect("watch registry lock poisoned");
        let shared = queries
            .entry(query.key())
            .or_insert_with(|| SharedQuery::new(self.store.clone(), query));
        shared.subscribe()
    }
}
