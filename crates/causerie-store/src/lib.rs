//! # causerie-store
//!
//! Data layer of the Causerie messaging core.
//!
//! The remote real-time document database is an external collaborator; this
//! crate owns its contract ([`DocumentStore`]), the loosely-typed document
//! and query values exchanged with it, the ref-counted live-subscription
//! layer, the persisted domain models, and an in-memory implementation used
//! by every test in the workspace.

pub mod document;
pub mod media;
pub mod memory;
pub mod models;
pub mod query;
pub mod schema;
pub mod store;
pub mod watch;

mod error;

pub use document::{Document, Fields};
pub use error::{StoreError, StoreResult};
pub use media::{MediaPayload, MediaUploader, MemoryUploader};
pub use memory::MemoryStore;
pub use models::{Call, Chat, Message, User};
pub use query::{Direction, Filter, Query};
pub use store::{DocumentStore, ListenerGuard, QueryEvent, QueryListener};
pub use watch::{map_stream, SharedQuery, StreamSender, Streamed, WatchRegistry};
