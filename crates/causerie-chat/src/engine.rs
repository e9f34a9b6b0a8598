//! Engine wiring.
//!
//! The [`ChatEngine`] is an explicitly constructed instance owned by the
//! process root; it spawns no pools of its own.  Every live result is one
//! pump task whose lifetime is bound to its subscriber.

use std::sync::Arc;

use causerie_store::{DocumentStore, MediaUploader, WatchRegistry};
use causerie_user::UserDirectory;

pub struct ChatEngine {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) uploader: Arc<dyn MediaUploader>,
    pub(crate) directory: Arc<UserDirectory>,
    pub(crate) watches: Arc<WatchRegistry>,
}

impl ChatEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn MediaUploader>,
        directory: Arc<UserDirectory>,
        watches: Arc<WatchRegistry>,
    ) -> Self {
        Self {
            store,
            uploader,
            directory,
            watches,
        }
    }
}
