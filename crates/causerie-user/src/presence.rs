//! Online/offline presence.
//!
//! Presence must not rely on the client executing a clean shutdown path:
//! processes get killed without notice.  The authority is a server-side
//! disconnect hook registered with the store: when the connection drops
//! ungracefully, the store itself flips `isOnline` and stamps `lastSeen`.
//! The explicit offline write in [`UserDirectory::destroy`] is a courtesy.

use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{debug, warn};

use causerie_shared::{CoreResult, UserId};
use causerie_store::document::server_timestamp;
use causerie_store::schema::{collections, fields};
use causerie_store::{DocumentStore, Fields};

use crate::directory::UserDirectory;

impl UserDirectory {
    /// Register the disconnect hook.  Idempotent; runs once per process
    /// lifetime.
    pub async fn initialize(&self, user: &UserId) -> CoreResult<()> {
        if self
            .disconnect_hook_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let mut on_disconnect = Fields::new();
        on_disconnect.insert(fields::IS_ONLINE.to_string(), json!(false));
        on_disconnect.insert(fields::LAST_SEEN.to_string(), server_timestamp());

        if let Err(err) = self
            .store()
            .install_disconnect_hook(collections::USERS, user.as_str(), on_disconnect)
            .await
        {
            // Allow a later attempt to try again.
            self.disconnect_hook_installed.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        debug!(user = %user, "disconnect hook installed");
        Ok(())
    }

    /// Mark the user online, registering the disconnect hook first so an
    /// ungraceful exit still flips the flag back.
    pub async fn set_online(&self, user: &UserId) -> CoreResult<()> {
        self.initialize(user).await?;

        let mut presence = Fields::new();
        presence.insert(fields::IS_ONLINE.to_string(), json!(true));
        self.store()
            .update(collections::USERS, user.as_str(), presence)
            .await?;
        self.cache_invalidate(user);
        debug!(user = %user, "presence: online");
        Ok(())
    }

    /// Best-effort graceful shutdown: mark offline, stamp `lastSeen`, and
    /// deregister the hook.  Failures are logged and swallowed; the
    /// disconnect hook remains the authority.
    pub async fn destroy(&self, user: &UserId) {
        let mut presence = Fields::new();
        presence.insert(fields::IS_ONLINE.to_string(), json!(false));
        presence.insert(fields::LAST_SEEN.to_string(), server_timestamp());

        if let Err(err) = self
            .store()
            .update(collections::USERS, user.as_str(), presence)
            .await
        {
            warn!(user = %user, error = %err, "offline mark failed on shutdown");
        }
        if let Err(err) = self
            .store()
            .clear_disconnect_hook(collections::USERS, user.as_str())
            .await
        {
            warn!(user = %user, error = %err, "disconnect hook removal failed");
        }
        self.disconnect_hook_installed.store(false, Ordering::SeqCst);
        self.cache_invalidate(user);
        debug!(user = %user, "presence: offline");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use causerie_shared::AuthIdentity;
    use causerie_store::{DocumentStore, MemoryStore, MemoryUploader, WatchRegistry};

    use super::*;

    async fn harness() -> (Arc<MemoryStore>, UserDirectory, UserId) {
        let store = Arc::new(MemoryStore::new());
        let watches = Arc::new(WatchRegistry::new(store.clone()));
        let directory =
            UserDirectory::new(store.clone(), Arc::new(MemoryUploader::new()), watches);
        let identity = AuthIdentity {
            uid: UserId::new("u1"),
            email: None,
            display_name: Some("Alex".to_string()),
            photo_url: None,
        };
        directory.sign_in(&identity).await.unwrap();
        (store, directory, UserId::new("u1"))
    }

    async fn is_online(store: &MemoryStore, uid: &UserId) -> bool {
        store
            .get(collections::USERS, uid.as_str())
            .await
            .unwrap()
            .unwrap()
            .bool_field(fields::IS_ONLINE)
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn ungraceful_disconnect_flips_presence() {
        let (store, directory, uid) = harness().await;
        directory.set_online(&uid).await.unwrap();
        assert!(is_online(&store, &uid).await);

        // Process killed without notice: only the hook runs.
        store.simulate_disconnect();
        assert!(!is_online(&store, &uid).await);
        let doc = store
            .get(collections::USERS, uid.as_str())
            .await
            .unwrap()
            .unwrap();
        assert!(doc.i64_field(fields::LAST_SEEN).is_some());
    }

    #[tokio::test]
    async fn destroy_is_graceful_and_removes_hook() {
        let (store, directory, uid) = harness().await;
        directory.set_online(&uid).await.unwrap();
        directory.destroy(&uid).await;
        assert!(!is_online(&store, &uid).await);

        // Hook deregistered: going online again without it and firing a
        // disconnect must not touch the record.
        let mut presence = Fields::new();
        presence.insert(fields::IS_ONLINE.to_string(), json!(true));
        store
            .update(collections::USERS, uid.as_str(), presence)
            .await
            .unwrap();
        store.simulate_disconnect();
        assert!(is_online(&store, &uid).await);
    }

    #[tokio::test]
    async fn set_online_twice_is_idempotent() {
        let (store, directory, uid) = harness().await;
        directory.set_online(&uid).await.unwrap();
        directory.set_online(&uid).await.unwrap();
        store.simulate_disconnect();
        assert!(!is_online(&store, &uid).await);
    }
}
