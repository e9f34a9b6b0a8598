//! Push-token synchronization.
//!
//! The device token must track `users/{id}.fcmToken`; the notification
//! transport itself is out of scope.

use serde_json::json;
use tracing::debug;

use causerie_shared::{CoreError, CoreResult, UserId};
use causerie_store::schema::{collections, fields};
use causerie_store::{DocumentStore, Fields, User};

use crate::directory::UserDirectory;

impl UserDirectory {
    /// Compare the current device token against the stored one and update
    /// on mismatch.  Returns whether an update was written.
    ///
    /// Bypasses the cache: a stale token means lost notifications.
    pub async fn sync_push_token(&self, user: &UserId, device_token: &str) -> CoreResult<bool> {
        let doc = self
            .store()
            .get(collections::USERS, user.as_str())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {user}")))?;
        let stored = User::from_document(&doc).fcm_token;

        if stored.as_deref() == Some(device_token) {
            return Ok(false);
        }

        let mut update = Fields::new();
        update.insert(fields::FCM_TOKEN.to_string(), json!(device_token));
        self.store()
            .update(collections::USERS, user.as_str(), update)
            .await?;
        self.cache_invalidate(user);
        debug!(user = %user, "push token refreshed");
        Ok(true)
    }
}
