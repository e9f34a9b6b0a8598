use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Opaque identity yielded by the external authentication provider.
///
/// Covers basic, federated and anonymous sign-in alike; the core never sees
/// credential material, only this value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthIdentity {
    /// Stable provider-assigned user id; becomes the `users/{id}` document id.
    pub uid: UserId,
    /// Verified e-mail address, when the provider supplies one.
    pub email: Option<String>,
    /// Provider display name (e.g. from a federated account).
    pub display_name: Option<String>,
    /// Provider avatar URL.
    pub photo_url: Option<String>,
}

impl AuthIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: UserId::new(uid),
            email: None,
            display_name: None,
            photo_url: None,
        }
    }
}
