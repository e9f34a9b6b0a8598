//! Profile lifecycle and the nickname registry.
//!
//! Profiles are created in two phases: a minimal record at first
//! authentication ([`UserDirectory::sign_in`]), then completed once
//! nickname, full name and photo are supplied
//! ([`UserDirectory::complete_profile`]).  Nickname uniqueness is enforced
//! by a separate reservation record, never by the user record alone: the
//! reservation is claimed with a create-if-absent write, so two racers that
//! both passed the advisory availability check still resolve to exactly one
//! winner.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use causerie_shared::{constants, AuthIdentity, CoreError, CoreResult, UserId};
use causerie_store::schema::{collections, fields};
use causerie_store::watch::map_stream;
use causerie_store::{
    Direction, DocumentStore, Fields, MediaPayload, MediaUploader, Query, StoreError, Streamed,
    User, WatchRegistry,
};

use crate::cache::ProfileCache;

/// Input of the second profile phase.
#[derive(Debug, Clone)]
pub struct CompleteProfile {
    pub user_id: UserId,
    pub full_name: String,
    pub nickname: String,
    pub bio: Option<String>,
    /// Local photo to compress and upload; the resulting URL lands in the
    /// profile.
    pub photo: Option<MediaPayload>,
    pub fcm_token: Option<String>,
}

/// User & Presence Manager.
///
/// Explicitly constructed and shared by `Arc`; the process root owns its
/// lifecycle.
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn MediaUploader>,
    watches: Arc<WatchRegistry>,
    cache: Mutex<ProfileCache>,
    current: RwLock<Option<UserId>>,
    pub(crate) disconnect_hook_installed: AtomicBool,
}

impl UserDirectory {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn MediaUploader>,
        watches: Arc<WatchRegistry>,
    ) -> Self {
        Self {
            store,
            uploader,
            watches,
            cache: Mutex::new(ProfileCache::new()),
            current: RwLock::new(None),
            disconnect_hook_installed: AtomicBool::new(false),
        }
    }

    /// Test constructor with a short cache TTL.
    pub fn with_cache_ttl(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn MediaUploader>,
        watches: Arc<WatchRegistry>,
        ttl: Duration,
    ) -> Self {
        let directory = Self::new(store, uploader, watches);
        *directory.cache.lock().expect("cache lock poisoned") = ProfileCache::with_ttl(ttl);
        directory
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The authenticated user of this session.
    pub fn current_user_id(&self) -> CoreResult<UserId> {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(CoreError::Unauthenticated)
    }

    fn cache_put(&self, user: &User) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(user.clone());
        }
    }

    pub(crate) fn cache_invalidate(&self, id: &UserId) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate(id);
        }
    }

    /// Phase one of the profile lifecycle: ensure a minimal record exists
    /// for the authenticated identity and make it the session's current
    /// user.  Idempotent on repeat authentication.
    pub async fn sign_in(&self, identity: &AuthIdentity) -> CoreResult<User> {
        let uid = identity.uid.clone();

        let user = match self.store.get(collections::USERS, uid.as_str()).await? {
            Some(doc) => User::from_document(&doc),
            None => {
                let mut record = Fields::new();
                if let Some(email) = &identity.email {
                    record.insert(fields::EMAIL.to_string(), json!(email));
                }
                if let Some(name) = &identity.display_name {
                    record.insert(fields::FULL_NAME.to_string(), json!(name));
                }
                if let Some(photo) = &identity.photo_url {
                    record.insert(fields::PROFILE_IMAGE_URL.to_string(), json!(photo));
                }
                record.insert(fields::PROFILE_COMPLETED.to_string(), json!(false));
                record.insert(fields::IS_ONLINE.to_string(), json!(false));

                match self
                    .store
                    .create_with_id(collections::USERS, uid.as_str(), record)
                    .await
                {
                    Ok(()) => {}
                    // Another session of the same account won the race;
                    // fall through to the read.
                    Err(StoreError::AlreadyExists) => {}
                    Err(err) => return Err(err.into()),
                }
                let doc = self
                    .store
                    .get(collections::USERS, uid.as_str())
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("user {uid}")))?;
                info!(user = %uid, "minimal profile created");
                User::from_document(&doc)
            }
        };

        if let Ok(mut current) = self.current.write() {
            *current = Some(uid);
        }
        self.cache_put(&user);
        Ok(user)
    }

    /// Phase two: reserve the nickname and write the full profile as one
    /// logical unit.
    ///
    /// A reservation already held by the same user is treated as claimed
    /// (the retry path after a failed profile write); one held by anyone
    /// else is a [`CoreError::NicknameTaken`].
    pub async fn complete_profile(&self, request: CompleteProfile) -> CoreResult<User> {
        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(CoreError::Validation("full name must not be empty".into()));
        }
        let nickname = normalize_nickname(&request.nickname)?;
        let uid = request.user_id;

        // The photo upload has no store side effect, so a failure here
        // leaves nothing to reconcile.
        let photo_url = match request.photo {
            Some(payload) => Some(self.uploader.upload(payload).await?),
            None => None,
        };

        let mut reservation = Fields::new();
        reservation.insert(fields::UID.to_string(), json!(uid.as_str()));
        match self
            .store
            .create_with_id(collections::NICKNAMES, &nickname, reservation)
            .await
        {
            Ok(()) => debug!(user = %uid, nickname = %nickname, "nickname reserved"),
            Err(StoreError::AlreadyExists) => {
                let holder = self
                    .store
                    .get(collections::NICKNAMES, &nickname)
                    .await?
                    .and_then(|doc| doc.string_field(fields::UID));
                if holder.as_deref() != Some(uid.as_str()) {
                    return Err(CoreError::NicknameTaken(nickname));
                }
                debug!(user = %uid, nickname = %nickname, "own reservation found, reconciling");
            }
            Err(err) => return Err(err.into()),
        }

        let mut profile = Fields::new();
        profile.insert(fields::FULL_NAME.to_string(), json!(full_name));
        profile.insert(fields::NICKNAME.to_string(), json!(nickname));
        if let Some(bio) = &request.bio {
            profile.insert(fields::BIO.to_string(), json!(bio));
        }
        if let Some(url) = &photo_url {
            profile.insert(fields::PROFILE_IMAGE_URL.to_string(), json!(url));
        }
        if let Some(token) = &request.fcm_token {
            profile.insert(fields::FCM_TOKEN.to_string(), json!(token));
        }
        profile.insert(fields::PROFILE_COMPLETED.to_string(), json!(true));

        if let Err(err) = self
            .store
            .update(collections::USERS, uid.as_str(), profile)
            .await
        {
            // The reservation stays behind; the retry reconciles it above.
            warn!(user = %uid, error = %err, "profile write failed after reservation");
            return Err(err.into());
        }

        let doc = self
            .store
            .get(collections::USERS, uid.as_str())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {uid}")))?;
        let user = User::from_document(&doc);
        if self.current_user_id().ok().as_ref() == Some(&uid) {
            self.cache_put(&user);
        }
        info!(user = %uid, nickname = %nickname, "profile completed");
        Ok(user)
    }

    /// Advisory availability check.  A `true` here does not guarantee the
    /// subsequent [`Self::complete_profile`] succeeds; callers still handle
    /// [`CoreError::NicknameTaken`].
    pub async fn is_nickname_available(&self, nickname: &str) -> CoreResult<bool> {
        let nickname = normalize_nickname(nickname)?;
        let reservation = self.store.get(collections::NICKNAMES, &nickname).await?;
        Ok(reservation.is_none())
    }

    /// Fetch a profile.  Only the current authenticated user is served
    /// through the cache; every other id reads the store directly.
    pub async fn get_by_id(&self, id: &UserId) -> CoreResult<Option<User>> {
        let is_current = self.current_user_id().ok().as_ref() == Some(id);
        if is_current {
            if let Ok(mut cache) = self.cache.lock() {
                if let Some(user) = cache.get(id) {
                    return Ok(Some(user));
                }
            }
        }

        let user = self
            .store
            .get(collections::USERS, id.as_str())
            .await?
            .map(|doc| User::from_document(&doc));

        if is_current {
            if let Some(user) = &user {
                self.cache_put(user);
            }
        }
        Ok(user)
    }

    /// Live, case-normalized nickname prefix search, capped at
    /// [`constants::NICKNAME_SEARCH_LIMIT`] results.
    pub fn search_by_nickname_prefix(&self, query: &str) -> Streamed<Vec<User>> {
        let normalized = query.trim().to_lowercase();
        if normalized.is_empty() {
            let (tx, stream) = Streamed::channel();
            tx.send(causerie_shared::Outcome::Loading);
            tx.send(causerie_shared::Outcome::Ready(Vec::new()));
            return stream;
        }

        let query = Query::collection(collections::USERS)
            .prefix(fields::NICKNAME, normalized)
            .order_by(fields::NICKNAME, Direction::Ascending)
            .limit(constants::NICKNAME_SEARCH_LIMIT);
        map_stream(self.watches.subscribe(query), |docs| {
            Ok(docs.iter().map(User::from_document).collect())
        })
    }
}

/// Lowercase, `a-z 0-9 _`, length within the configured bounds.
fn normalize_nickname(raw: &str) -> CoreResult<String> {
    let nickname = raw.trim().to_lowercase();
    if nickname.len() < constants::NICKNAME_MIN_LEN || nickname.len() > constants::NICKNAME_MAX_LEN
    {
        return Err(CoreError::Validation(format!(
            "nickname must be {}-{} characters",
            constants::NICKNAME_MIN_LEN,
            constants::NICKNAME_MAX_LEN
        )));
    }
    if !nickname
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(CoreError::Validation(
            "nickname may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(nickname)
}
