//! Short-TTL read-through cache for profile records.
//!
//! One value per key, expiry on read, values returned by clone so callers
//! can never mutate the cached slot.  Not safe for concurrent mutation on
//! its own; the owner wraps it in a mutex.  In practice the key space is a
//! single entry, the current authenticated user.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use causerie_shared::{constants, UserId};
use causerie_store::User;

struct CacheEntry {
    value: User,
    written_at: Instant,
}

pub struct ProfileCache {
    ttl: Duration,
    entries: HashMap<UserId, CacheEntry>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(constants::PROFILE_CACHE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Store a value, overwriting any prior entry for the same user.
    pub fn put(&mut self, value: User) {
        self.entries.insert(
            value.id.clone(),
            CacheEntry {
                value,
                written_at: Instant::now(),
            },
        );
    }

    /// Return the cached value while it is fresh; an expired entry is
    /// evicted and reported absent.
    pub fn get(&mut self, key: &UserId) -> Option<User> {
        match self.entries.get(key) {
            Some(entry) if entry.written_at.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Force-clear one entry.
    pub fn invalidate(&mut self, key: &UserId) {
        self.entries.remove(key);
    }

    /// Last write instant for diagnostics; `None` means never written (or
    /// cleared since).
    pub fn last_write_time(&self, key: &UserId) -> Option<Instant> {
        self.entries.get(key).map(|entry| entry.written_at)
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: UserId::new(id),
            nickname: Some("alex".to_string()),
            full_name: Some("Alex".to_string()),
            bio: None,
            email: None,
            profile_image_url: None,
            fcm_token: None,
            profile_completed: true,
            is_online: false,
            last_seen: None,
        }
    }

    #[test]
    fn round_trip_within_ttl() {
        let mut cache = ProfileCache::new();
        let u = user("u1");
        cache.put(u.clone());
        assert_eq!(cache.get(&UserId::new("u1")), Some(u));
        assert!(cache.last_write_time(&UserId::new("u1")).is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let mut cache = ProfileCache::with_ttl(Duration::from_millis(20));
        cache.put(user("u1"));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get(&UserId::new("u1")), None);
        // The expired read cleared the slot.
        assert_eq!(cache.last_write_time(&UserId::new("u1")), None);
    }

    #[test]
    fn invalidate_clears_entry() {
        let mut cache = ProfileCache::new();
        cache.put(user("u1"));
        cache.invalidate(&UserId::new("u1"));
        assert_eq!(cache.get(&UserId::new("u1")), None);
    }

    #[test]
    fn put_overwrites_prior_entry() {
        let mut cache = ProfileCache::new();
        cache.put(user("u1"));
        let mut updated = user("u1");
        updated.full_name = Some("Alexandra".to_string());
        cache.put(updated.clone());
        assert_eq!(cache.get(&UserId::new("u1")), Some(updated));
    }
}
