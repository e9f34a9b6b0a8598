/// Application name
pub const APP_NAME: &str = "Causerie";

/// How long a cached profile stays fresh (5 minutes)
pub const PROFILE_CACHE_TTL_SECS: u64 = 5 * 60;

/// Maximum results returned by a nickname prefix search
pub const NICKNAME_SEARCH_LIMIT: usize = 10;

/// Minimum nickname length
pub const NICKNAME_MIN_LEN: usize = 3;

/// Maximum nickname length
pub const NICKNAME_MAX_LEN: usize = 20;

/// Typing indicator flips back to idle after this much keyboard silence
pub const TYPING_IDLE_TIMEOUT_MS: u64 = 3_000;

/// Number of participants in a chat (pairwise design)
pub const CHAT_PARTICIPANTS: usize = 2;
