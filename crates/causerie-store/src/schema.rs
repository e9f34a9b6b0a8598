//! Persisted layout: collection paths and field names.
//!
//! The store itself is schemaless; every name the core writes or queries is
//! declared here so the schema lives in one place.

use causerie_shared::{ChatId, UserId};

pub mod collections {
    use super::ChatId;

    pub const USERS: &str = "users";
    /// Reservation records: document id is the normalized nickname, the
    /// single field is the owning uid.
    pub const NICKNAMES: &str = "nicknames";
    pub const CHATS: &str = "chats";
    pub const CALLS: &str = "calls";

    /// Message subcollection of one chat.
    pub fn messages(chat_id: &ChatId) -> String {
        format!("chats/{chat_id}/messages")
    }
}

pub mod fields {
    use super::UserId;

    // users
    pub const NICKNAME: &str = "nickname";
    pub const FULL_NAME: &str = "fullName";
    pub const BIO: &str = "bio";
    pub const EMAIL: &str = "email";
    pub const PROFILE_IMAGE_URL: &str = "profileImageUrl";
    pub const FCM_TOKEN: &str = "fcmToken";
    pub const PROFILE_COMPLETED: &str = "profileCompleted";
    pub const IS_ONLINE: &str = "isOnline";
    pub const LAST_SEEN: &str = "lastSeen";

    // nicknames
    pub const UID: &str = "uid";

    // chats
    pub const PARTICIPANTS: &str = "participants";
    pub const LAST_MESSAGE: &str = "lastMessage";
    pub const LAST_MESSAGE_TIMESTAMP: &str = "lastMessageTimestamp";
    pub const TYPING_STATUS: &str = "typingStatus";
    pub const CREATED_AT: &str = "createdAt";

    // messages
    pub const CHAT_ID: &str = "chatId";
    pub const SENDER_ID: &str = "senderId";
    pub const RECEIVER_ID: &str = "receiverId";
    pub const CONTENT: &str = "content";
    pub const TIMESTAMP: &str = "timestamp";
    pub const IS_READ: &str = "isRead";

    // calls
    pub const CALLER_ID: &str = "callerId";
    pub const CALLEE_ID: &str = "calleeId";
    pub const CALL_TYPE: &str = "type";
    pub const STATUS: &str = "status";
    pub const STARTED_AT: &str = "startedAt";
    pub const ENDED_AT: &str = "endedAt";

    /// Dot path addressing one participant's entry in the typing map.
    pub fn typing_member(uid: &UserId) -> String {
        format!("{TYPING_STATUS}.{uid}")
    }
}
