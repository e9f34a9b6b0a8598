//! Domain model structs persisted in the remote document store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.  The `from_document` constructors own the
//! field-name discipline declared in [`crate::schema`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use causerie_shared::{CallId, CallKind, CallStatus, ChatId, MessageId, UserId};

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::schema::fields;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile.
///
/// Created in two phases: a minimal record at first authentication, then
/// completed once nickname, full name and photo are supplied.  The nickname
/// is immutable once reserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Store-assigned document id (also the auth provider uid).
    pub id: UserId,
    /// Unique nickname, lowercase.  Absent until the profile is completed.
    pub nickname: Option<String>,
    /// Display name.
    pub full_name: Option<String>,
    /// Free-form biography line.
    pub bio: Option<String>,
    /// E-mail derived from the auth identity.
    pub email: Option<String>,
    /// URL of the uploaded profile photo.
    pub profile_image_url: Option<String>,
    /// Current push token of the user's device.
    pub fcm_token: Option<String>,
    /// Whether the second profile phase has run.
    pub profile_completed: bool,
    /// Live presence flag, authoritative via the disconnect hook.
    pub is_online: bool,
    /// Stamped when the user goes offline.
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: UserId::new(doc.id.clone()),
            nickname: doc.string_field(fields::NICKNAME),
            full_name: doc.string_field(fields::FULL_NAME),
            bio: doc.string_field(fields::BIO),
            email: doc.string_field(fields::EMAIL),
            profile_image_url: doc.string_field(fields::PROFILE_IMAGE_URL),
            fcm_token: doc.string_field(fields::FCM_TOKEN),
            profile_completed: doc.bool_field(fields::PROFILE_COMPLETED).unwrap_or(false),
            is_online: doc.bool_field(fields::IS_ONLINE).unwrap_or(false),
            last_seen: doc.time_field(fields::LAST_SEEN),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation between exactly two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    /// Unordered participant pair.
    pub participants: Vec<UserId>,
    /// Denormalized preview of the most recent message.
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Per-participant typing flags.
    pub typing_status: BTreeMap<String, bool>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn from_document(doc: &Document) -> Self {
        let participants = doc
            .str_list_field(fields::PARTICIPANTS)
            .unwrap_or_default()
            .into_iter()
            .map(UserId::new)
            .collect();
        let typing_status = doc
            .map_field(fields::TYPING_STATUS)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: ChatId::new(doc.id.clone()),
            participants,
            last_message: doc.string_field(fields::LAST_MESSAGE).unwrap_or_default(),
            last_message_at: doc.time_field(fields::LAST_MESSAGE_TIMESTAMP),
            typing_status,
            created_at: doc.time_field(fields::CREATED_AT),
        }
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// The other participant, from `me`'s point of view.
    pub fn peer_of(&self, me: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|p| *p != me)
    }

    /// Whether the given participant is currently typing.
    pub fn is_typing(&self, user: &UserId) -> bool {
        self.typing_status
            .get(user.as_str())
            .copied()
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.  Immutable after creation except for the read
/// receipt flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Message text, or the uploaded image URL for image messages.
    pub content: String,
    /// Store-assigned send time.
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    pub fn from_document(doc: &Document) -> StoreResult<Self> {
        let chat_id = doc
            .string_field(fields::CHAT_ID)
            .ok_or_else(|| StoreError::InvalidDocument("message missing chatId".to_string()))?;
        let sender_id = doc
            .string_field(fields::SENDER_ID)
            .ok_or_else(|| StoreError::InvalidDocument("message missing senderId".to_string()))?;
        let receiver_id = doc
            .string_field(fields::RECEIVER_ID)
            .ok_or_else(|| StoreError::InvalidDocument("message missing receiverId".to_string()))?;
        let sent_at = doc
            .time_field(fields::TIMESTAMP)
            .ok_or_else(|| StoreError::InvalidDocument("message missing timestamp".to_string()))?;
        Ok(Self {
            id: MessageId::new(doc.id.clone()),
            chat_id: ChatId::new(chat_id),
            sender_id: UserId::new(sender_id),
            receiver_id: UserId::new(receiver_id),
            content: doc.string_field(fields::CONTENT).unwrap_or_default(),
            sent_at,
            is_read: doc.bool_field(fields::IS_READ).unwrap_or(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// A call signaling record.  Terminal states are final and immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Call {
    pub id: CallId,
    pub caller_id: UserId,
    pub callee_id: UserId,
    pub kind: CallKind,
    pub status: CallStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn from_document(doc: &Document) -> StoreResult<Self> {
        let caller_id = doc
            .string_field(fields::CALLER_ID)
            .ok_or_else(|| StoreError::InvalidDocument("call missing callerId".to_string()))?;
        let callee_id = doc
            .string_field(fields::CALLEE_ID)
            .ok_or_else(|| StoreError::InvalidDocument("call missing calleeId".to_string()))?;
        let kind = doc
            .str_field(fields::CALL_TYPE)
            .and_then(CallKind::parse)
            .ok_or_else(|| StoreError::InvalidDocument("call has unknown type".to_string()))?;
        let status = doc
            .str_field(fields::STATUS)
            .and_then(CallStatus::parse)
            .ok_or_else(|| StoreError::InvalidDocument("call has unknown status".to_string()))?;
        Ok(Self {
            id: CallId::new(doc.id.clone()),
            caller_id: UserId::new(caller_id),
            callee_id: UserId::new(callee_id),
            kind,
            status,
            started_at: doc.time_field(fields::STARTED_AT),
            ended_at: doc.time_field(fields::ENDED_AT),
        })
    }

    /// Both parties need these to join the media session; everything beyond
    /// the ids is the realtime provider's business.
    pub fn participants(&self) -> [&UserId; 2] {
        [&self.caller_id, &self.callee_id]
    }
}
