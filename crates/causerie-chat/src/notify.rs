//! Notification bridge decision.
//!
//! The core never renders anything: it decides whether an incoming push
//! payload deserves a platform notification and hands the data over.  The
//! one suppression rule: no alert for the chat currently on screen.

use serde::{Deserialize, Serialize};
use tracing::debug;

use causerie_shared::{ChatId, SessionContext, UserId};

/// Minimum payload of an incoming message push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushPayload {
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Data for a notification the platform layer should surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageNotification {
    pub chat_id: ChatId,
    pub title: String,
    pub body: String,
}

/// Decide whether to surface a notification for the payload.
///
/// Returns `None` when the payload's chat is the one currently viewed:
/// the user is already looking at it.
pub fn decide_message_notification(
    ctx: &SessionContext,
    payload: &PushPayload,
) -> Option<MessageNotification> {
    if ctx.active_chat().as_ref() == Some(&payload.chat_id) {
        debug!(chat = %payload.chat_id, "notification suppressed for active chat");
        return None;
    }
    Some(MessageNotification {
        chat_id: payload.chat_id.clone(),
        title: payload
            .title
            .clone()
            .unwrap_or_else(|| "New message".to_string()),
        body: payload.body.clone().unwrap_or_default(),
    })
}
