//! Session-scoped state shared between the UI layer and the notification
//! bridge.
//!
//! The one piece of process-wide mutable state in the core: the id of the
//! chat currently on screen.  The UI sets it on focus change; the
//! notification bridge reads it to suppress alerts for the visible chat.
//! Passed explicitly wherever it is needed; there is no global.

use std::sync::Mutex;

use crate::types::ChatId;

#[derive(Debug, Default)]
pub struct SessionContext {
    active_chat: Mutex<Option<ChatId>>,
}

impl SessionContext {
    /// Fresh context with no active chat (process start).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a chat screen came to the foreground.
    pub fn enter_chat(&self, chat_id: ChatId) {
        if let Ok(mut guard) = self.active_chat.lock() {
            *guard = Some(chat_id);
        }
    }

    /// Record that the chat screen was backgrounded or closed.
    pub fn leave_chat(&self) {
        if let Ok(mut guard) = self.active_chat.lock() {
            *guard = None;
        }
    }

    /// The chat currently on screen, if any.
    pub fn active_chat(&self) -> Option<ChatId> {
        self.active_chat.lock().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_leave() {
        let ctx = SessionContext::new();
        assert_eq!(ctx.active_chat(), None);

        ctx.enter_chat(ChatId::new("c1"));
        assert_eq!(ctx.active_chat(), Some(ChatId::new("c1")));

        ctx.enter_chat(ChatId::new("c2"));
        assert_eq!(ctx.active_chat(), Some(ChatId::new("c2")));

        ctx.leave_chat();
        assert_eq!(ctx.active_chat(), None);
    }
}
