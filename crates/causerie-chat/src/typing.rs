//! Typing indicator.
//!
//! Two halves: a pure, caller-driven state machine deciding when the flag
//! flips, and the single-field store write that makes the flip visible to
//! the peer immediately.  The engine performs no debouncing of its own;
//! the caller drives [`TypingIndicator`] from its input events and polls
//! the idle deadline.

use std::time::{Duration, Instant};

use serde_json::json;
use tracing::debug;

use causerie_shared::{constants, ChatId, CoreResult, UserId};
use causerie_store::schema::{collections, fields};
use causerie_store::{DocumentStore, Fields};

use crate::engine::ChatEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Idle,
    Typing,
}

/// Per-chat, per-user typing state machine.
///
/// `Idle -> Typing` on a keystroke, `Typing -> Idle` after the inactivity
/// timeout or on send.  Transition methods return the flag value to write
/// when the visible state changed, `None` otherwise.
#[derive(Debug)]
pub struct TypingIndicator {
    state: TypingState,
    idle_after: Duration,
    deadline: Option<Instant>,
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(constants::TYPING_IDLE_TIMEOUT_MS))
    }

    pub fn with_timeout(idle_after: Duration) -> Self {
        Self {
            state: TypingState::Idle,
            idle_after,
            deadline: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.state == TypingState::Typing
    }

    /// Next instant at which [`Self::poll`] could flip the state.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A keystroke arrived.
    pub fn keystroke(&mut self, now: Instant) -> Option<bool> {
        self.deadline = Some(now + self.idle_after);
        match self.state {
            TypingState::Idle => {
                self.state = TypingState::Typing;
                Some(true)
            }
            TypingState::Typing => None,
        }
    }

    /// Check the inactivity deadline.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        match (self.state, self.deadline) {
            (TypingState::Typing, Some(deadline)) if now >= deadline => {
                self.state = TypingState::Idle;
                self.deadline = None;
                Some(false)
            }
            _ => None,
        }
    }

    /// The message was sent; typing stops immediately.
    pub fn message_sent(&mut self) -> Option<bool> {
        self.deadline = None;
        match self.state {
            TypingState::Typing => {
                self.state = TypingState::Idle;
                Some(false)
            }
            TypingState::Idle => None,
        }
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEngine {
    /// Write one participant's typing flag.  A dot-path update, so the
    /// peer's entry is never clobbered, and independent of message sends.
    pub async fn update_typing_status(
        &self,
        chat_id: &ChatId,
        user: &UserId,
        is_typing: bool,
    ) -> CoreResult<()> {
        let mut update = Fields::new();
        update.insert(fields::typing_member(user), json!(is_typing));
        self.store
            .update(collections::CHATS, chat_id.as_str(), update)
            .await?;
        debug!(chat = %chat_id, user = %user, is_typing, "typing status updated");
        Ok(())
    }
}
