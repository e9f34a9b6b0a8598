//! # causerie-chat
//!
//! Chat & Messaging Engine: chat lifecycle, message delivery and ordering,
//! read receipts, typing indicators, the chat-preview projection, and the
//! notification-bridge decision.

pub mod chats;
pub mod engine;
pub mod messages;
pub mod notify;
pub mod previews;
pub mod typing;

pub use engine::ChatEngine;
pub use notify::{decide_message_notification, MessageNotification, PushPayload};
pub use previews::ChatPreview;
pub use typing::{TypingIndicator, TypingState};
