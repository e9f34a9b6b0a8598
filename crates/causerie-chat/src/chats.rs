//! Chat lifecycle and the live chat list.

use serde_json::json;
use tracing::{debug, info};

use causerie_shared::{CoreError, CoreResult, UserId};
use causerie_store::document::server_timestamp;
use causerie_store::schema::{collections, fields};
use causerie_store::watch::map_stream;
use causerie_store::{Chat, Direction, DocumentStore, Fields, Query, Streamed};

use crate::engine::ChatEngine;

impl ChatEngine {
    /// Find the existing chat for an unordered participant pair, if any.
    ///
    /// Lookup-then-create is not atomic against the store, so concurrent
    /// first contact can produce duplicates; the earliest-created chat wins
    /// here, which makes repeated calls converge once writes are visible.
    pub async fn find_chat(&self, a: &UserId, b: &UserId) -> CoreResult<Option<Chat>> {
        let query = Query::collection(collections::CHATS)
            .array_contains(fields::PARTICIPANTS, a.as_str());
        let docs = self.store.fetch(&query).await?;

        let mut candidates: Vec<Chat> = docs
            .iter()
            .map(Chat::from_document)
            .filter(|chat| chat.has_participant(b))
            .collect();
        candidates.sort_by(|x, y| {
            x.created_at
                .cmp(&y.created_at)
                .then_with(|| x.id.cmp(&y.id))
        });
        Ok(candidates.into_iter().next())
    }

    /// Return the chat for the pair, creating it on first contact.
    pub async fn create_chat(&self, a: &UserId, b: &UserId) -> CoreResult<Chat> {
        if a == b {
            return Err(CoreError::Validation(
                "a chat needs two distinct participants".into(),
            ));
        }

        if let Some(existing) = self.find_chat(a, b).await? {
            debug!(chat = %existing.id, "existing chat found for pair");
            return Ok(existing);
        }

        let mut record = Fields::new();
        record.insert(
            fields::PARTICIPANTS.to_string(),
            json!([a.as_str(), b.as_str()]),
        );
        record.insert(fields::LAST_MESSAGE.to_string(), json!(""));
        record.insert(fields::TYPING_STATUS.to_string(), json!({}));
        record.insert(fields::CREATED_AT.to_string(), server_timestamp());

        let id = self.store.create(collections::CHATS, record).await?;
        let doc = self
            .store
            .get(collections::CHATS, &id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("chat {id}")))?;
        info!(chat = %id, "chat created");
        Ok(Chat::from_document(&doc))
    }

    /// Live list of the user's chats, most recent message first.
    pub fn get_chats(&self, user: &UserId) -> Streamed<Vec<Chat>> {
        let query = Query::collection(collections::CHATS)
            .array_contains(fields::PARTICIPANTS, user.as_str())
            .order_by(fields::LAST_MESSAGE_TIMESTAMP, Direction::Descending);
        map_stream(self.watches.subscribe(query), |docs| {
            Ok(docs.iter().map(Chat::from_document).collect())
        })
    }
}
