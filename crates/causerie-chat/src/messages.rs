//! Message send, read receipts, and the live message stream.

use serde_json::json;
use tracing::{debug, info};

use causerie_shared::{ChatId, CoreError, CoreResult, MessageId, UserId};
use causerie_store::document::server_timestamp;
use causerie_store::schema::{collections, fields};
use causerie_store::watch::map_stream;
use causerie_store::{
    Direction, DocumentStore, Fields, MediaPayload, MediaUploader, Message, Query, Streamed,
};

use crate::engine::ChatEngine;

impl ChatEngine {
    /// Append a message and refresh the parent chat's preview fields in the
    /// same logical operation.
    ///
    /// An attached image is uploaded first and its URL becomes the message
    /// content.  Timestamps are store-assigned, which is what makes message
    /// order within a chat non-decreasing for every reader.
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        content: &str,
        sender: &UserId,
        receiver: &UserId,
        image: Option<MediaPayload>,
    ) -> CoreResult<Message> {
        let text = content.trim();
        if text.is_empty() && image.is_none() {
            return Err(CoreError::Validation("message has no content".into()));
        }

        let content = match image {
            Some(payload) => self.uploader.upload(payload).await?,
            None => text.to_string(),
        };

        // The parent chat must exist before anything is written.
        if self
            .store
            .get(collections::CHATS, chat_id.as_str())
            .await?
            .is_none()
        {
            return Err(CoreError::NotFound(format!("chat {chat_id}")));
        }

        let mut record = Fields::new();
        record.insert(fields::CHAT_ID.to_string(), json!(chat_id.as_str()));
        record.insert(fields::SENDER_ID.to_string(), json!(sender.as_str()));
        record.insert(fields::RECEIVER_ID.to_string(), json!(receiver.as_str()));
        record.insert(fields::CONTENT.to_string(), json!(content));
        record.insert(fields::IS_READ.to_string(), json!(false));
        record.insert(fields::TIMESTAMP.to_string(), server_timestamp());

        let message_collection = collections::messages(chat_id);
        let message_id = self.store.create(&message_collection, record).await?;

        let mut preview = Fields::new();
        preview.insert(fields::LAST_MESSAGE.to_string(), json!(content));
        preview.insert(
            fields::LAST_MESSAGE_TIMESTAMP.to_string(),
            server_timestamp(),
        );
        self.store
            .update(collections::CHATS, chat_id.as_str(), preview)
            .await?;

        let doc = self
            .store
            .get(&message_collection, &message_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("message {message_id}")))?;
        let message = Message::from_document(&doc)?;
        info!(chat = %chat_id, message = %message.id, "message sent");
        Ok(message)
    }

    /// Flip the read receipt.  Marking an already-read message is a no-op
    /// success.
    pub async fn mark_message_as_read(
        &self,
        chat_id: &ChatId,
        message_id: &MessageId,
    ) -> CoreResult<()> {
        let message_collection = collections::messages(chat_id);
        let doc = self
            .store
            .get(&message_collection, message_id.as_str())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("message {message_id}")))?;

        if Message::from_document(&doc)?.is_read {
            return Ok(());
        }

        let mut receipt = Fields::new();
        receipt.insert(fields::IS_READ.to_string(), json!(true));
        self.store
            .update(&message_collection, message_id.as_str(), receipt)
            .await?;
        debug!(chat = %chat_id, message = %message_id, "message marked read");
        Ok(())
    }

    /// Resolve (or create) the chat for the pair and live-stream its
    /// messages chronologically.
    pub async fn retrieve_all_messages(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> CoreResult<Streamed<Vec<Message>>> {
        let chat = self.create_chat(a, b).await?;
        let query = Query::collection(collections::messages(&chat.id))
            .order_by(fields::TIMESTAMP, Direction::Ascending);
        Ok(map_stream(self.watches.subscribe(query), |docs| {
            docs.iter()
                .map(Message::from_document)
                .collect::<Result<Vec<Message>, _>>()
                .map_err(CoreError::from)
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::harness;
    use causerie_shared::{ChatId, CoreError, MessageId, UserId};
    use causerie_store::MediaPayload;

    #[tokio::test]
    async fn send_updates_chat_preview_fields() {
        let (_, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let chat = engine.create_chat(&u1, &u2).await.unwrap();

        let message = engine
            .send_message(&chat.id, "hi", &u1, &u2, None)
            .await
            .unwrap();
        assert_eq!(message.content, "hi");
        assert!(!message.is_read);

        let refreshed = engine.find_chat(&u1, &u2).await.unwrap().unwrap();
        assert_eq!(refreshed.last_message, "hi");
        assert!(refreshed.last_message_at.is_some());
    }

    #[tokio::test]
    async fn image_url_is_substituted_into_content() {
        let (_, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let chat = engine.create_chat(&u1, &u2).await.unwrap();

        let message = engine
            .send_message(
                &chat.id,
                "",
                &u1,
                &u2,
                Some(MediaPayload::new(vec![0xFF, 0xD8], "image/jpeg")),
            )
            .await
            .unwrap();
        assert!(message.content.starts_with("mem://"));
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_write() {
        let (_, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let chat = engine.create_chat(&u1, &u2).await.unwrap();

        let err = engine
            .send_message(&chat.id, "   ", &u1, &u2, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let refreshed = engine.find_chat(&u1, &u2).await.unwrap().unwrap();
        assert_eq!(refreshed.last_message, "");
    }

    #[tokio::test]
    async fn send_into_unknown_chat_is_not_found() {
        let (_, engine) = harness().await;
        let err = engine
            .send_message(
                &ChatId::new("ghost"),
                "hi",
                &UserId::new("u1"),
                &UserId::new("u2"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn messages_stream_in_timestamp_order() {
        let (_, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let chat = engine.create_chat(&u1, &u2).await.unwrap();

        // Interleaved senders; the store clock orders them.
        engine
            .send_message(&chat.id, "one", &u1, &u2, None)
            .await
            .unwrap();
        engine
            .send_message(&chat.id, "two", &u2, &u1, None)
            .await
            .unwrap();
        engine
            .send_message(&chat.id, "three", &u1, &u2, None)
            .await
            .unwrap();

        let mut stream = engine.retrieve_all_messages(&u1, &u2).await.unwrap();
        let messages = stream.next_ready().await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert!(messages.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
    }

    #[tokio::test]
    async fn retrieve_creates_the_chat_on_first_contact() {
        let (_, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");

        let mut stream = engine.retrieve_all_messages(&u1, &u2).await.unwrap();
        assert!(stream.next_ready().await.unwrap().is_empty());
        assert!(engine.find_chat(&u1, &u2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let (_, engine) = harness().await;
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let chat = engine.create_chat(&u1, &u2).await.unwrap();
        let message = engine
            .send_message(&chat.id, "hi", &u1, &u2, None)
            .await
            .unwrap();

        engine
            .mark_message_as_read(&chat.id, &message.id)
            .await
            .unwrap();
        engine
            .mark_message_as_read(&chat.id, &message.id)
            .await
            .unwrap();

        let mut stream = engine.retrieve_all_messages(&u1, &u2).await.unwrap();
        assert!(stream.next_ready().await.unwrap()[0].is_read);

        let err = engine
            .mark_message_as_read(&chat.id, &MessageId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
