//! Chat-preview projection.
//!
//! Joins each chat the current user participates in with the peer's profile
//! and an unread count, recomputed whenever the underlying chat or message
//! set changes.  Never persisted: it is derived state for the chat list
//! screen.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use causerie_shared::{ChatId, CoreResult, Outcome, UserId};
use causerie_store::schema::{collections, fields};
use causerie_store::watch::map_stream;
use causerie_store::{Chat, Query, StreamSender, Streamed, User, WatchRegistry};
use causerie_user::UserDirectory;

use crate::engine::ChatEngine;

/// One row of the chat list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatPreview {
    pub chat_id: ChatId,
    pub peer_id: UserId,
    pub peer_nickname: Option<String>,
    pub peer_full_name: Option<String>,
    pub peer_photo_url: Option<String>,
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Messages addressed to the current user and not yet read.
    pub unread_count: usize,
}

impl ChatEngine {
    /// Live preview list for the current authenticated user, most recent
    /// chat first.
    pub fn retrieve_chat_previews(&self) -> CoreResult<Streamed<Vec<ChatPreview>>> {
        let me = self.directory.current_user_id()?;
        let (tx, out) = Streamed::channel();
        let chats = self.get_chats(&me);
        let task = PreviewTask {
            me,
            directory: self.directory.clone(),
            watches: self.watches.clone(),
            tx,
        };
        tokio::spawn(task.run(chats));
        Ok(out)
    }
}

enum Feed {
    Chats(Outcome<Vec<Chat>>),
    ChatsClosed,
    Unread(ChatId, Outcome<usize>),
}

struct PreviewTask {
    me: UserId,
    directory: Arc<UserDirectory>,
    watches: Arc<WatchRegistry>,
    tx: StreamSender<Vec<ChatPreview>>,
}

impl PreviewTask {
    async fn run(self, mut chats: Streamed<Vec<Chat>>) {
        self.tx.send(Outcome::Loading);

        // All inputs fan into one channel: the chat list plus one unread
        // counter per live chat.
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel();

        let chats_pump = tokio::spawn({
            let feed_tx = feed_tx.clone();
            async move {
                while let Some(outcome) = chats.next().await {
                    if feed_tx.send(Feed::Chats(outcome)).is_err() {
                        return;
                    }
                }
                let _ = feed_tx.send(Feed::ChatsClosed);
            }
        });

        let mut current: Vec<Chat> = Vec::new();
        let mut unread: HashMap<ChatId, usize> = HashMap::new();
        let mut counters: HashMap<ChatId, JoinHandle<()>> = HashMap::new();
        let mut profiles: HashMap<UserId, Option<User>> = HashMap::new();
        let mut have_chats = false;

        loop {
            let feed = tokio::select! {
                _ = self.tx.closed() => break,
                feed = feed_rx.recv() => match feed {
                    Some(feed) => feed,
                    None => break,
                },
            };

            match feed {
                Feed::Chats(Outcome::Loading) => {}
                Feed::Chats(Outcome::Failed(err)) => {
                    self.tx.send(Outcome::Failed(err));
                    break;
                }
                Feed::Chats(Outcome::Ready(list)) => {
                    have_chats = true;
                    let live: HashSet<ChatId> = list.iter().map(|c| c.id.clone()).collect();
                    counters.retain(|chat_id, handle| {
                        if live.contains(chat_id) {
                            true
                        } else {
                            handle.abort();
                            unread.remove(chat_id);
                            false
                        }
                    });
                    for chat in &list {
                        if !counters.contains_key(&chat.id) {
                            counters.insert(
                                chat.id.clone(),
                                self.spawn_counter(chat.id.clone(), feed_tx.clone()),
                            );
                        }
                    }
                    current = list;
                    if !self.emit(&current, &unread, &mut profiles).await {
                        break;
                    }
                }
                Feed::ChatsClosed => break,
                Feed::Unread(chat_id, Outcome::Ready(count)) => {
                    unread.insert(chat_id, count);
                    if have_chats && !self.emit(&current, &unread, &mut profiles).await {
                        break;
                    }
                }
                Feed::Unread(_, Outcome::Loading) => {}
                Feed::Unread(_, Outcome::Failed(err)) => {
                    self.tx.send(Outcome::Failed(err));
                    break;
                }
            }
        }

        chats_pump.abort();
        for handle in counters.values() {
            handle.abort();
        }
    }

    fn spawn_counter(
        &self,
        chat_id: ChatId,
        feed_tx: mpsc::UnboundedSender<Feed>,
    ) -> JoinHandle<()> {
        let query = Query::collection(collections::messages(&chat_id))
            .filter_eq(fields::RECEIVER_ID, self.me.as_str())
            .filter_eq(fields::IS_READ, false);
        let mut counts = map_stream(self.watches.subscribe(query), |docs| Ok(docs.len()));
        tokio::spawn(async move {
            while let Some(outcome) = counts.next().await {
                if feed_tx
                    .send(Feed::Unread(chat_id.clone(), outcome))
                    .is_err()
                {
                    return;
                }
            }
        })
    }

    async fn emit(
        &self,
        chats: &[Chat],
        unread: &HashMap<ChatId, usize>,
        profiles: &mut HashMap<UserId, Option<User>>,
    ) -> bool {
        let mut previews = Vec::with_capacity(chats.len());
        for chat in chats {
            let peer = match chat.peer_of(&self.me) {
                Some(peer) => peer.clone(),
                None => continue,
            };
            if !profiles.contains_key(&peer) {
                let fetched = self.directory.get_by_id(&peer).await.unwrap_or(None);
                profiles.insert(peer.clone(), fetched);
            }
            let profile = profiles.get(&peer).cloned().flatten();
            previews.push(ChatPreview {
                chat_id: chat.id.clone(),
                peer_id: peer,
                peer_nickname: profile.as_ref().and_then(|u| u.nickname.clone()),
                peer_full_name: profile.as_ref().and_then(|u| u.full_name.clone()),
                peer_photo_url: profile.as_ref().and_then(|u| u.profile_image_url.clone()),
                last_message: chat.last_message.clone(),
                last_message_at: chat.last_message_at,
                unread_count: unread.get(&chat.id).copied().unwrap_or(0),
            });
        }
        self.tx.send(Outcome::Ready(previews))
    }
}
