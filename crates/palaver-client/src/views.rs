//! Live views: the inbox and one open conversation.
//!
//! A view owns its feeds and the derived state built from them.  Each call to
//! `next()` waits for one snapshot, folds it in and tells the caller what
//! changed.  `close()` disposes every feed the view opened.

use palaver_shared::{now_millis, Conversation, ConversationId, Message, UserId, UserProfile};
use palaver_store::StoreHandle;
use tracing::debug;

use crate::commands::conversations::{
    listen_conversation, listen_my_conversations, ConversationFeed,
};
use crate::commands::messages::listen_messages;
use crate::commands::presence::listen_user;
use crate::commands::{signals, Feed};
use crate::config::ClientConfig;
use crate::conversations::{ConversationList, ConversationRow};
use crate::error::{ClientError, Result};
use crate::messages::{MessageRow, MessageStream, StreamUpdate, Viewport};
use crate::presence::{header_status, StatusThresholds};

// ---- Inbox ----

#[derive(Debug)]
pub struct InboxView {
    feed: ConversationFeed,
    list: ConversationList,
}

impl InboxView {
    pub async fn open(store: &StoreHandle, me: &UserId, config: &ClientConfig) -> Result<Self> {
        let feed = listen_my_conversations(store, me, config.conversation_window).await?;
        Ok(Self {
            feed,
            list: ConversationList::new(me.clone(), config.typing_threshold_ms),
        })
    }

    /// Wait for the next snapshot and return the fresh rows.  `Ok(None)`
    /// once the feed has closed.
    pub async fn next(&mut self) -> Result<Option<Vec<ConversationRow>>> {
        let Some(conversations) = self.feed.next().await? else {
            return Ok(None);
        };
        self.list.apply_snapshot(conversations, self.feed.is_ordered());
        Ok(Some(self.rows()))
    }

    pub fn rows(&self) -> Vec<ConversationRow> {
        self.list.rows(now_millis())
    }

    pub fn list(&self) -> &ConversationList {
        &self.list
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.list.set_search(search);
    }

    pub fn set_active(&mut self, active: Option<ConversationId>) {
        self.list.set_active(active);
    }

    pub async fn close(self) {
        self.feed.close().await;
    }
}

// ---- Conversation ----

/// What changed after [`ConversationView::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationUpdate {
    /// The conversation document changed (header, receipts, typing).
    Conversation,
    Messages(StreamUpdate),
    /// The DM peer's profile or presence changed.
    Peer,
    /// A feed ended; the view is no longer live.
    Closed,
}

async fn next_peer(feed: &mut Option<Feed<UserProfile>>) -> Result<Option<Option<UserProfile>>> {
    match feed {
        Some(feed) => feed.next_document().await,
        None => std::future::pending().await,
    }
}

#[derive(Debug)]
pub struct ConversationView {
    store: StoreHandle,
    me: UserId,
    thresholds: StatusThresholds,
    conversation: Conversation,
    peer: Option<UserProfile>,
    stream: MessageStream,
    viewport: Viewport,
    chat_feed: Feed<Conversation>,
    message_feed: Feed<Message>,
    peer_feed: Option<Feed<UserProfile>>,
}

impl ConversationView {
    /// Subscribe to the conversation, its messages and (for a DM) the peer.
    pub async fn open(
        store: &StoreHandle,
        me: &UserId,
        chat: &ConversationId,
        config: &ClientConfig,
    ) -> Result<Self> {
        let mut chat_feed = listen_conversation(store, chat).await?;
        let conversation = match chat_feed.next_document().await {
            Ok(Some(Some(conversation))) => conversation,
            Ok(_) => {
                chat_feed.close().await;
                return Err(ClientError::ConversationNotFound(chat.clone()));
            }
            Err(e) => {
                chat_feed.close().await;
                return Err(e);
            }
        };

        let peer_feed = match conversation.peers(me).next() {
            Some(peer) if !conversation.is_group() => Some(listen_user(store, peer).await?),
            _ => None,
        };
        let message_feed = listen_messages(store, chat, config.message_window).await?;

        debug!(chat = %chat, "Conversation view opened");
        Ok(Self {
            store: store.clone(),
            me: me.clone(),
            thresholds: StatusThresholds {
                presence_ms: config.presence_threshold_ms,
                typing_ms: config.typing_threshold_ms,
            },
            conversation,
            peer: None,
            stream: MessageStream::new(me.clone(), config.message_window, config.near_bottom_px),
            viewport: Viewport::at_bottom(),
            chat_feed,
            message_feed,
            peer_feed,
        })
    }

    /// Wait for whichever feed fires first and fold it in.  A message change
    /// that asks for it also marks the conversation read (best-effort).
    pub async fn next(&mut self) -> Result<ConversationUpdate> {
        tokio::select! {
            doc = self.chat_feed.next_document() => match doc? {
                Some(Some(conversation)) => {
                    self.conversation = conversation;
                    Ok(ConversationUpdate::Conversation)
                }
                Some(None) | None => Ok(ConversationUpdate::Closed),
            },
            batch = self.message_feed.next() => match batch? {
                Some(messages) => {
                    let update = self.stream.apply_snapshot(messages, self.viewport);
                    if update.scroll_to_bottom {
                        self.viewport = Viewport::at_bottom();
                    }
                    if update.mark_read {
                        if let Err(e) =
                            signals::mark_read(&self.store, &self.conversation.id, &self.me).await
                        {
                            debug!(chat = %self.conversation.id, error = %e, "Mark read failed");
                        }
                    }
                    Ok(ConversationUpdate::Messages(update))
                }
                None => Ok(ConversationUpdate::Closed),
            },
            peer = next_peer(&mut self.peer_feed) => match peer? {
                Some(profile) => {
                    self.peer = profile;
                    Ok(ConversationUpdate::Peer)
                }
                None => Ok(ConversationUpdate::Closed),
            },
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn peer(&self) -> Option<&UserProfile> {
        self.peer.as_ref()
    }

    pub fn title(&self) -> String {
        self.conversation.title_for(&self.me)
    }

    pub fn header_status(&self) -> String {
        header_status(
            &self.conversation,
            &self.me,
            self.peer.as_ref(),
            now_millis(),
            self.thresholds,
        )
    }

    pub fn rows(&self) -> Vec<MessageRow> {
        self.stream.rows(Some(&self.conversation))
    }

    /// Scroll position reported by the UI; used for the next snapshot.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn stream(&self) -> &MessageStream {
        &self.stream
    }

    /// Search state lives on the stream.
    pub fn stream_mut(&mut self) -> &mut MessageStream {
        &mut self.stream
    }

    pub async fn close(self) {
        self.chat_feed.close().await;
        self.message_feed.close().await;
        if let Some(feed) = self.peer_feed {
            feed.close().await;
        }
        debug!(chat = %self.conversation.id, "Conversation view closed");
    }
}
