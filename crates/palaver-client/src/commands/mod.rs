//! Thin request/listener wrappers over the backend.
//!
//! Each function maps one user-facing operation onto store and auth calls.
//! Live listeners return a typed [`Feed`] that decodes snapshots and skips
//! documents that fail to decode.

pub mod conversations;
pub mod messages;
pub mod presence;
pub mod profile;
pub mod signals;
pub mod users;

use std::marker::PhantomData;

use futures::StreamExt;
use palaver_shared::constants::{CHATS_COLLECTION, MESSAGES_SUBCOLLECTION, USERS_COLLECTION};
use palaver_shared::{Conversation, ConversationId, Message, MessageId, UserId, UserProfile};
use palaver_store::{DocPath, DocumentSnapshot, FeedEvent, Subscription};
use tracing::warn;

use crate::error::Result;

// ---- Paths ----

pub(crate) fn user_path(uid: &UserId) -> DocPath {
    DocPath::new(USERS_COLLECTION, uid.as_str())
}

pub(crate) fn chat_path(id: &ConversationId) -> DocPath {
    DocPath::new(CHATS_COLLECTION, id.as_str())
}

pub(crate) fn messages_collection(chat: &ConversationId) -> String {
    chat_path(chat).subcollection(MESSAGES_SUBCOLLECTION)
}

pub(crate) fn message_path(chat: &ConversationId, message: &MessageId) -> DocPath {
    DocPath::new(messages_collection(chat), message.as_str())
}

// ---- Decoding ----

/// Documents that can be decoded from a store snapshot.
pub trait FromDocument: Sized {
    fn from_snapshot(doc: &DocumentSnapshot) -> serde_json::Result<Self>;
}

impl FromDocument for Conversation {
    fn from_snapshot(doc: &DocumentSnapshot) -> serde_json::Result<Self> {
        Conversation::from_document(&doc.id, &doc.data)
    }
}

impl FromDocument for Message {
    fn from_snapshot(doc: &DocumentSnapshot) -> serde_json::Result<Self> {
        Message::from_document(&doc.id, &doc.data)
    }
}

impl FromDocument for UserProfile {
    fn from_snapshot(doc: &DocumentSnapshot) -> serde_json::Result<Self> {
        let mut profile = UserProfile::from_document(&doc.data)?;
        if profile.uid.as_str().is_empty() {
            profile.uid = UserId::new(doc.id.as_str());
        }
        Ok(profile)
    }
}

/// Decode every document, skipping (and logging) the ones that fail.
pub(crate) fn decode_all<T: FromDocument>(docs: &[DocumentSnapshot]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match T::from_snapshot(doc) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(doc = %doc.id, error = %e, "Skipping undecodable document");
                None
            }
        })
        .collect()
}

// ---- Feeds ----

/// A typed live feed.
#[derive(Debug)]
pub struct Feed<T> {
    sub: Subscription,
    _kind: PhantomData<fn() -> T>,
}

impl<T: FromDocument> Feed<T> {
    pub(crate) fn new(sub: Subscription) -> Self {
        Self {
            sub,
            _kind: PhantomData,
        }
    }

    /// Next decoded snapshot, `Ok(None)` once the feed has closed.
    pub async fn next(&mut self) -> Result<Option<Vec<T>>> {
        match self.sub.next().await {
            Some(FeedEvent::Snapshot(docs)) => Ok(Some(decode_all(&docs))),
            Some(FeedEvent::Failed(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// For single-document feeds: `Ok(Some(None))` means the document does not
    /// exist (yet).
    pub async fn next_document(&mut self) -> Result<Option<Option<T>>> {
        Ok(self.next().await?.map(|docs| docs.into_iter().next()))
    }

    pub async fn close(self) {
        self.sub.unsubscribe().await;
    }
}
