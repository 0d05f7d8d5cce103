//! Message writes and the message listener.
//!
//! Every write that touches both a message and its conversation preview goes
//! through one batch, so the preview never describes a message that failed to
//! store.

use palaver_shared::constants::DELETED_PLACEHOLDER;
use palaver_shared::{Conversation, ConversationId, Message, MessageId, UserId, ValidationError};
use palaver_store::{Direction, Patch, Query, StoreHandle, WriteBatch};
use serde_json::json;
use tracing::{debug, info};

use super::conversations::member_field;
use super::{chat_path, message_path, messages_collection, Feed};
use crate::error::Result;

/// Whether `message` is what the conversation preview currently shows.
pub fn is_latest(conversation: &Conversation, message: &Message) -> bool {
    conversation.last_message_id.as_ref() == Some(&message.id)
}

fn check_own(message: &Message, me: &UserId) -> Result<()> {
    if &message.sender_id != me {
        return Err(ValidationError::NotOwnMessage.into());
    }
    if message.is_tombstone() {
        return Err(ValidationError::MessageDeleted.into());
    }
    Ok(())
}

/// Live window of the most recent messages, oldest first.
pub async fn listen_messages(
    store: &StoreHandle,
    chat: &ConversationId,
    window: usize,
) -> Result<Feed<Message>> {
    let query = Query::collection(messages_collection(chat))
        .order_by("createdAt", Direction::Ascending)
        .limit_to_last(window);
    Ok(Feed::new(store.watch_query(query).await?))
}

/// Store a new text message and update the conversation in the same commit:
/// preview fields, un-hide for every member, one more unread for every
/// recipient.
pub async fn send_message(
    store: &StoreHandle,
    chat: &Conversation,
    me: &UserId,
    text: &str,
) -> Result<MessageId> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyMessage.into());
    }

    let id = MessageId::new(uuid::Uuid::new_v4().simple().to_string());
    let message = Patch::new()
        .set("senderId", me.as_str())
        .set("text", text)
        .set("type", "text")
        .set("isDeleted", false)
        .set("deletedFor", json!({}))
        .server_timestamp("createdAt");

    let mut preview = Patch::new()
        .set("lastMessage", text)
        .set("lastMessageId", id.as_str())
        .set("lastMessageSenderId", me.as_str())
        .server_timestamp("lastMessageAt")
        .server_timestamp("updatedAt");
    for member in &chat.members {
        preview = preview.delete(member_field("hiddenFor", member));
    }
    for recipient in chat.peers(me) {
        preview = preview.increment(member_field("unread", recipient), 1);
    }

    let mut batch = WriteBatch::new();
    batch
        .set_merge(message_path(&chat.id, &id), message)
        .update(chat_path(&chat.id), preview);
    store.commit(batch).await?;

    debug!(chat = %chat.id, message = %id, "Message sent");
    Ok(id)
}

pub async fn edit_message(
    store: &StoreHandle,
    chat: &Conversation,
    me: &UserId,
    message: &Message,
    new_text: &str,
) -> Result<()> {
    check_own(message, me)?;
    let text = new_text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyMessage.into());
    }

    let mut batch = WriteBatch::new();
    batch.update(
        message_path(&chat.id, &message.id),
        Patch::new().set("text", text).server_timestamp("editedAt"),
    );
    if is_latest(chat, message) {
        batch.update(chat_path(&chat.id), Patch::new().set("lastMessage", text));
    }
    store.commit(batch).await?;

    debug!(chat = %chat.id, message = %message.id, "Message edited");
    Ok(())
}

/// Hide a message from my own view only.
pub async fn delete_for_me(
    store: &StoreHandle,
    chat: &ConversationId,
    message: &MessageId,
    me: &UserId,
) -> Result<()> {
    store
        .update(
            message_path(chat, message),
            Patch::new().set(member_field("deletedFor", me), true),
        )
        .await?;
    debug!(chat = %chat, message = %message, "Message deleted for me");
    Ok(())
}

/// Turn my message into a tombstone for everyone.
pub async fn delete_for_everyone(
    store: &StoreHandle,
    chat: &Conversation,
    me: &UserId,
    message: &Message,
) -> Result<()> {
    check_own(message, me)?;

    let mut batch = WriteBatch::new();
    batch.update(
        message_path(&chat.id, &message.id),
        Patch::new()
            .set("text", "")
            .set("isDeleted", true)
            .server_timestamp("deletedAt"),
    );
    if is_latest(chat, message) {
        batch.update(
            chat_path(&chat.id),
            Patch::new().set("lastMessage", DELETED_PLACEHOLDER),
        );
    }
    store.commit(batch).await?;

    info!(chat = %chat.id, message = %message.id, "Message deleted for everyone");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::conversations::ensure_dm;
    use crate::ClientError;
    use palaver_shared::UserProfile;
    use palaver_store::{spawn_store, StoreConfig};

    fn profile(uid: &str) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            display_name: uid.to_uppercase(),
            ..Default::default()
        }
    }

    async fn setup() -> (StoreHandle, ConversationId) {
        let store = spawn_store(StoreConfig::default());
        let id = ensure_dm(&store, &profile("a"), &profile("b")).await.unwrap();
        (store, id)
    }

    async fn chat(store: &StoreHandle, id: &ConversationId) -> Conversation {
        let doc = store.get(chat_path(id)).await.unwrap().unwrap();
        Conversation::from_document(&doc.id, &doc.data).unwrap()
    }

    async fn message(store: &StoreHandle, chat: &ConversationId, id: &MessageId) -> Message {
        let doc = store.get(message_path(chat, id)).await.unwrap().unwrap();
        Message::from_document(&doc.id, &doc.data).unwrap()
    }

    #[tokio::test]
    async fn test_send_updates_preview_and_counters() {
        let (store, id) = setup().await;
        let a = UserId::from("a");
        store
            .update(chat_path(&id), Patch::new().set("hiddenFor.b", true))
            .await
            .unwrap();

        let conv = chat(&store, &id).await;
        let mid = send_message(&store, &conv, &a, "  hello  ").await.unwrap();

        let conv = chat(&store, &id).await;
        assert_eq!(conv.last_message, "hello");
        assert_eq!(conv.last_message_id, Some(mid.clone()));
        assert_eq!(conv.last_message_sender_id, Some(a.clone()));
        assert_eq!(conv.unread_for(&UserId::from("b")), 1);
        assert_eq!(conv.unread_for(&a), 0);
        assert!(!conv.is_hidden_for(&UserId::from("b")));

        let msg = message(&store, &id, &mid).await;
        assert_eq!(msg.text, "hello");
        assert!(msg.created_at.is_some());
    }

    #[tokio::test]
    async fn test_send_rejects_blank() {
        let (store, id) = setup().await;
        let conv = chat(&store, &id).await;
        let err = send_message(&store, &conv, &UserId::from("a"), " \n ")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_edit_refreshes_preview_only_for_latest() {
        let (store, id) = setup().await;
        let a = UserId::from("a");
        let conv = chat(&store, &id).await;
        let first = send_message(&store, &conv, &a, "one").await.unwrap();
        let conv = chat(&store, &id).await;
        let second = send_message(&store, &conv, &a, "two").await.unwrap();

        let conv = chat(&store, &id).await;
        let old = message(&store, &id, &first).await;
        edit_message(&store, &conv, &a, &old, "uno").await.unwrap();
        assert_eq!(chat(&store, &id).await.last_message, "two");

        let latest = message(&store, &id, &second).await;
        edit_message(&store, &conv, &a, &latest, "dos").await.unwrap();
        assert_eq!(chat(&store, &id).await.last_message, "dos");

        let edited = message(&store, &id, &second).await;
        assert!(edited.is_edited());
        assert_eq!(edited.text, "dos");
    }

    #[tokio::test]
    async fn test_only_sender_may_edit_or_delete() {
        let (store, id) = setup().await;
        let conv = chat(&store, &id).await;
        let mid = send_message(&store, &conv, &UserId::from("a"), "mine")
            .await
            .unwrap();
        let msg = message(&store, &id, &mid).await;
        let b = UserId::from("b");

        assert!(edit_message(&store, &conv, &b, &msg, "x").await.is_err());
        assert!(delete_for_everyone(&store, &conv, &b, &msg).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_for_everyone_tombstones() {
        let (store, id) = setup().await;
        let a = UserId::from("a");
        let conv = chat(&store, &id).await;
        let mid = send_message(&store, &conv, &a, "oops").await.unwrap();

        let conv = chat(&store, &id).await;
        let msg = message(&store, &id, &mid).await;
        delete_for_everyone(&store, &conv, &a, &msg).await.unwrap();

        let msg = message(&store, &id, &mid).await;
        assert!(msg.is_tombstone());
        assert!(msg.text.is_empty());
        assert!(msg.deleted_at.is_some());
        assert_eq!(chat(&store, &id).await.last_message, DELETED_PLACEHOLDER);

        let err = edit_message(&store, &conv, &a, &msg, "again").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::MessageDeleted)
        ));
    }

    #[tokio::test]
    async fn test_delete_for_me_and_listen() {
        let (store, id) = setup().await;
        let a = UserId::from("a");
        let conv = chat(&store, &id).await;
        let mid = send_message(&store, &conv, &a, "hi").await.unwrap();

        let mut feed = listen_messages(&store, &id, 300).await.unwrap();
        let msgs = feed.next().await.unwrap().unwrap();
        assert_eq!(msgs.len(), 1);

        delete_for_me(&store, &id, &mid, &UserId::from("b")).await.unwrap();
        let msgs = feed.next().await.unwrap().unwrap();
        assert!(msgs[0].is_hidden_for(&UserId::from("b")));
        assert!(!msgs[0].is_hidden_for(&a));
        feed.close().await;
    }
}
