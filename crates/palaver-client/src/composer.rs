//! Draft, typing signal and optimistic send/edit for one open conversation.

use std::time::Duration;

use palaver_shared::{Conversation, ConversationId, Message, MessageId, UserId, ValidationError};
use palaver_store::StoreHandle;
use tracing::{debug, warn};

use crate::commands::{messages, signals};
use crate::error::Result;
use crate::typing::TypingDebouncer;

/// An edit in progress.
#[derive(Debug, Clone)]
pub struct EditDraft {
    pub message: Message,
    pub text: String,
}

#[derive(Debug)]
pub struct Composer {
    store: StoreHandle,
    me: UserId,
    chat: ConversationId,
    draft: String,
    editing: Option<EditDraft>,
    typing_clear: TypingDebouncer,
}

impl Composer {
    pub fn new(
        store: StoreHandle,
        me: UserId,
        chat: ConversationId,
        typing_clear: Duration,
    ) -> Self {
        Self {
            store,
            me,
            chat,
            draft: String::new(),
            editing: None,
            typing_clear: TypingDebouncer::new(typing_clear),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.chat
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_typing_armed(&self) -> bool {
        self.typing_clear.is_pending()
    }

    /// Store the draft, stamp my typing flag and re-arm the clear timer.
    pub async fn input(&mut self, text: impl Into<String>) {
        self.draft = text.into();

        if let Err(e) = signals::set_typing(&self.store, &self.chat, &self.me, true).await {
            debug!(chat = %self.chat, error = %e, "Typing signal failed");
        }

        let (store, chat, me) = (self.store.clone(), self.chat.clone(), self.me.clone());
        self.typing_clear.arm(async move {
            if let Err(e) = signals::set_typing(&store, &chat, &me, false).await {
                debug!(chat = %chat, error = %e, "Typing clear failed");
            }
        });
    }

    async fn clear_typing(&mut self) {
        self.typing_clear.cancel();
        if let Err(e) = signals::set_typing(&self.store, &self.chat, &self.me, false).await {
            debug!(chat = %self.chat, error = %e, "Typing clear failed");
        }
    }

    /// Send the draft.  The draft is cleared before the write and put back if
    /// the write fails.
    pub async fn send(&mut self, conversation: &Conversation) -> Result<MessageId> {
        if self.draft.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let outgoing = std::mem::take(&mut self.draft);
        self.clear_typing().await;

        match messages::send_message(&self.store, conversation, &self.me, &outgoing).await {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(chat = %self.chat, error = %e, "Send failed, restoring draft");
                self.draft = outgoing;
                Err(e)
            }
        }
    }

    // ---- Editing ----

    pub fn begin_edit(&mut self, message: &Message) -> Result<()> {
        if message.sender_id != self.me {
            return Err(ValidationError::NotOwnMessage.into());
        }
        if message.is_tombstone() {
            return Err(ValidationError::MessageDeleted.into());
        }
        self.editing = Some(EditDraft {
            message: message.clone(),
            text: message.text.clone(),
        });
        Ok(())
    }

    pub fn editing(&self) -> Option<&EditDraft> {
        self.editing.as_ref()
    }

    pub fn set_edit_text(&mut self, text: impl Into<String>) {
        if let Some(edit) = self.editing.as_mut() {
            edit.text = text.into();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Save the open edit.  On failure the edit stays open.  Returns
    /// `Ok(false)` when no edit was open.
    pub async fn save_edit(&mut self, conversation: &Conversation) -> Result<bool> {
        let Some(edit) = self.editing.as_ref() else {
            return Ok(false);
        };
        messages::edit_message(&self.store, conversation, &self.me, &edit.message, &edit.text)
            .await?;
        self.editing = None;
        Ok(true)
    }

    // ---- Deletion ----

    pub async fn delete_for_me(&self, message: &MessageId) -> Result<()> {
        messages::delete_for_me(&self.store, &self.chat, message, &self.me).await
    }

    pub async fn delete_for_everyone(
        &mut self,
        conversation: &Conversation,
        message: &Message,
    ) -> Result<()> {
        messages::delete_for_everyone(&self.store, conversation, &self.me, message).await?;
        if self
            .editing
            .as_ref()
            .is_some_and(|edit| edit.message.id == message.id)
        {
            self.editing = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::chat_path;
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

    async fn setup(delay: Duration) -> (StoreHandle, Composer) {
        let store = spawn_store(StoreConfig::default());
        let id = ensure_dm(&store, &profile("a"), &profile("b")).await.unwrap();
        let composer = Composer::new(store.clone(), UserId::from("a"), id, delay);
        (store, composer)
    }

    async fn chat(store: &StoreHandle, id: &ConversationId) -> Conversation {
        let doc = store.get(chat_path(id)).await.unwrap().unwrap();
        Conversation::from_document(&doc.id, &doc.data).unwrap()
    }

    #[tokio::test]
    async fn test_input_sets_then_clears_typing() {
        let (store, mut composer) = setup(Duration::from_millis(50)).await;
        let id = composer.conversation_id().clone();
        let a = UserId::from("a");

        composer.input("h").await;
        assert!(chat(&store, &id).await.typing.contains_key(&a));
        assert!(composer.is_typing_armed());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!chat(&store, &id).await.typing.contains_key(&a));
        assert!(!composer.is_typing_armed());
    }

    #[tokio::test]
    async fn test_send_clears_draft_and_typing() {
        let (store, mut composer) = setup(Duration::from_secs(5)).await;
        let id = composer.conversation_id().clone();

        composer.input("  hello ").await;
        let conv = chat(&store, &id).await;
        composer.send(&conv).await.unwrap();

        assert_eq!(composer.draft(), "");
        assert!(!composer.is_typing_armed());
        let conv = chat(&store, &id).await;
        assert_eq!(conv.last_message, "hello");
        assert!(conv.typing.is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_restores_draft() {
        let (store, mut composer) = setup(Duration::from_secs(5)).await;
        let conv = chat(&store, composer.conversation_id()).await;

        composer.input("keep me").await;
        store.set_offline(true).await.unwrap();
        let err = composer.send(&conv).await.unwrap_err();
        assert_eq!(err.user_message(), "You appear to be offline. Try again.");
        assert_eq!(composer.draft(), "keep me");
    }

    #[tokio::test]
    async fn test_send_blank_is_rejected() {
        let (store, mut composer) = setup(Duration::from_secs(5)).await;
        let conv = chat(&store, composer.conversation_id()).await;
        composer.input("   ").await;
        let err = composer.send(&conv).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::EmptyMessage)
        ));
        assert_eq!(composer.draft(), "   ");
    }

    #[tokio::test]
    async fn test_edit_flow_keeps_draft_on_failure() {
        let (store, mut composer) = setup(Duration::from_secs(5)).await;
        let id = composer.conversation_id().clone();

        composer.input("first").await;
        let conv = chat(&store, &id).await;
        let mid = composer.send(&conv).await.unwrap();
        let doc = store
            .get(crate::commands::message_path(&id, &mid))
            .await
            .unwrap()
            .unwrap();
        let message = Message::from_document(&doc.id, &doc.data).unwrap();

        composer.begin_edit(&message).unwrap();
        composer.set_edit_text("   ");
        let conv = chat(&store, &id).await;
        assert!(composer.save_edit(&conv).await.is_err());
        assert!(composer.editing().is_some());

        composer.set_edit_text("fixed");
        assert!(composer.save_edit(&conv).await.unwrap());
        assert!(composer.editing().is_none());
        assert_eq!(chat(&store, &id).await.last_message, "fixed");
        assert!(!composer.save_edit(&conv).await.unwrap());
    }

    #[tokio::test]
    async fn test_cannot_edit_others_message() {
        let (_store, mut composer) = setup(Duration::from_secs(5)).await;
        let theirs = Message {
            id: MessageId::from("m1"),
            sender_id: UserId::from("b"),
            text: "hi".into(),
            ..Default::default()
        };
        assert!(composer.begin_edit(&theirs).is_err());
        assert!(composer.editing().is_none());
    }
}
