//! Typing flags, unread counters and read marks.
//!
//! These are side-effect writes; callers usually treat failures as best-effort.

use palaver_shared::{ConversationId, UserId};
use palaver_store::{Patch, StoreHandle};

use super::chat_path;
use super::conversations::member_field;
use crate::error::Result;

/// Stamp (or clear) my typing flag with the server clock.
pub async fn set_typing(
    store: &StoreHandle,
    chat: &ConversationId,
    me: &UserId,
    typing: bool,
) -> Result<()> {
    let field = member_field("typing", me);
    let patch = if typing {
        Patch::new().server_timestamp(field)
    } else {
        Patch::new().delete(field)
    };
    store.update(chat_path(chat), patch).await?;
    Ok(())
}

pub async fn bump_unread(
    store: &StoreHandle,
    chat: &ConversationId,
    recipient: &UserId,
) -> Result<()> {
    store
        .update(
            chat_path(chat),
            Patch::new().increment(member_field("unread", recipient), 1),
        )
        .await?;
    Ok(())
}

/// Reset my unread counter and stamp my read mark.
pub async fn mark_read(store: &StoreHandle, chat: &ConversationId, me: &UserId) -> Result<()> {
    store
        .update(
            chat_path(chat),
            Patch::new()
                .set(member_field("unread", me), 0)
                .server_timestamp(member_field("lastReadAt", me)),
        )
        .await?;
    Ok(())
}
