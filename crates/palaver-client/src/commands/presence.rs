use palaver_shared::{UserId, UserProfile};
use palaver_store::{Patch, StoreHandle};

use super::{user_path, Feed};
use crate::error::Result;

/// Write my online flag together with a fresh heartbeat.
pub async fn set_presence(store: &StoreHandle, me: &UserId, online: bool) -> Result<()> {
    store
        .update(
            user_path(me),
            Patch::new().set("isOnline", online).server_timestamp("lastSeen"),
        )
        .await?;
    Ok(())
}

pub async fn listen_user(store: &StoreHandle, uid: &UserId) -> Result<Feed<UserProfile>> {
    Ok(Feed::new(store.watch_document(user_path(uid)).await?))
}
