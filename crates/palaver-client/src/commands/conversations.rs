//! Conversation documents: creation, hiding, and listeners.

use futures::StreamExt;
use palaver_shared::constants::{CHATS_COLLECTION, MIN_GROUP_INVITEES};
use palaver_shared::{
    dm_conversation_id, Conversation, ConversationId, UserId, UserProfile, ValidationError,
};
use palaver_store::{
    Direction, FeedEvent, Patch, Query, StoreError, StoreHandle, Subscription,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{chat_path, decode_all, Feed};
use crate::error::Result;

pub(crate) fn member_field(prefix: &str, uid: &UserId) -> String {
    format!("{prefix}.{uid}")
}

fn zero_counters(members: &[&UserProfile]) -> Value {
    let map: Map<String, Value> = members
        .iter()
        .map(|m| (m.uid.to_string(), Value::from(0)))
        .collect();
    Value::Object(map)
}

fn roster_patch(members: &[&UserProfile]) -> Patch {
    Patch::new()
        .set("members", json!(members.iter().map(|m| &m.uid).collect::<Vec<_>>()))
        .set("memberNames", json!(members.iter().map(|m| m.label()).collect::<Vec<_>>()))
        .set("memberEmails", json!(members.iter().map(|m| &m.email).collect::<Vec<_>>()))
        .set("unread", zero_counters(members))
}

/// Open the DM between `me` and `other`, creating it on first contact.
///
/// Creation only succeeds if the document is absent.  When it already exists
/// (including when the peer created it a moment earlier) the conversation is
/// only un-hidden for `me`; its counters, names and preview are left alone.
pub async fn ensure_dm(
    store: &StoreHandle,
    me: &UserProfile,
    other: &UserProfile,
) -> Result<ConversationId> {
    let id = dm_conversation_id(&me.uid, &other.uid);
    let path = chat_path(&id);

    let patch = roster_patch(&[me, other])
        .set("type", "dm")
        .set("createdBy", me.uid.as_str())
        .set("lastMessage", "")
        .server_timestamp("createdAt")
        .server_timestamp("updatedAt");
    match store.create(path.clone(), patch).await {
        Ok(()) => {
            info!(chat = %id, "DM created");
            Ok(id)
        }
        Err(StoreError::AlreadyExists(_)) => {
            store
                .update(path, Patch::new().delete(member_field("hiddenFor", &me.uid)))
                .await?;
            debug!(chat = %id, "Existing DM reopened");
            Ok(id)
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a group with `me` plus the selected invitees.
pub async fn create_group(
    store: &StoreHandle,
    me: &UserProfile,
    title: &str,
    invitees: &[UserProfile],
) -> Result<ConversationId> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyGroupName.into());
    }

    let mut members: Vec<&UserProfile> = vec![me];
    for invitee in invitees {
        if !members.iter().any(|m| m.uid == invitee.uid) {
            members.push(invitee);
        }
    }
    let selected = members.len() - 1;
    if selected < MIN_GROUP_INVITEES {
        return Err(ValidationError::NotEnoughInvitees {
            required: MIN_GROUP_INVITEES,
            selected,
        }
        .into());
    }

    let patch = roster_patch(&members)
        .set("type", "group")
        .set("title", title)
        .set("createdBy", me.uid.as_str())
        .set("lastMessage", "")
        .server_timestamp("createdAt")
        .server_timestamp("updatedAt");
    let id = ConversationId::new(store.add(CHATS_COLLECTION, patch).await?);
    info!(chat = %id, members = members.len(), "Group created");
    Ok(id)
}

/// "Delete chat" for me: the conversation disappears from my list until a new
/// message arrives or I reopen it.
pub async fn hide_conversation(
    store: &StoreHandle,
    chat: &ConversationId,
    me: &UserId,
) -> Result<()> {
    store
        .update(chat_path(chat), Patch::new().set(member_field("hiddenFor", me), true))
        .await?;
    debug!(chat = %chat, "Conversation hidden");
    Ok(())
}

pub async fn listen_conversation(
    store: &StoreHandle,
    chat: &ConversationId,
) -> Result<Feed<Conversation>> {
    let sub = store.watch_document(chat_path(chat)).await?;
    Ok(Feed::new(sub))
}

// ---- Inbox feed ----

fn my_conversations(me: &UserId, window: usize, ordered: bool) -> Query {
    let query = Query::collection(CHATS_COLLECTION)
        .array_contains("members", me.as_str())
        .limit(window);
    if ordered {
        query.order_by("updatedAt", Direction::Descending)
    } else {
        query
    }
}

/// Live list of my conversations.
///
/// Starts with the ordered query (newest first).  If the backend cannot serve
/// it, the feed switches to the unordered query and reports
/// [`ConversationFeed::is_ordered`] as `false` so the caller sorts locally.
#[derive(Debug)]
pub struct ConversationFeed {
    store: StoreHandle,
    me: UserId,
    window: usize,
    sub: Subscription,
    ordered: bool,
}

impl ConversationFeed {
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Next snapshot, `Ok(None)` once the feed has closed.
    pub async fn next(&mut self) -> Result<Option<Vec<Conversation>>> {
        loop {
            match self.sub.next().await {
                Some(FeedEvent::Snapshot(docs)) => return Ok(Some(decode_all(&docs))),
                Some(FeedEvent::Failed(e)) if self.ordered => {
                    warn!(error = %e, "Ordered conversation query failed, falling back to unordered");
                    let fallback = self
                        .store
                        .watch_query(my_conversations(&self.me, self.window, false))
                        .await?;
                    let failed = std::mem::replace(&mut self.sub, fallback);
                    failed.unsubscribe().await;
                    self.ordered = false;
                }
                Some(FeedEvent::Failed(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    pub async fn close(self) {
        self.sub.unsubscribe().await;
    }
}

pub async fn listen_my_conversations(
    store: &StoreHandle,
    me: &UserId,
    window: usize,
) -> Result<ConversationFeed> {
    let sub = store
        .watch_query(my_conversations(me, window, true))
        .await?;
    Ok(ConversationFeed {
        store: store.clone(),
        me: me.clone(),
        window,
        sub,
        ordered: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_store::{spawn_store, StoreConfig};

    fn profile(uid: &str, name: &str) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            email: format!("{uid}@x.io"),
            display_name: name.into(),
            ..Default::default()
        }
    }

    async fn load(store: &StoreHandle, id: &ConversationId) -> Conversation {
        let doc = store.get(chat_path(id)).await.unwrap().unwrap();
        Conversation::from_document(&doc.id, &doc.data).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_dm_is_symmetric() {
        let store = spawn_store(StoreConfig::default());
        let (alice, bob) = (profile("alice", "Alice"), profile("bob", "Bob"));

        let id = ensure_dm(&store, &alice, &bob).await.unwrap();
        assert_eq!(id.as_str(), "alice_bob");
        assert_eq!(ensure_dm(&store, &bob, &alice).await.unwrap(), id);

        let conv = load(&store, &id).await;
        assert_eq!(conv.members, vec![UserId::from("alice"), UserId::from("bob")]);
        assert_eq!(conv.member_names, vec!["Alice".to_string(), "Bob".to_string()]);
        assert_eq!(conv.unread_for(&UserId::from("bob")), 0);
        assert!(conv.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_ensure_dm_keeps_counters_and_unhides() {
        let store = spawn_store(StoreConfig::default());
        let (alice, bob) = (profile("alice", "Alice"), profile("bob", "Bob"));
        let id = ensure_dm(&store, &alice, &bob).await.unwrap();

        store
            .update(
                chat_path(&id),
                Patch::new()
                    .set("unread.bob", 3)
                    .set("lastMessage", "hey")
                    .set("hiddenFor.alice", true),
            )
            .await
            .unwrap();

        ensure_dm(&store, &alice, &bob).await.unwrap();
        let conv = load(&store, &id).await;
        assert_eq!(conv.unread_for(&UserId::from("bob")), 3);
        assert_eq!(conv.last_message, "hey");
        assert!(!conv.is_hidden_for(&UserId::from("alice")));
    }

    #[tokio::test]
    async fn test_racing_first_contact_keeps_sent_message() {
        let store = spawn_store(StoreConfig::default());
        let (alice, bob) = (profile("alice", "Alice"), profile("bob", "Bob"));

        let alice_side = async {
            let id = ensure_dm(&store, &alice, &bob).await.unwrap();
            let conv = load(&store, &id).await;
            crate::commands::messages::send_message(&store, &conv, &alice.uid, "hello")
                .await
                .unwrap();
            id
        };
        let bob_side = async {
            tokio::task::yield_now().await;
            ensure_dm(&store, &bob, &alice).await.unwrap()
        };
        let (id, other) = tokio::join!(alice_side, bob_side);
        assert_eq!(id, other);

        // Bob opening the chat again must not reset anything either.
        ensure_dm(&store, &bob, &alice).await.unwrap();
        let conv = load(&store, &id).await;
        assert_eq!(conv.last_message, "hello");
        assert_eq!(conv.unread_for(&bob.uid), 1);
    }

    #[tokio::test]
    async fn test_create_group_validation() {
        let store = spawn_store(StoreConfig::default());
        let me = profile("me", "Me");
        let others = vec![profile("b", "B"), profile("c", "C")];

        let err = create_group(&store, &me, "  ", &others).await.unwrap_err();
        assert!(matches!(
            err,
            crate::ClientError::Validation(ValidationError::EmptyGroupName)
        ));

        let dupes = vec![profile("b", "B"), profile("b", "B"), me.clone()];
        let err = create_group(&store, &me, "Trip", &dupes).await.unwrap_err();
        assert!(matches!(
            err,
            crate::ClientError::Validation(ValidationError::NotEnoughInvitees { selected: 1, .. })
        ));

        let id = create_group(&store, &me, " Trip ", &others).await.unwrap();
        let conv = load(&store, &id).await;
        assert!(conv.is_group());
        assert_eq!(conv.title.as_deref(), Some("Trip"));
        assert_eq!(conv.members.len(), 3);
        assert_eq!(conv.created_by, Some(UserId::from("me")));
    }

    #[tokio::test]
    async fn test_hide_conversation() {
        let store = spawn_store(StoreConfig::default());
        let id = ensure_dm(&store, &profile("a", "A"), &profile("b", "B"))
            .await
            .unwrap();
        hide_conversation(&store, &id, &UserId::from("a")).await.unwrap();
        assert!(load(&store, &id).await.is_hidden_for(&UserId::from("a")));

        let missing = ConversationId::from("nope");
        assert!(hide_conversation(&store, &missing, &UserId::from("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_conversation_feed_falls_back_when_unordered() {
        let store = spawn_store(StoreConfig {
            ordered_queries: false,
            ..Default::default()
        });
        ensure_dm(&store, &profile("a", "A"), &profile("b", "B"))
            .await
            .unwrap();

        let mut feed = listen_my_conversations(&store, &UserId::from("a"), 50)
            .await
            .unwrap();
        let first = feed.next().await.unwrap().unwrap();
        assert!(!feed.is_ordered());
        assert_eq!(first.len(), 1);
        feed.close().await;
    }

    #[tokio::test]
    async fn test_conversation_feed_ordered() {
        let store = spawn_store(StoreConfig::default());
        let a = profile("a", "A");
        ensure_dm(&store, &a, &profile("b", "B")).await.unwrap();
        ensure_dm(&store, &a, &profile("c", "C")).await.unwrap();

        let mut feed = listen_my_conversations(&store, &a.uid, 50).await.unwrap();
        let convs = feed.next().await.unwrap().unwrap();
        assert!(feed.is_ordered());
        let ids: Vec<&str> = convs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a_c", "a_b"]);
    }
}
