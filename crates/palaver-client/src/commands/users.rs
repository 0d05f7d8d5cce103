//! User profile documents.

use palaver_shared::constants::USERS_COLLECTION;
use palaver_shared::{UserId, UserProfile};
use palaver_store::{AuthUser, Patch, StoreHandle};
use serde_json::Value;
use tracing::debug;

use super::{decode_all, user_path, FromDocument};
use crate::error::Result;

/// Create (or overwrite) the profile document for a fresh account.
pub async fn create_user_doc(
    store: &StoreHandle,
    user: &AuthUser,
    display_name: &str,
) -> Result<()> {
    let patch = Patch::new()
        .set("uid", user.uid.as_str())
        .set("email", user.email.as_str())
        .set("displayName", display_name)
        .set("photoURL", Value::Null)
        .set("isOnline", true)
        .server_timestamp("createdAt")
        .server_timestamp("lastSeen");
    store.set_merge(user_path(&user.uid), patch).await?;
    debug!(uid = %user.uid, "User document created");
    Ok(())
}

pub async fn get_user(store: &StoreHandle, uid: &UserId) -> Result<Option<UserProfile>> {
    match store.get(user_path(uid)).await? {
        Some(doc) => Ok(Some(UserProfile::from_snapshot(&doc)?)),
        None => Ok(None),
    }
}

pub async fn fetch_all_users(store: &StoreHandle) -> Result<Vec<UserProfile>> {
    let docs = store.list(USERS_COLLECTION).await?;
    Ok(decode_all(&docs))
}

/// Case-insensitive substring match on email or display name, never
/// including `me`.  A blank query matches nobody.
pub fn filter_users<'a>(
    users: &'a [UserProfile],
    me: &UserId,
    query: &str,
) -> Vec<&'a UserProfile> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    users
        .iter()
        .filter(|u| &u.uid != me)
        .filter(|u| {
            u.email.to_lowercase().contains(&needle)
                || u.display_name.to_lowercase().contains(&needle)
        })
        .collect()
}

pub async fn search_users(
    store: &StoreHandle,
    me: &UserId,
    query: &str,
) -> Result<Vec<UserProfile>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let users = fetch_all_users(store).await?;
    Ok(filter_users(&users, me, query).into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_store::{spawn_store, StoreConfig};

    fn user(uid: &str, email: &str, name: &str) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            email: email.into(),
            display_name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_users() {
        let users = vec![
            user("me", "me@x.io", "Me"),
            user("b", "bob@x.io", "Bob"),
            user("c", "carol@x.io", "Carol Bobson"),
            user("d", "dave@x.io", "Dave"),
        ];
        let me = UserId::from("me");
        let found: Vec<&str> = filter_users(&users, &me, " BOB ")
            .iter()
            .map(|u| u.uid.as_str())
            .collect();
        assert_eq!(found, vec!["b", "c"]);
        assert!(filter_users(&users, &me, "").is_empty());
        assert!(filter_users(&users, &me, "me@").is_empty());
    }

    #[tokio::test]
    async fn test_create_and_fetch_users() {
        let store = spawn_store(StoreConfig::default());
        let alice = AuthUser {
            uid: UserId::from("alice"),
            email: "alice@x.io".into(),
            display_name: None,
        };
        create_user_doc(&store, &alice, "Alice").await.unwrap();

        let profile = get_user(&store, &alice.uid).await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Alice");
        assert!(profile.is_online);
        assert!(profile.created_at.is_some());
        assert!(get_user(&store, &UserId::from("ghost")).await.unwrap().is_none());

        let found = search_users(&store, &UserId::from("bob"), "ali").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(search_users(&store, &alice.uid, "ali").await.unwrap().is_empty());
    }
}
