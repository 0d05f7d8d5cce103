//! Profile settings: display name, phone, password.

use palaver_shared::constants::{CHATS_COLLECTION, MIN_PASSWORD_LEN};
use palaver_shared::{Conversation, UserId, UserProfile, ValidationError};
use palaver_store::{AuthClient, Patch, Query, StoreHandle, WriteBatch};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::users::get_user;
use super::{chat_path, decode_all, user_path};
use crate::error::{ClientError, Result};

/// Shown after a successful [`save_profile`].
pub const SAVED_MESSAGE: &str = "Saved successfully.";

/// Raw settings form input.  Every field is trimmed before use; an empty
/// password means "keep the current one".
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub name: String,
    pub phone: String,
    pub password: String,
}

/// Rename me in the auth record, my profile document, and the cached name
/// list of every conversation I belong to.
pub async fn update_display_name_everywhere(
    store: &StoreHandle,
    auth: &AuthClient,
    name: &str,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyDisplayName.into());
    }
    let me = auth.current_user().await.ok_or(ClientError::NotSignedIn)?.uid;

    auth.update_display_name(name).await?;
    store
        .update(user_path(&me), Patch::new().set("displayName", name))
        .await?;

    let docs = store
        .query(Query::collection(CHATS_COLLECTION).array_contains("members", me.as_str()))
        .await?;
    let mut batch = WriteBatch::new();
    for conversation in decode_all::<Conversation>(&docs) {
        if let Some(names) = renamed_members(&conversation, &me, name) {
            batch.update(
                chat_path(&conversation.id),
                Patch::new().set("memberNames", json!(names)),
            );
        }
    }
    let touched = batch.len();
    if !batch.is_empty() {
        store.commit(batch).await?;
    }

    info!(uid = %me, conversations = touched, "Display name updated");
    Ok(())
}

/// `memberNames` with my slot replaced, padded to the member count.  `None`
/// when I am not a member or nothing changes.
fn renamed_members(conversation: &Conversation, me: &UserId, name: &str) -> Option<Vec<String>> {
    let index = conversation.members.iter().position(|m| m == me)?;
    let mut names = conversation.member_names.clone();
    if names.len() < conversation.members.len() {
        names.resize(conversation.members.len(), String::new());
    }
    if names[index] == name {
        return None;
    }
    names[index] = name.to_string();
    Some(names)
}

/// Blank clears the phone number.
pub async fn update_phone(store: &StoreHandle, me: &UserId, phone: &str) -> Result<()> {
    let phone = phone.trim();
    let value = if phone.is_empty() {
        Value::Null
    } else {
        Value::from(phone)
    };
    store
        .update(user_path(me), Patch::new().set("phone", value))
        .await?;
    debug!(uid = %me, "Phone updated");
    Ok(())
}

pub async fn update_password(auth: &AuthClient, password: &str) -> Result<()> {
    let password = password.trim();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        }
        .into());
    }
    auth.update_password(password).await?;
    Ok(())
}

/// Apply the settings form and return the refreshed profile.
///
/// The name is only rewritten when it differs from the current one; the phone
/// is always written; the password only when one was entered.  Show
/// [`SAVED_MESSAGE`] on success and [`ClientError::user_message`] otherwise.
pub async fn save_profile(
    store: &StoreHandle,
    auth: &AuthClient,
    form: &ProfileForm,
) -> Result<UserProfile> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyDisplayName.into());
    }
    let user = auth.current_user().await.ok_or(ClientError::NotSignedIn)?;

    let stored = get_user(store, &user.uid).await?;
    let current_name = stored
        .as_ref()
        .map(|p| p.display_name.trim().to_string())
        .filter(|n| !n.is_empty())
        .or(user.display_name.clone())
        .unwrap_or_default();
    if name != current_name {
        update_display_name_everywhere(store, auth, name).await?;
    }

    update_phone(store, &user.uid, &form.phone).await?;

    if !form.password.trim().is_empty() {
        update_password(auth, &form.password).await?;
    }

    get_user(store, &user.uid)
        .await?
        .ok_or(ClientError::UserNotFound(user.uid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::conversations::{create_group, ensure_dm};
    use crate::commands::users::create_user_doc;
    use palaver_store::{spawn_store, AuthError, AuthServer, StoreConfig};
    use std::time::Duration;

    struct Fixture {
        store: StoreHandle,
        auth: AuthClient,
        me: UserProfile,
    }

    async fn fixture(config: StoreConfig) -> Fixture {
        let store = spawn_store(config.clone());
        let auth = AuthServer::new(config).client();
        let user = auth.sign_up("me@x.io", "secret1").await.unwrap();
        create_user_doc(&store, &user, "Me").await.unwrap();
        let me = get_user(&store, &user.uid).await.unwrap().unwrap();
        Fixture { store, auth, me }
    }

    fn peer(uid: &str) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            display_name: uid.to_uppercase(),
            ..Default::default()
        }
    }

    async fn chat(store: &StoreHandle, id: &palaver_shared::ConversationId) -> Conversation {
        let doc = store.get(chat_path(id)).await.unwrap().unwrap();
        Conversation::from_document(&doc.id, &doc.data).unwrap()
    }

    #[tokio::test]
    async fn test_rename_propagates_to_conversations() {
        let f = fixture(StoreConfig::default()).await;
        let dm = ensure_dm(&f.store, &peer("b"), &f.me).await.unwrap();
        let group = create_group(&f.store, &f.me, "Trip", &[peer("b"), peer("c")])
            .await
            .unwrap();

        update_display_name_everywhere(&f.store, &f.auth, "  Maya ")
            .await
            .unwrap();

        let dm = chat(&f.store, &dm).await;
        let slot = dm.members.iter().position(|m| m == &f.me.uid).unwrap();
        assert_eq!(dm.member_names[slot], "Maya");
        assert_eq!(dm.member_names[1 - slot], "B");
        assert_eq!(chat(&f.store, &group).await.member_names[0], "Maya");

        let profile = get_user(&f.store, &f.me.uid).await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Maya");
        let session = f.auth.current_user().await.unwrap();
        assert_eq!(session.display_name.as_deref(), Some("Maya"));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let f = fixture(StoreConfig::default()).await;
        let err = update_display_name_everywhere(&f.store, &f.auth, "   ")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Name cannot be empty.");
    }

    #[tokio::test]
    async fn test_phone_blank_clears() {
        let f = fixture(StoreConfig::default()).await;
        update_phone(&f.store, &f.me.uid, " 555-0100 ").await.unwrap();
        let profile = get_user(&f.store, &f.me.uid).await.unwrap().unwrap();
        assert_eq!(profile.phone.as_deref(), Some("555-0100"));

        update_phone(&f.store, &f.me.uid, "  ").await.unwrap();
        let profile = get_user(&f.store, &f.me.uid).await.unwrap().unwrap();
        assert_eq!(profile.phone, None);
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let f = fixture(StoreConfig::default()).await;
        let err = update_password(&f.auth, " abc ").await.unwrap_err();
        assert_eq!(err.user_message(), "Password must be at least 6 characters.");
        update_password(&f.auth, "longer-secret").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_profile_flow() {
        let f = fixture(StoreConfig::default()).await;
        let form = ProfileForm {
            name: "Me".into(),
            phone: "123".into(),
            password: String::new(),
        };
        let saved = save_profile(&f.store, &f.auth, &form).await.unwrap();
        assert_eq!(saved.display_name, "Me");
        assert_eq!(saved.phone.as_deref(), Some("123"));
        assert_eq!(SAVED_MESSAGE, "Saved successfully.");
    }

    #[tokio::test]
    async fn test_save_profile_requires_recent_login_for_password() {
        let f = fixture(StoreConfig {
            recent_login_window: Duration::ZERO,
            ..Default::default()
        })
        .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let form = ProfileForm {
            name: "Renamed".into(),
            phone: String::new(),
            password: "new-secret".into(),
        };
        let err = save_profile(&f.store, &f.auth, &form).await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::RequiresRecentLogin)));
        assert_eq!(
            err.user_message(),
            "For security, log out and log in again, then change password."
        );

        // Earlier steps of the form still went through.
        let profile = get_user(&f.store, &f.me.uid).await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Renamed");
    }

    #[tokio::test]
    async fn test_not_signed_in() {
        let f = fixture(StoreConfig::default()).await;
        f.auth.sign_out().await;
        let err = save_profile(&f.store, &f.auth, &ProfileForm {
            name: "X".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::NotSignedIn));
    }
}
