//! Authenticated-session context.
//!
//! A [`Session`] exists only while someone is signed in.  Starting one marks
//! the user online and spawns the presence heartbeat; the heartbeat refreshes
//! `lastSeen` only while the app reports itself visible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use palaver_shared::{ConversationId, UserId, UserProfile};
use palaver_store::{AuthClient, AuthUser, StoreHandle};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::commands::{presence, profile, users};
use crate::composer::Composer;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::views::{ConversationView, InboxView};

pub struct Session {
    store: StoreHandle,
    auth: AuthClient,
    config: Arc<ClientConfig>,
    user: AuthUser,
    visible: Arc<AtomicBool>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Session {
    /// Create an account, write its profile document and start the session.
    /// A blank display name falls back to the local part of the email.
    pub async fn sign_up(
        store: StoreHandle,
        auth: AuthClient,
        config: ClientConfig,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Self> {
        let user = auth.sign_up(email, password).await?;
        let name = match display_name.trim() {
            "" => user.email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };
        let user = auth.update_display_name(&name).await?;
        users::create_user_doc(&store, &user, &name).await?;
        Ok(Self::start(store, auth, config, user).await)
    }

    pub async fn sign_in(
        store: StoreHandle,
        auth: AuthClient,
        config: ClientConfig,
        email: &str,
        password: &str,
    ) -> Result<Self> {
        let user = auth.sign_in(email, password).await?;
        Ok(Self::start(store, auth, config, user).await)
    }

    /// Resume from an auth session that is already signed in.
    pub async fn restore(
        store: StoreHandle,
        auth: AuthClient,
        config: ClientConfig,
    ) -> Option<Self> {
        let user = auth.current_user().await?;
        Some(Self::start(store, auth, config, user).await)
    }

    async fn start(
        store: StoreHandle,
        auth: AuthClient,
        config: ClientConfig,
        user: AuthUser,
    ) -> Self {
        let config = Arc::new(config);
        let visible = Arc::new(AtomicBool::new(true));

        if let Err(e) = presence::set_presence(&store, &user.uid, true).await {
            debug!(uid = %user.uid, error = %e, "Initial presence write failed");
        }

        let heartbeat = {
            let store = store.clone();
            let uid = user.uid.clone();
            let visible = visible.clone();
            let period = config.heartbeat_interval.max(Duration::from_millis(1));
            tokio::spawn(async move {
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if !visible.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(e) = presence::set_presence(&store, &uid, true).await {
                        debug!(uid = %uid, error = %e, "Heartbeat failed");
                    }
                }
            })
        };

        info!(uid = %user.uid, "Session started");
        Self {
            store,
            auth,
            config,
            user,
            visible,
            heartbeat: Some(heartbeat),
        }
    }

    // ---- Accessors ----

    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    pub fn uid(&self) -> &UserId {
        &self.user.uid
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// App visibility changed: hidden reports offline, visible reports online.
    pub async fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
        if let Err(e) = presence::set_presence(&self.store, &self.user.uid, visible).await {
            debug!(uid = %self.user.uid, error = %e, "Visibility presence write failed");
        }
    }

    // ---- Entry points ----

    pub async fn profile(&self) -> Result<Option<UserProfile>> {
        users::get_user(&self.store, &self.user.uid).await
    }

    /// Apply the settings form; the session's cached user picks up a new name.
    pub async fn save_profile(&mut self, form: &profile::ProfileForm) -> Result<UserProfile> {
        let saved = profile::save_profile(&self.store, &self.auth, form).await?;
        if let Some(user) = self.auth.current_user().await {
            self.user = user;
        }
        Ok(saved)
    }

    pub fn composer(&self, chat: ConversationId) -> Composer {
        Composer::new(
            self.store.clone(),
            self.user.uid.clone(),
            chat,
            self.config.typing_clear_delay,
        )
    }

    pub async fn inbox(&self) -> Result<InboxView> {
        InboxView::open(&self.store, &self.user.uid, &self.config).await
    }

    pub async fn open_conversation(&self, chat: &ConversationId) -> Result<ConversationView> {
        ConversationView::open(&self.store, &self.user.uid, chat, &self.config).await
    }

    /// Stop the heartbeat, mark offline (best-effort) and sign out.
    pub async fn sign_out(mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        if let Err(e) = presence::set_presence(&self.store, &self.user.uid, false).await {
            debug!(uid = %self.user.uid, error = %e, "Offline presence write failed");
        }
        self.auth.sign_out().await;
        info!(uid = %self.user.uid, "Session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::is_online;
    use palaver_shared::{now_millis, to_millis};
    use palaver_store::{spawn_store, AuthServer, StoreConfig};

    fn fast_config() -> ClientConfig {
        ClientConfig {
            heartbeat_interval: Duration::from_millis(40),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile_and_goes_online() {
        let store = spawn_store(StoreConfig::default());
        let auth = AuthServer::new(StoreConfig::default()).client();
        let session = Session::sign_up(
            store.clone(),
            auth,
            ClientConfig::default(),
            "maya@example.com",
            "secret1",
            "  ",
        )
        .await
        .unwrap();

        let profile = session.profile().await.unwrap().unwrap();
        assert_eq!(profile.display_name, "maya");
        assert_eq!(profile.email, "maya@example.com");
        assert!(is_online(&profile, now_millis(), 60_000));
        assert_eq!(session.user().display_name.as_deref(), Some("maya"));
    }

    #[tokio::test]
    async fn test_heartbeat_only_while_visible() {
        let store = spawn_store(StoreConfig::default());
        let server = AuthServer::new(StoreConfig::default());
        let session = Session::sign_up(
            store.clone(),
            server.client(),
            fast_config(),
            "a@x.io",
            "secret1",
            "A",
        )
        .await
        .unwrap();

        let seen = |p: &UserProfile| to_millis(p.last_seen.as_ref());
        let before = seen(&session.profile().await.unwrap().unwrap());
        tokio::time::sleep(Duration::from_millis(120)).await;
        let beaten = seen(&session.profile().await.unwrap().unwrap());
        assert!(beaten > before);

        session.set_visible(false).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let hidden = session.profile().await.unwrap().unwrap();
        assert!(!hidden.is_online);
        let frozen = seen(&hidden);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(seen(&session.profile().await.unwrap().unwrap()), frozen);

        session.set_visible(true).await;
        assert!(session.profile().await.unwrap().unwrap().is_online);
    }

    #[tokio::test]
    async fn test_sign_out_marks_offline() {
        let store = spawn_store(StoreConfig::default());
        let auth = AuthServer::new(StoreConfig::default()).client();
        let session = Session::sign_up(
            store.clone(),
            auth.clone(),
            ClientConfig::default(),
            "a@x.io",
            "secret1",
            "A",
        )
        .await
        .unwrap();
        let uid = session.uid().clone();

        session.sign_out().await;
        assert!(auth.current_user().await.is_none());
        let profile = users::get_user(&store, &uid).await.unwrap().unwrap();
        assert!(!profile.is_online);

        assert!(Session::restore(store.clone(), auth.clone(), ClientConfig::default())
            .await
            .is_none());
        Session::sign_in(store, auth.clone(), ClientConfig::default(), "a@x.io", "secret1")
            .await
            .unwrap();
        assert!(auth.current_user().await.is_some());
    }
}
