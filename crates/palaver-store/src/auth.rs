//! Email/password authentication.
//!
//! [`AuthServer`] is the shared account registry.  Each running app holds its
//! own [`AuthClient`], which tracks who is signed in on that app and
//! broadcasts session changes through a `watch` channel.
//!
//! Passwords are stored as `blake3(salt || password)` with a random per-account
//! salt; hash comparison is constant time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use palaver_shared::UserId;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::config::StoreConfig;

// ---- Errors ----

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("An account already exists for this email")]
    EmailInUse,

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("Wrong email or password")]
    InvalidCredentials,

    #[error("This operation requires a recent sign-in")]
    RequiresRecentLogin,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Account no longer exists")]
    UserNotFound,
}

impl AuthError {
    /// Stable machine-readable code, as surfaced to the UI layer.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::EmailInUse => "auth/email-already-in-use",
            AuthError::WeakPassword { .. } => "auth/weak-password",
            AuthError::InvalidCredentials => "auth/invalid-credential",
            AuthError::RequiresRecentLogin => "auth/requires-recent-login",
            AuthError::NotSignedIn => "auth/no-current-user",
            AuthError::UserNotFound => "auth/user-not-found",
        }
    }
}

// ---- Accounts ----

/// The identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: String,
    pub display_name: Option<String>,
}

struct Account {
    user: AuthUser,
    salt: [u8; 16],
    password_hash: blake3::Hash,
}

fn hash_password(salt: &[u8; 16], password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

#[derive(Default)]
struct Registry {
    /// normalized email -> account
    accounts: HashMap<String, Account>,
}

impl Registry {
    fn by_uid_mut(&mut self, uid: &UserId) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| &a.user.uid == uid)
    }
}

/// Shared account registry.  Clone freely.
#[derive(Clone)]
pub struct AuthServer {
    registry: Arc<Mutex<Registry>>,
    config: Arc<StoreConfig>,
}

impl AuthServer {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            config: Arc::new(config),
        }
    }

    /// A fresh, signed-out client session bound to this registry.
    pub fn client(&self) -> AuthClient {
        let (session_tx, _) = watch::channel(None);
        AuthClient {
            server: self.clone(),
            session: Arc::new(Mutex::new(None)),
            session_tx: Arc::new(session_tx),
        }
    }

    fn check_password(&self, password: &str) -> Result<(), AuthError> {
        let min = self.config.min_password_len;
        if password.chars().count() < min {
            return Err(AuthError::WeakPassword { min });
        }
        Ok(())
    }
}

// ---- Client session ----

struct ActiveSession {
    user: AuthUser,
    signed_in_at: Instant,
}

/// One app's view of authentication.
#[derive(Clone)]
pub struct AuthClient {
    server: AuthServer,
    session: Arc<Mutex<Option<ActiveSession>>>,
    session_tx: Arc<watch::Sender<Option<AuthUser>>>,
}

impl AuthClient {
    /// Create an account and sign it in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        self.server.check_password(password)?;

        let user = {
            let mut registry = self.server.registry.lock().await;
            if registry.accounts.contains_key(&email) {
                return Err(AuthError::EmailInUse);
            }
            let salt: [u8; 16] = rand::random();
            let user = AuthUser {
                uid: UserId::new(hex::encode(rand::random::<[u8; 14]>())),
                email: email.clone(),
                display_name: None,
            };
            registry.accounts.insert(
                email,
                Account {
                    user: user.clone(),
                    salt,
                    password_hash: hash_password(&salt, password),
                },
            );
            user
        };

        info!(uid = %user.uid, "Account created");
        self.start_session(user.clone()).await;
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = {
            let registry = self.server.registry.lock().await;
            let account = registry
                .accounts
                .get(&email)
                .ok_or(AuthError::InvalidCredentials)?;
            if hash_password(&account.salt, password) != account.password_hash {
                return Err(AuthError::InvalidCredentials);
            }
            account.user.clone()
        };

        info!(uid = %user.uid, "Signed in");
        self.start_session(user.clone()).await;
        Ok(user)
    }

    pub async fn sign_out(&self) {
        let previous = self.session.lock().await.take();
        if let Some(session) = previous {
            info!(uid = %session.user.uid, "Signed out");
        }
        self.session_tx.send_replace(None);
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.session.lock().await.as_ref().map(|s| s.user.clone())
    }

    /// Session changes: `Some(user)` after sign-in, `None` after sign-out.
    pub fn watch_session(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session_tx.subscribe()
    }

    pub async fn update_display_name(&self, name: &str) -> Result<AuthUser, AuthError> {
        let uid = self.require_user().await?.uid;
        let user = {
            let mut registry = self.server.registry.lock().await;
            let account = registry.by_uid_mut(&uid).ok_or(AuthError::UserNotFound)?;
            account.user.display_name = Some(name.to_string());
            account.user.clone()
        };

        if let Some(session) = self.session.lock().await.as_mut() {
            session.user = user.clone();
        }
        self.session_tx.send_replace(Some(user.clone()));
        debug!(uid = %uid, "Display name updated");
        Ok(user)
    }

    /// Change the password.  Requires a sign-in younger than the configured
    /// recent-login window.
    pub async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        let (uid, signed_in_at) = {
            let session = self.session.lock().await;
            let session = session.as_ref().ok_or(AuthError::NotSignedIn)?;
            (session.user.uid.clone(), session.signed_in_at)
        };
        self.server.check_password(new_password)?;

        let window: Duration = self.server.config.recent_login_window;
        if signed_in_at.elapsed() > window {
            return Err(AuthError::RequiresRecentLogin);
        }

        let mut registry = self.server.registry.lock().await;
        let account = registry.by_uid_mut(&uid).ok_or(AuthError::UserNotFound)?;
        account.salt = rand::random();
        account.password_hash = hash_password(&account.salt, new_password);
        info!(uid = %uid, "Password changed");
        Ok(())
    }

    async fn require_user(&self) -> Result<AuthUser, AuthError> {
        self.current_user().await.ok_or(AuthError::NotSignedIn)
    }

    async fn start_session(&self, user: AuthUser) {
        *self.session.lock().await = Some(ActiveSession {
            user: user.clone(),
            signed_in_at: Instant::now(),
        });
        self.session_tx.send_replace(Some(user));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> AuthServer {
        AuthServer::new(StoreConfig::default())
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in_elsewhere() {
        let server = server();
        let alice = server.client();
        let created = alice.sign_up("Alice@Example.com", "secret1").await.unwrap();
        assert_eq!(created.email, "alice@example.com");
        assert_eq!(alice.current_user().await, Some(created.clone()));

        let other_device = server.client();
        assert!(other_device.current_user().await.is_none());
        let signed_in = other_device
            .sign_in("alice@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(signed_in.uid, created.uid);
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let client = server().client();
        assert_eq!(
            client.sign_up("nope", "secret1").await.unwrap_err(),
            AuthError::InvalidEmail
        );
        assert_eq!(
            client.sign_up("a@b.co", "123").await.unwrap_err(),
            AuthError::WeakPassword { min: 6 }
        );
        client.sign_up("a@b.co", "123456").await.unwrap();
        assert_eq!(
            client.sign_up("a@b.co", "123456").await.unwrap_err(),
            AuthError::EmailInUse
        );
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let server = server();
        server.client().sign_up("a@b.co", "123456").await.unwrap();
        let err = server.client().sign_in("a@b.co", "654321").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        let err = server.client().sign_in("x@b.co", "123456").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_session_watch() {
        let client = server().client();
        let mut rx = client.watch_session();
        assert!(rx.borrow().is_none());

        client.sign_up("a@b.co", "123456").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());

        client.sign_out().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_update_display_name() {
        let client = server().client();
        assert_eq!(
            client.update_display_name("A").await.unwrap_err(),
            AuthError::NotSignedIn
        );
        client.sign_up("a@b.co", "123456").await.unwrap();
        let user = client.update_display_name("Alice").await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
        assert_eq!(
            client.current_user().await.unwrap().display_name.as_deref(),
            Some("Alice")
        );
    }

    #[tokio::test]
    async fn test_password_change_and_recent_login() {
        let server = server();
        let client = server.client();
        client.sign_up("a@b.co", "123456").await.unwrap();
        client.update_password("abcdef").await.unwrap();
        assert!(server.client().sign_in("a@b.co", "abcdef").await.is_ok());
        assert!(server.client().sign_in("a@b.co", "123456").await.is_err());

        let stale = AuthServer::new(StoreConfig {
            recent_login_window: Duration::ZERO,
            ..Default::default()
        });
        let client = stale.client();
        client.sign_up("a@b.co", "123456").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let err = client.update_password("abcdef").await.unwrap_err();
        assert_eq!(err, AuthError::RequiresRecentLogin);
        assert_eq!(err.code(), "auth/requires-recent-login");
    }
}
