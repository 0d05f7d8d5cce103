//! Backend configuration loaded from environment variables.
//!
//! Every setting has a default, so tests and local runs need no
//! configuration at all.

use std::time::Duration;

use palaver_shared::constants::MIN_PASSWORD_LEN;

/// Store and auth service configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether filtered + ordered queries are served.  When `false`, such a
    /// query fails with `QueryUnsupported`, as a backend missing the
    /// composite index would.
    /// Env: `PALAVER_ORDERED_QUERIES` (true/false)
    /// Default: `true`
    pub ordered_queries: bool,

    /// Capacity of the command channel into the store task.
    /// Env: `PALAVER_STORE_BUFFER`
    /// Default: `256`
    pub command_buffer: usize,

    /// Sensitive account changes (password) require a sign-in at most this
    /// old.
    /// Env: `PALAVER_RECENT_LOGIN_SECS`
    /// Default: `300`
    pub recent_login_window: Duration,

    /// Shortest password accepted at sign-up or password change.
    pub min_password_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ordered_queries: true,
            command_buffer: 256,
            recent_login_window: Duration::from_secs(300),
            min_password_len: MIN_PASSWORD_LEN,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PALAVER_ORDERED_QUERIES") {
            config.ordered_queries = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("PALAVER_STORE_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.command_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid PALAVER_STORE_BUFFER, using default"),
            }
        }

        if let Ok(val) = std::env::var("PALAVER_RECENT_LOGIN_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.recent_login_window = Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid PALAVER_RECENT_LOGIN_SECS, using default")
                }
            }
        }

        config
    }
}
