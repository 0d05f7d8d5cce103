//! Client tuning knobs loaded from environment variables.

use std::time::Duration;

use palaver_shared::constants::{
    CONVERSATION_WINDOW, MESSAGE_WINDOW, NEAR_BOTTOM_PX, PRESENCE_HEARTBEAT_SECS,
    PRESENCE_THRESHOLD_MS, TYPING_CLEAR_DELAY_MS, TYPING_THRESHOLD_MS,
};
use tracing::warn;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// A peer counts as online only if its last heartbeat is younger than this.
    /// Env: `PALAVER_PRESENCE_THRESHOLD_MS`
    pub presence_threshold_ms: u64,

    /// A typing timestamp older than this is ignored.
    /// Env: `PALAVER_TYPING_THRESHOLD_MS`
    pub typing_threshold_ms: u64,

    /// Inactivity before the composer clears its own typing flag.
    /// Env: `PALAVER_TYPING_CLEAR_MS`
    pub typing_clear_delay: Duration,

    /// Presence heartbeat period while visible.
    /// Env: `PALAVER_HEARTBEAT_SECS`
    pub heartbeat_interval: Duration,

    /// Most recent messages loaded per conversation.
    /// Env: `PALAVER_MESSAGE_WINDOW`
    pub message_window: usize,

    /// Conversations loaded for the inbox.
    /// Env: `PALAVER_CONVERSATION_WINDOW`
    pub conversation_window: usize,

    /// A viewer within this many pixels of the bottom is "at the bottom".
    /// Env: `PALAVER_NEAR_BOTTOM_PX`
    pub near_bottom_px: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            presence_threshold_ms: PRESENCE_THRESHOLD_MS,
            typing_threshold_ms: TYPING_THRESHOLD_MS,
            typing_clear_delay: Duration::from_millis(TYPING_CLEAR_DELAY_MS),
            heartbeat_interval: Duration::from_secs(PRESENCE_HEARTBEAT_SECS),
            message_window: MESSAGE_WINDOW,
            conversation_window: CONVERSATION_WINDOW,
            near_bottom_px: NEAR_BOTTOM_PX,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %val, "Invalid value, using default");
            None
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("PALAVER_PRESENCE_THRESHOLD_MS") {
            config.presence_threshold_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("PALAVER_TYPING_THRESHOLD_MS") {
            config.typing_threshold_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("PALAVER_TYPING_CLEAR_MS") {
            config.typing_clear_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("PALAVER_HEARTBEAT_SECS") {
            if secs > 0 {
                config.heartbeat_interval = Duration::from_secs(secs);
            } else {
                warn!("PALAVER_HEARTBEAT_SECS must be positive, using default");
            }
        }
        if let Some(n) = env_parse::<usize>("PALAVER_MESSAGE_WINDOW") {
            config.message_window = n;
        }
        if let Some(n) = env_parse::<usize>("PALAVER_CONVERSATION_WINDOW") {
            config.conversation_window = n;
        }
        if let Some(px) = env_parse::<f32>("PALAVER_NEAR_BOTTOM_PX") {
            config.near_bottom_px = px;
        }

        config
    }
}
