//! Presence evaluation and the conversation header status line.
//!
//! The `is_online` flag on a profile is only a claim by its owner's client;
//! a crashed or closed client never clears it.  A peer is therefore online
//! only while its heartbeat (`last_seen`) is also fresh.

use palaver_shared::{to_millis, Conversation, Timestamp, UserId, UserProfile};

use crate::typing::is_typing;

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

pub fn is_online(user: &UserProfile, now_ms: u64, threshold_ms: u64) -> bool {
    if !user.is_online {
        return false;
    }
    let seen = to_millis(user.last_seen.as_ref());
    seen > 0 && now_ms.saturating_sub(seen) < threshold_ms
}

/// Human "last seen" text for a peer that is not online.
pub fn last_seen_label(last_seen: Option<&Timestamp>, now_ms: u64) -> String {
    let seen = to_millis(last_seen);
    if seen == 0 {
        return "last seen recently".to_string();
    }

    let elapsed = now_ms.saturating_sub(seen);
    if elapsed < MINUTE_MS {
        "last seen just now".to_string()
    } else if elapsed < HOUR_MS {
        format!("last seen {} min ago", elapsed / MINUTE_MS)
    } else if elapsed < DAY_MS {
        format!("last seen {}h ago", elapsed / HOUR_MS)
    } else {
        format!("last seen {}d ago", elapsed / DAY_MS)
    }
}

/// Thresholds the header needs.
#[derive(Debug, Clone, Copy)]
pub struct StatusThresholds {
    pub presence_ms: u64,
    pub typing_ms: u64,
}

/// Subtitle under the conversation title.
///
/// DM: `typing...`, then `online`, then the last-seen label.  Group:
/// `typing...` when any member is typing, otherwise the member names.
pub fn header_status(
    conversation: &Conversation,
    me: &UserId,
    peer: Option<&UserProfile>,
    now_ms: u64,
    thresholds: StatusThresholds,
) -> String {
    let peers: Vec<&UserId> = conversation.peers(me).collect();
    if is_typing(&conversation.typing, &peers, now_ms, thresholds.typing_ms) {
        return "typing...".to_string();
    }

    if conversation.is_group() {
        return conversation
            .member_names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
    }

    match peer {
        Some(user) if is_online(user, now_ms, thresholds.presence_ms) => "online".to_string(),
        Some(user) => last_seen_label(user.last_seen.as_ref(), now_ms),
        None => last_seen_label(None, now_ms),
    }
}
