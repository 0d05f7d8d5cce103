/// Application name
pub const APP_NAME: &str = "Palaver";

/// Collection holding one profile document per account
pub const USERS_COLLECTION: &str = "users";

/// Collection holding conversation metadata documents
pub const CHATS_COLLECTION: &str = "chats";

/// Subcollection (under a chat document) holding its messages
pub const MESSAGES_SUBCOLLECTION: &str = "messages";

/// A user counts as online only if their last heartbeat is younger than this
pub const PRESENCE_THRESHOLD_MS: u64 = 60_000;

/// A typing timestamp older than this means the peer stopped typing
pub const TYPING_THRESHOLD_MS: u64 = 2_500;

/// Inactivity delay after which the composer clears its own typing flag
pub const TYPING_CLEAR_DELAY_MS: u64 = 1_200;

/// Presence heartbeat period while the client is visible
pub const PRESENCE_HEARTBEAT_SECS: u64 = 25;

/// Number of most recent messages loaded for an open conversation
pub const MESSAGE_WINDOW: usize = 300;

/// Number of conversations loaded for the conversation list
pub const CONVERSATION_WINDOW: usize = 50;

/// Distance (in pixels) from the bottom still considered "at the bottom"
pub const NEAR_BOTTOM_PX: f32 = 120.0;

/// Text shown in place of a message deleted for everyone
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Minimum password length accepted by the auth service
pub const MIN_PASSWORD_LEN: usize = 6;

/// A group needs at least this many members besides its creator
pub const MIN_GROUP_INVITEES: usize = 2;

/// Fallback titles when a conversation carries no usable name
pub const DEFAULT_GROUP_TITLE: &str = "Group";
pub const DEFAULT_DM_TITLE: &str = "Chat";
