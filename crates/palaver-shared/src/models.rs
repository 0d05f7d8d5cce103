//! Documents exchanged with the backend.
//!
//! Every struct decodes leniently because live feeds may deliver documents
//! that were written by older clients or that are only partially synced:
//! missing fields take their default (`#[serde(default)]`) and null or
//! mistyped fields do too (see `lenient`).  The document id is not part of the stored fields; it is
//! attached by [`Conversation::from_document`] / [`Message::from_document`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DM_TITLE, DEFAULT_GROUP_TITLE};
use crate::time::Timestamp;
use crate::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Public profile document, one per account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub uid: UserId,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub email: String,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub display_name: String,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub phone: Option<String>,
    #[serde(rename = "photoURL", deserialize_with = "crate::lenient::or_default")]
    pub photo_url: Option<String>,
    /// Flag written by the owner's client; only meaningful together with
    /// `last_seen`.
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub is_online: bool,
    pub last_seen: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
}

impl UserProfile {
    pub fn from_document(data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(data.clone())
    }

    /// Display name, falling back to the local part of the email.
    pub fn label(&self) -> String {
        let name = self.display_name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        self.email
            .split('@')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("?")
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    #[default]
    Dm,
    Group,
}

/// Conversation metadata (DM or group).
///
/// `members` and `member_names` are index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Conversation {
    #[serde(skip)]
    pub id: ConversationId,
    #[serde(rename = "type", deserialize_with = "crate::lenient::or_default")]
    pub kind: ConversationKind,
    #[serde(deserialize_with = "crate::lenient::entries")]
    pub members: Vec<UserId>,
    #[serde(deserialize_with = "crate::lenient::entries")]
    pub member_names: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::entries")]
    pub member_emails: Vec<String>,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub title: Option<String>,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub created_by: Option<UserId>,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub last_message: String,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub last_message_id: Option<MessageId>,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub last_message_sender_id: Option<UserId>,
    pub last_message_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    #[serde(deserialize_with = "crate::lenient::per_member")]
    pub unread: HashMap<UserId, i64>,
    #[serde(deserialize_with = "crate::lenient::per_member")]
    pub last_read_at: HashMap<UserId, Timestamp>,
    #[serde(deserialize_with = "crate::lenient::per_member")]
    pub typing: HashMap<UserId, Timestamp>,
    #[serde(deserialize_with = "crate::lenient::per_member")]
    pub hidden_for: HashMap<UserId, bool>,
}

impl Conversation {
    pub fn from_document(
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let mut conversation: Self = serde_json::from_value(data.clone())?;
        conversation.id = ConversationId::new(id);
        Ok(conversation)
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }

    /// Every member except `me`.
    pub fn peers<'a>(&'a self, me: &'a UserId) -> impl Iterator<Item = &'a UserId> + 'a {
        self.members.iter().filter(move |m| *m != me)
    }

    /// Name of the other DM member: the entry at the opposite index of `me`.
    pub fn other_member_name(&self, me: &UserId) -> Option<&str> {
        let idx = if self.members.first() == Some(me) { 1 } else { 0 };
        self.member_names
            .get(idx)
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    /// Title shown for this conversation to `me`.
    pub fn title_for(&self, me: &UserId) -> String {
        match self.kind {
            ConversationKind::Group => self
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_GROUP_TITLE)
                .to_string(),
            ConversationKind::Dm => self
                .other_member_name(me)
                .unwrap_or(DEFAULT_DM_TITLE)
                .to_string(),
        }
    }

    pub fn is_hidden_for(&self, uid: &UserId) -> bool {
        self.hidden_for.get(uid).copied().unwrap_or(false)
    }

    /// Unread counter for `uid`, clamped to zero.
    pub fn unread_for(&self, uid: &UserId) -> u32 {
        self.unread
            .get(uid)
            .copied()
            .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
}

/// A single chat message, stored under its conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    #[serde(skip)]
    pub id: MessageId,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub sender_id: UserId,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub text: String,
    #[serde(rename = "type", deserialize_with = "crate::lenient::or_default")]
    pub kind: MessageKind,
    /// `None` until the server has assigned the creation time.
    pub created_at: Option<Timestamp>,
    pub edited_at: Option<Timestamp>,
    #[serde(deserialize_with = "crate::lenient::or_default")]
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
    #[serde(deserialize_with = "crate::lenient::per_member")]
    pub deleted_for: HashMap<UserId, bool>,
}

impl Message {
    pub fn from_document(id: &str, data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut message: Self = serde_json::from_value(data.clone())?;
        message.id = MessageId::new(id);
        Ok(message)
    }

    /// Deleted for everyone.
    pub fn is_tombstone(&self) -> bool {
        self.is_deleted
    }

    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some() && !self.is_deleted
    }

    pub fn is_hidden_for(&self, uid: &UserId) -> bool {
        self.deleted_for.get(uid).copied().unwrap_or(false)
    }
}
