//! Conversation list reconciliation.
//!
//! [`ConversationList`] keeps the latest feed snapshot plus local UI inputs
//! (search text, open conversation) and derives the rows to render.  Every
//! call to [`ConversationList::rows`] recomputes from scratch, so applying the
//! same snapshot twice is harmless.

use palaver_shared::{to_millis, Conversation, ConversationId, ConversationKind, UserId};

use crate::receipts::preview_read;
use crate::typing::is_typing;

/// One rendered inbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub title: String,
    pub preview: String,
    /// The last message was sent by me (rendered with a `You:` prefix).
    pub preview_is_mine: bool,
    /// My last message has been read by everyone else.
    pub preview_read: bool,
    /// Unread counter, only when positive and the row is not open.
    pub unread_badge: Option<u32>,
    pub typing: bool,
    pub is_active: bool,
    pub updated_at_ms: u64,
}

impl ConversationRow {
    /// Preview line as displayed.
    pub fn preview_text(&self) -> String {
        if self.preview_is_mine && !self.preview.is_empty() {
            format!("You: {}", self.preview)
        } else {
            self.preview.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationList {
    me: UserId,
    typing_threshold_ms: u64,
    search: String,
    active: Option<ConversationId>,
    snapshot: Vec<Conversation>,
    ordered: bool,
}

impl ConversationList {
    pub fn new(me: UserId, typing_threshold_ms: u64) -> Self {
        Self {
            me,
            typing_threshold_ms,
            search: String::new(),
            active: None,
            snapshot: Vec::new(),
            ordered: true,
        }
    }

    /// Replace the input wholesale.  `ordered` tells whether the feed already
    /// delivers conversations newest first.
    pub fn apply_snapshot(&mut self, conversations: Vec<Conversation>, ordered: bool) {
        self.snapshot = conversations;
        self.ordered = ordered;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_active(&mut self, active: Option<ConversationId>) {
        self.active = active;
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.snapshot.iter().find(|c| &c.id == id)
    }

    pub fn rows(&self, now_ms: u64) -> Vec<ConversationRow> {
        let needle = self.search.trim().to_lowercase();

        let mut rows: Vec<ConversationRow> = self
            .snapshot
            .iter()
            .filter(|c| !c.is_hidden_for(&self.me))
            .filter_map(|c| {
                let title = c.title_for(&self.me);
                if !needle.is_empty()
                    && !title.to_lowercase().contains(&needle)
                    && !c.last_message.to_lowercase().contains(&needle)
                {
                    return None;
                }
                Some(self.row(c, title, now_ms))
            })
            .collect();

        if !self.ordered {
            // Stable: equal timestamps keep feed order.
            rows.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        }
        rows
    }

    fn row(&self, c: &Conversation, title: String, now_ms: u64) -> ConversationRow {
        let is_active = self.active.as_ref() == Some(&c.id);
        let unread = c.unread_for(&self.me);
        let peers: Vec<&UserId> = c.peers(&self.me).collect();

        ConversationRow {
            id: c.id.clone(),
            kind: c.kind,
            title,
            preview: c.last_message.clone(),
            preview_is_mine: c.last_message_sender_id.as_ref() == Some(&self.me),
            preview_read: preview_read(c, &self.me),
            unread_badge: (unread > 0 && !is_active).then_some(unread),
            typing: is_typing(&c.typing, &peers, now_ms, self.typing_threshold_ms),
            is_active,
            updated_at_ms: to_millis(c.updated_at.as_ref()),
        }
    }
}
