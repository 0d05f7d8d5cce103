//! Message stream reconciliation for one open conversation.
//!
//! [`MessageStream`] turns message snapshots into the visible list and tells
//! the caller what to do about it (scroll, mark read).  It also owns the
//! in-conversation search: the match list and a cyclic cursor over it.

use palaver_shared::constants::DELETED_PLACEHOLDER;
use palaver_shared::{to_millis, Conversation, Message, MessageId, UserId};

use crate::receipts::{message_status, DeliveryStatus};

// ---- Rendering ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Edited(String),
    /// Deleted for everyone; rendered as a fixed placeholder.
    Deleted,
}

impl MessageBody {
    pub fn from_message(message: &Message) -> Self {
        if message.is_tombstone() {
            MessageBody::Deleted
        } else if message.is_edited() {
            MessageBody::Edited(message.text.clone())
        } else {
            MessageBody::Text(message.text.clone())
        }
    }

    pub fn display_text(&self) -> &str {
        match self {
            MessageBody::Text(text) | MessageBody::Edited(text) => text,
            MessageBody::Deleted => DELETED_PLACEHOLDER,
        }
    }

    /// Text that search looks at.  The placeholder is never searchable.
    pub fn searchable_text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) | MessageBody::Edited(text) => Some(text),
            MessageBody::Deleted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: MessageId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub created_at_ms: u64,
    pub is_mine: bool,
    pub status: Option<DeliveryStatus>,
    pub is_current_match: bool,
}

/// Scroll position of the message list, as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub distance_from_bottom: f32,
}

impl Viewport {
    pub fn at_bottom() -> Self {
        Self::default()
    }

    pub fn scrolled_up(by: f32) -> Self {
        Self {
            distance_from_bottom: by,
        }
    }
}

/// What the caller should do after a snapshot was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamUpdate {
    pub scroll_to_bottom: bool,
    pub visible_changed: bool,
    pub mark_read: bool,
}

// ---- Search helpers ----

/// Byte length of the case-insensitive match of `needle` at the start of
/// `hay`, if any.
fn match_at(hay: &str, needle: &str) -> Option<usize> {
    let mut chars = hay.char_indices();
    for nc in needle.chars() {
        let (_, hc) = chars.next()?;
        if !hc.to_lowercase().eq(nc.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(hay.len(), |(i, _)| i))
}

fn find_ci(hay: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    hay.char_indices()
        .find_map(|(start, _)| match_at(&hay[start..], needle).map(|len| (start, start + len)))
}

pub fn contains_ci(hay: &str, needle: &str) -> bool {
    find_ci(hay, needle).is_some()
}

/// A piece of message text, flagged when it matches the search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

/// Split `text` around every case-insensitive occurrence of `query`.
pub fn highlight(text: &str, query: &str) -> Vec<Segment> {
    let query = query.trim();
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some((start, end)) = find_ci(rest, query) {
        if start > 0 {
            segments.push(Segment {
                text: rest[..start].to_string(),
                matched: false,
            });
        }
        segments.push(Segment {
            text: rest[start..end].to_string(),
            matched: true,
        });
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push(Segment {
            text: rest.to_string(),
            matched: false,
        });
    }
    segments
}

#[derive(Debug, Clone, Default)]
struct SearchState {
    query: String,
    matches: Vec<MessageId>,
    cursor: usize,
}

impl SearchState {
    /// Recompute matches.  With `keep_cursor`, the cursor follows the message
    /// it pointed at if that message still matches.
    fn refresh(&mut self, visible: &[Message], keep_cursor: bool) {
        let previous = self.matches.get(self.cursor).cloned();
        let needle = self.query.trim();

        self.matches = if needle.is_empty() {
            Vec::new()
        } else {
            visible
                .iter()
                .filter(|m| {
                    MessageBody::from_message(m)
                        .searchable_text()
                        .is_some_and(|text| contains_ci(text, needle))
                })
                .map(|m| m.id.clone())
                .collect()
        };

        self.cursor = match previous {
            Some(id) if keep_cursor => self.matches.iter().position(|m| *m == id).unwrap_or(0),
            _ => 0,
        };
    }
}

// ---- Stream ----

#[derive(Debug, Clone)]
pub struct MessageStream {
    me: UserId,
    window: usize,
    near_bottom_px: f32,
    loaded: bool,
    visible: Vec<Message>,
    search: SearchState,
}

impl MessageStream {
    pub fn new(me: UserId, window: usize, near_bottom_px: f32) -> Self {
        Self {
            me,
            window,
            near_bottom_px,
            loaded: false,
            visible: Vec::new(),
            search: SearchState::default(),
        }
    }

    /// Apply a snapshot (oldest first).  `viewport` is the scroll position
    /// *before* the update.
    pub fn apply_snapshot(&mut self, messages: Vec<Message>, viewport: Viewport) -> StreamUpdate {
        let first_load = !self.loaded;
        self.loaded = true;

        let skip = messages.len().saturating_sub(self.window);
        let visible: Vec<Message> = messages
            .into_iter()
            .skip(skip)
            .filter(|m| !m.is_hidden_for(&self.me))
            .collect();

        let changed = first_load || visible != self.visible;
        self.visible = visible;
        if changed {
            self.search.refresh(&self.visible, true);
        }

        let near_bottom = viewport.distance_from_bottom <= self.near_bottom_px;
        StreamUpdate {
            scroll_to_bottom: first_load || (changed && near_bottom),
            visible_changed: changed,
            mark_read: changed,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn visible(&self) -> &[Message] {
        &self.visible
    }

    pub fn find(&self, id: &MessageId) -> Option<&Message> {
        self.visible.iter().find(|m| &m.id == id)
    }

    /// Rows to render.  Ticks need the conversation's read marks; without it
    /// no status is shown.
    pub fn rows(&self, conversation: Option<&Conversation>) -> Vec<MessageRow> {
        let current = self.current_match();
        self.visible
            .iter()
            .map(|m| {
                let is_mine = m.sender_id == self.me;
                MessageRow {
                    id: m.id.clone(),
                    sender_id: m.sender_id.clone(),
                    body: MessageBody::from_message(m),
                    created_at_ms: to_millis(m.created_at.as_ref()),
                    is_mine,
                    status: conversation.and_then(|c| message_status(m, is_mine, c)),
                    is_current_match: current == Some(&m.id),
                }
            })
            .collect()
    }

    // ---- Search ----

    /// Change the query.  The cursor goes back to the first match.
    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search.query = query.into();
        self.search.refresh(&self.visible, false);
    }

    pub fn search_query(&self) -> &str {
        &self.search.query
    }

    pub fn matches(&self) -> &[MessageId] {
        &self.search.matches
    }

    pub fn current_match(&self) -> Option<&MessageId> {
        self.search.matches.get(self.search.cursor)
    }

    pub fn next_match(&mut self) -> Option<&MessageId> {
        let n = self.search.matches.len();
        if n == 0 {
            return None;
        }
        self.search.cursor = (self.search.cursor + 1) % n;
        self.current_match()
    }

    pub fn prev_match(&mut self) -> Option<&MessageId> {
        let n = self.search.matches.len();
        if n == 0 {
            return None;
        }
        self.search.cursor = (self.search.cursor + n - 1) % n;
        self.current_match()
    }

    /// `i/n` (1-based) or `0/0`.
    pub fn match_label(&self) -> String {
        match self.search.matches.len() {
            0 => "0/0".to_string(),
            n => format!("{}/{}", self.search.cursor + 1, n),
        }
    }
}
