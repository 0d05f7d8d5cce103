//! Delivery status ("ticks") for outgoing messages.

use palaver_shared::{to_millis, Conversation, Message, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryStatus {
    /// The server has not assigned a creation time yet.
    Sent,
    /// Stored, but not yet read by every recipient.
    Delivered,
    /// Every recipient has read up to (or past) this message.
    Read,
}

/// True if every member except `sender` has a resolved read mark at or after
/// `created_ms`.  A conversation with no other members is trivially read.
fn read_by_all(conversation: &Conversation, sender: &UserId, created_ms: u64) -> bool {
    conversation.peers(sender).all(|member| {
        let read_at = to_millis(conversation.last_read_at.get(member));
        read_at > 0 && created_ms <= read_at
    })
}

pub fn delivery_status(message: &Message, conversation: &Conversation) -> DeliveryStatus {
    let created = to_millis(message.created_at.as_ref());
    if created == 0 {
        return DeliveryStatus::Sent;
    }
    if read_by_all(conversation, &message.sender_id, created) {
        DeliveryStatus::Read
    } else {
        DeliveryStatus::Delivered
    }
}

/// Status shown next to a message: only the sender sees ticks.
pub fn message_status(
    message: &Message,
    is_mine: bool,
    conversation: &Conversation,
) -> Option<DeliveryStatus> {
    is_mine.then(|| delivery_status(message, conversation))
}

/// Read tick on a conversation row: the last message is mine, its time is
/// resolved and every other member has read it.
pub fn preview_read(conversation: &Conversation, me: &UserId) -> bool {
    if conversation.last_message_sender_id.as_ref() != Some(me) {
        return false;
    }
    let at = to_millis(conversation.last_message_at.as_ref());
    at > 0 && read_by_all(conversation, me, at)
}
