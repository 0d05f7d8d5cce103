// Data model and pure helpers shared by the store and the client.

pub mod constants;
pub mod error;
mod lenient;
pub mod models;
pub mod time;
pub mod types;

pub use error::ValidationError;
pub use models::{Conversation, ConversationKind, Message, MessageKind, UserProfile};
pub use time::{now_millis, to_millis, Timestamp};
pub use types::{dm_conversation_id, ConversationId, MessageId, UserId};
