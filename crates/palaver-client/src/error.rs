use palaver_shared::{ConversationId, MessageId, UserId, ValidationError};
use palaver_store::{AuthError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Malformed document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),
}

impl ClientError {
    /// Text shown inline to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Auth(AuthError::RequiresRecentLogin) => {
                "For security, log out and log in again, then change password.".to_string()
            }
            ClientError::Store(StoreError::Unavailable(_)) => {
                "You appear to be offline. Try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
