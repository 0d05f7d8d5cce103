use thiserror::Error;

/// Input rejected before any backend call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Group name cannot be empty")]
    EmptyGroupName,

    #[error("Select at least {required} people for a group (selected {selected})")]
    NotEnoughInvitees { required: usize, selected: usize },

    #[error("Password must be at least {min} characters.")]
    PasswordTooShort { min: usize },

    #[error("Name cannot be empty.")]
    EmptyDisplayName,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Only the sender can change this message")]
    NotOwnMessage,

    #[error("This message was deleted")]
    MessageDeleted,
}
