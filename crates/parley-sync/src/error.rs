use parley_shared::IdError;
use parley_store::StoreError;
use thiserror::Error;

/// Kind of record named in a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Message,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::User => "user",
            RecordKind::Message => "message",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Write failed: {0}")]
    WriteFailure(#[source] StoreError),

    #[error("Read failed: {0}")]
    ReadFailure(#[source] StoreError),

    #[error("Subscription failed: {0}")]
    SubscriptionFailure(#[source] StoreError),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("A conversation needs two distinct participants")]
    SelfConversation,

    #[error("Malformed {kind} record {id}: {reason}")]
    Malformed {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Call transport error: {0}")]
    Transport(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
