//! Identifiers and constants shared by every parley crate.

pub mod constants;
pub mod error;
pub mod types;

pub use error::IdError;
pub use types::{ConversationId, MediaKind, MessageId, UserId};
