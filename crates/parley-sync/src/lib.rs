//! # parley-sync
//!
//! Chat synchronisation over a real-time document store: the live
//! conversation directory, per-conversation message channels with
//! unread-count bookkeeping, presence, and call session wiring.
//!
//! Every entry point takes the current user's id explicitly; nothing here
//! reads ambient session state.

pub mod call;
pub mod channel;
pub mod directory;
pub mod models;
pub mod presence;

mod error;

pub use call::{CallSession, CallTransport};
pub use channel::{ensure_conversation, MessageChannel, MessageSender};
pub use directory::{filter_entries, ConversationDirectory, DirectoryEntry, DirectoryFeed};
pub use error::{CallError, ChatError, RecordKind, Result};
pub use models::{Conversation, Message, User};
pub use presence::{Presence, Profile};
