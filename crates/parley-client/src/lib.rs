//! # parley-client
//!
//! Embedding surface for the chat core: picks a document store from the
//! environment, installs the tracing subscriber, and exposes the directory,
//! channel, presence and call operations behind one handle.

pub mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use parley_shared::{MediaKind, UserId};
use parley_store::{DocumentStore, MemoryStore, SqliteStore};
use parley_sync::{
    CallSession, CallTransport, ConversationDirectory, DirectoryFeed, MessageChannel, Presence,
    Profile, User,
};

use crate::config::{Backend, ClientConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the chat crates log at debug and
/// everything else at warn.  Calling this twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_sync=debug,parley_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// One signed-in client session's view of the chat core.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn DocumentStore>,
    directory: ConversationDirectory,
    presence: Presence,
}

impl Client {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            directory: ConversationDirectory::new(store.clone()),
            presence: Presence::new(store.clone()),
            store,
        }
    }

    /// Open the store selected by `config`.
    pub fn connect(config: &ClientConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.backend {
            Backend::Memory => {
                tracing::warn!("using in-memory store, nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
            Backend::Sqlite => {
                let store = match &config.db_path {
                    Some(path) => SqliteStore::open_at(path)
                        .with_context(|| format!("opening database at {}", path.display()))?,
                    None => SqliteStore::open_default().context("opening default database")?,
                };
                Arc::new(store)
            }
        };

        tracing::info!(backend = ?config.backend, "client connected");
        Ok(Self::new(store))
    }

    /// The underlying document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn sign_in(&self, profile: &Profile) -> anyhow::Result<User> {
        Ok(self.presence.sign_in(profile).await?)
    }

    pub async fn sign_out(&self, user: &UserId) -> anyhow::Result<()> {
        Ok(self.presence.sign_out(user).await?)
    }

    /// Live list of `current`'s conversations.
    pub fn list_conversations(&self, current: &UserId) -> DirectoryFeed {
        self.directory.list_conversations(current)
    }

    pub async fn open_channel(
        &self,
        current: &UserId,
        correspondent: &UserId,
    ) -> anyhow::Result<MessageChannel> {
        MessageChannel::open(self.store.clone(), current, correspondent)
            .await
            .with_context(|| format!("opening chat with {correspondent}"))
    }

    /// Open the chat with `target` if that user exists.
    pub async fn resolve_and_open(
        &self,
        current: &UserId,
        target: &UserId,
    ) -> anyhow::Result<Option<(User, MessageChannel)>> {
        Ok(self.directory.resolve_and_open(current, target).await?)
    }

    /// Prepare a call with `correspondent`; nothing is joined until
    /// [`CallSession::join`].
    pub fn call(
        &self,
        transport: Arc<dyn CallTransport>,
        current: &UserId,
        correspondent: &UserId,
        kind: MediaKind,
    ) -> CallSession {
        CallSession::new(transport, current, correspondent, kind)
    }
}
