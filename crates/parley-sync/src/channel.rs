//! Message Channel: the live message log of one conversation plus sending.
//!
//! A [`MessageChannel`] is scoped to a `(me, correspondent)` pair.  Opening it
//! makes sure the shared conversation record exists, then subscribes to the
//! conversation's messages ordered by commit time.  Observing a non-empty
//! snapshot is not read-only: it acknowledges every message for `me` and
//! resets `me`'s unread counter.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use parley_shared::constants::{
    fields, CHATS_COLLECTION, FALLBACK_SENDER_NAME, MESSAGES_COLLECTION, USERS_COLLECTION,
};
use parley_shared::{ConversationId, MessageId, UserId};
use parley_store::{
    CollectionPath, Direction, DocumentStore, Fields, Query, Snapshots, WriteMode,
};

use crate::error::{ChatError, Result};
use crate::models::{unread_field, Conversation, Message, User};

/// Make sure the conversation record for `(me, other)` exists.
///
/// Returns `true` when this call created it.  A fast-path read skips the
/// write when the record is already there; otherwise an atomic
/// create-if-absent is used so a participant racing on the same id can
/// never overwrite a record that now exists.
pub async fn ensure_conversation(
    store: &dyn DocumentStore,
    me: &UserId,
    other: &UserId,
) -> Result<bool> {
    if me == other {
        return Err(ChatError::SelfConversation);
    }

    let chats = CollectionPath::root(CHATS_COLLECTION);
    let id = ConversationId::for_pair(me, other);

    if store
        .get(&chats, id.as_str())
        .await
        .map_err(ChatError::ReadFailure)?
        .is_some()
    {
        return Ok(false);
    }

    let initial = Fields::new()
        .set(fields::PARTICIPANTS, json!([me.as_str(), other.as_str()]))
        .set(fields::LAST_MESSAGE, "")
        .server_timestamp(fields::LAST_MESSAGE_TIME)
        .set(fields::LAST_MESSAGE_SENDER_ID, Value::Null)
        .server_timestamp(fields::CREATED_AT)
        .set(unread_field(me), 0)
        .set(unread_field(other), 0);

    let created = store
        .create(&chats, id.as_str(), initial)
        .await
        .map_err(ChatError::WriteFailure)?;

    if created {
        info!(chat = %id, "conversation created");
    } else {
        debug!(chat = %id, "conversation created concurrently by correspondent");
    }
    Ok(created)
}

// ---------------------------------------------------------------------------
// MessageSender
// ---------------------------------------------------------------------------

/// Cloneable send half of a channel.
///
/// A send started from this handle completes even if the channel it came
/// from is dropped meanwhile (e.g. when spawned onto the runtime).
#[derive(Clone)]
pub struct MessageSender {
    store: Arc<dyn DocumentStore>,
    me: UserId,
    correspondent: UserId,
    sender_name: String,
    sender_photo: String,
    conversation_id: ConversationId,
}

impl MessageSender {
    /// Send the trimmed contents of `draft`.
    ///
    /// The draft is cleared when the send starts.  On failure the attempted
    /// text is put back into `draft` so it is not lost, and the error is
    /// returned for the UI to surface.  A blank draft is rejected with
    /// [`ChatError::EmptyMessage`] and left untouched.
    pub async fn send(&self, draft: &mut String) -> Result<MessageId> {
        let text = draft.trim().to_string();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        draft.clear();

        match self.deliver(&text).await {
            Ok(id) => Ok(id),
            Err(e) => {
                error!(chat = %self.conversation_id, error = %e, "send message failed");
                *draft = text;
                Err(e)
            }
        }
    }

    /// Append the message, then update the conversation metadata.
    ///
    /// These are two separate writes: when the second one fails the message
    /// is stored but the preview and counters stay stale until the next
    /// successful send.
    async fn deliver(&self, text: &str) -> Result<MessageId> {
        let chats = CollectionPath::root(CHATS_COLLECTION);
        let messages = chats.child(self.conversation_id.as_str(), MESSAGES_COLLECTION);

        let unread_before = self
            .store
            .get(&chats, self.conversation_id.as_str())
            .await
            .map_err(ChatError::WriteFailure)?
            .map(|doc| Conversation::from_document(&doc).unread_for(&self.correspondent))
            .unwrap_or(0);

        let message = Fields::new()
            .set(fields::TEXT, text)
            .set(fields::SENDER_ID, self.me.as_str())
            .set(fields::SENDER_NAME, self.sender_name.as_str())
            .set(fields::SENDER_PHOTO, self.sender_photo.as_str())
            .server_timestamp(fields::TIMESTAMP)
            .set(fields::READ_BY, json!([self.me.as_str()]));

        let id = self
            .store
            .append(&messages, message)
            .await
            .map_err(ChatError::WriteFailure)?;

        let metadata = Fields::new()
            .set(
                fields::PARTICIPANTS,
                json!([self.me.as_str(), self.correspondent.as_str()]),
            )
            .set(fields::LAST_MESSAGE, text)
            .server_timestamp(fields::LAST_MESSAGE_TIME)
            .set(fields::LAST_MESSAGE_SENDER_ID, self.me.as_str())
            .set(unread_field(&self.correspondent), unread_before + 1)
            .set(unread_field(&self.me), 0);

        self.store
            .set(&chats, self.conversation_id.as_str(), metadata, WriteMode::Merge)
            .await
            .map_err(ChatError::WriteFailure)?;

        info!(msg_id = %id, chat = %self.conversation_id, "Message sent");
        Ok(MessageId(id))
    }
}

// ---------------------------------------------------------------------------
// MessageChannel
// ---------------------------------------------------------------------------

/// Live view over one conversation's ordered message log.
///
/// Dropping the channel cancels its subscription.
pub struct MessageChannel {
    store: Arc<dyn DocumentStore>,
    sender: MessageSender,
    messages_path: CollectionPath,
    snapshots: Snapshots,
    messages: Vec<Message>,
    loaded: bool,
}

impl MessageChannel {
    /// Open the channel between `me` and `correspondent`.
    ///
    /// Creates the conversation record if needed and loads `me`'s profile for
    /// the sender snapshot stamped on outgoing messages.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        me: &UserId,
        correspondent: &UserId,
    ) -> Result<Self> {
        ensure_conversation(store.as_ref(), me, correspondent).await?;

        let users = CollectionPath::root(USERS_COLLECTION);
        let profile = match store
            .get(&users, me.as_str())
            .await
            .map_err(ChatError::ReadFailure)?
        {
            Some(doc) => Some(User::from_document(&doc)?),
            None => {
                warn!(user = %me, "no user record, sending with fallback sender snapshot");
                None
            }
        };

        let conversation_id = ConversationId::for_pair(me, correspondent);
        let messages_path = CollectionPath::root(CHATS_COLLECTION)
            .child(conversation_id.as_str(), MESSAGES_COLLECTION);

        let snapshots = store.subscribe(
            Query::new(messages_path.clone()).order_by(fields::TIMESTAMP, Direction::Ascending),
        );

        let sender = MessageSender {
            store: store.clone(),
            me: me.clone(),
            correspondent: correspondent.clone(),
            sender_name: profile
                .as_ref()
                .map_or(FALLBACK_SENDER_NAME, User::sender_name)
                .to_string(),
            sender_photo: profile
                .as_ref()
                .and_then(|u| u.photo_url.clone())
                .unwrap_or_default(),
            conversation_id,
        };

        debug!(chat = %sender.conversation_id, "message channel opened");

        Ok(Self {
            store,
            sender,
            messages_path,
            snapshots,
            messages: Vec::new(),
            loaded: false,
        })
    }

    /// Wait for the next snapshot and replace the message log with it.
    ///
    /// Returns `None` once the subscription has ended.  A failed delivery
    /// leaves the previous log in place and is reported as
    /// [`ChatError::SubscriptionFailure`].
    pub async fn next_snapshot(&mut self) -> Option<Result<&[Message]>> {
        let docs = match self.snapshots.next().await? {
            Ok(docs) => docs,
            Err(e) => {
                warn!(chat = %self.sender.conversation_id, error = %e, "message subscription failed");
                return Some(Err(ChatError::SubscriptionFailure(e)));
            }
        };

        self.messages = docs
            .iter()
            .filter_map(|doc| match Message::from_document(doc) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!(error = %e, "skipping malformed message");
                    None
                }
            })
            .collect();
        self.loaded = true;

        if !self.messages.is_empty() {
            self.acknowledge_reads().await;
        }

        Some(Ok(self.messages.as_slice()))
    }

    /// Mark every message read by `me`, then reset `me`'s unread counter.
    ///
    /// Two independent, idempotent steps; failures are logged and the next
    /// snapshot retries them.
    async fn acknowledge_reads(&self) {
        let me = &self.sender.me;

        for message in self.messages.iter().filter(|m| !m.is_read_by(me)) {
            let ack = Fields::new().array_union(fields::READ_BY, vec![json!(me.as_str())]);
            if let Err(e) = self
                .store
                .set(&self.messages_path, &message.id.0, ack, WriteMode::Merge)
                .await
            {
                warn!(msg_id = %message.id, error = %e, "failed to mark message read");
            }
        }

        let chats = CollectionPath::root(CHATS_COLLECTION);
        let reset = Fields::new().set(unread_field(me), 0);
        if let Err(e) = self
            .store
            .set(&chats, self.sender.conversation_id.as_str(), reset, WriteMode::Merge)
            .await
        {
            warn!(chat = %self.sender.conversation_id, error = %e, "failed to reset unread counter");
        }
    }

    /// Send the trimmed contents of `draft`; see [`MessageSender::send`].
    pub async fn send(&self, draft: &mut String) -> Result<MessageId> {
        self.sender.send(draft).await
    }

    /// A detached send handle.
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// The latest message log, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// `true` until the first snapshot has been delivered.
    pub fn is_loading(&self) -> bool {
        !self.loaded
    }

    pub fn is_mine(&self, message: &Message) -> bool {
        message.sender_id == self.sender.me
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.sender.conversation_id
    }

    pub fn correspondent(&self) -> &UserId {
        &self.sender.correspondent
    }
}
