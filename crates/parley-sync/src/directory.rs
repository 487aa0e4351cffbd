//! Conversation Directory: the live list of a user's correspondents.
//!
//! The directory subscribes to every conversation the current user takes
//! part in.  Each snapshot is turned into one [`DirectoryEntry`] per
//! correspondent by batch-fetching the correspondents' user records.
//! Searching happens over the fetched entries only and never touches the
//! store.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use parley_shared::constants::{fields, CHATS_COLLECTION, USERS_COLLECTION};
use parley_shared::UserId;
use parley_store::{
    query_in_chunks, CollectionPath, Document, DocumentStore, Filter, Query, Snapshots,
};

use crate::channel::MessageChannel;
use crate::error::{ChatError, Result};
use crate::models::{Conversation, User};

/// One correspondent of the current user, with the conversation summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub correspondent: User,
    pub conversation_id: String,
    pub preview: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub last_sender: Option<UserId>,
}

/// Case-insensitive substring match on each correspondent's label
/// (display name, falling back to email, then id).
pub fn filter_entries<'a>(entries: &'a [DirectoryEntry], query: &str) -> Vec<&'a DirectoryEntry> {
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|e| e.correspondent.label().to_lowercase().contains(&needle))
        .collect()
}

/// Build directory entries from one snapshot of `me`'s conversations.
///
/// No user fetch is issued when the snapshot has no correspondents.
pub async fn build_entries(
    store: &dyn DocumentStore,
    me: &UserId,
    conversations: &[Document],
) -> Result<Vec<DirectoryEntry>> {
    let mut by_correspondent: HashMap<UserId, Conversation> = HashMap::new();

    for doc in conversations {
        let conversation = Conversation::from_document(doc);
        let Some(other) = conversation.correspondent_of(me).cloned() else {
            warn!(chat = %doc.id, user = %me, "conversation has no correspondent, skipping");
            continue;
        };
        by_correspondent.insert(other, conversation);
    }

    if by_correspondent.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = by_correspondent
        .keys()
        .map(|id| id.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let users = query_in_chunks(store, &CollectionPath::root(USERS_COLLECTION), &ids)
        .await
        .map_err(ChatError::ReadFailure)?;

    let mut entries = Vec::with_capacity(users.len());
    for doc in &users {
        let user = match User::from_document(doc) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "skipping malformed user record");
                continue;
            }
        };
        let Some(conversation) = by_correspondent.get(&user.id) else {
            continue;
        };
        entries.push(DirectoryEntry {
            conversation_id: conversation.id.clone(),
            preview: conversation.last_message.clone(),
            timestamp: conversation.last_message_time,
            unread_count: conversation.unread_for(me),
            last_sender: conversation.last_sender.clone(),
            correspondent: user,
        });
    }

    if entries.len() < by_correspondent.len() {
        warn!(
            user = %me,
            expected = by_correspondent.len(),
            found = entries.len(),
            "some correspondents have no user record, skipping"
        );
    }

    // Most recent first; conversations without a timestamp last.
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.correspondent.id.cmp(&b.correspondent.id))
    });

    Ok(entries)
}

// ---------------------------------------------------------------------------
// DirectoryFeed
// ---------------------------------------------------------------------------

/// Live directory of one user. Dropping the feed cancels the subscription.
pub struct DirectoryFeed {
    store: Arc<dyn DocumentStore>,
    me: UserId,
    snapshots: Snapshots,
    entries: Vec<DirectoryEntry>,
}

impl DirectoryFeed {
    /// Wait for the next conversation snapshot and rebuild the entries.
    ///
    /// On failure the previous entries are kept and the error is returned;
    /// `None` means the subscription has ended.
    pub async fn next(&mut self) -> Option<Result<&[DirectoryEntry]>> {
        let docs = match self.snapshots.next().await? {
            Ok(docs) => docs,
            Err(e) => {
                warn!(user = %self.me, error = %e, "directory subscription failed");
                return Some(Err(ChatError::SubscriptionFailure(e)));
            }
        };

        match build_entries(self.store.as_ref(), &self.me, &docs).await {
            Ok(entries) => {
                self.entries = entries;
                Some(Ok(self.entries.as_slice()))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Entries from the latest successful snapshot.
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Filter the current entries; see [`filter_entries`].
    pub fn search(&self, query: &str) -> Vec<&DirectoryEntry> {
        filter_entries(&self.entries, query)
    }

    /// Total unread messages across all conversations.
    pub fn total_unread(&self) -> u32 {
        self.entries.iter().map(|e| e.unread_count).sum()
    }
}

// ---------------------------------------------------------------------------
// ConversationDirectory
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ConversationDirectory {
    store: Arc<dyn DocumentStore>,
}

impl ConversationDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Subscribe to the conversations `me` participates in.
    pub fn list_conversations(&self, me: &UserId) -> DirectoryFeed {
        let query = Query::new(CollectionPath::root(CHATS_COLLECTION)).filter(
            Filter::ArrayContains(fields::PARTICIPANTS.to_string(), json!(me.as_str())),
        );

        DirectoryFeed {
            store: self.store.clone(),
            me: me.clone(),
            snapshots: self.store.subscribe(query),
            entries: Vec::new(),
        }
    }

    /// Open the chat with `target` on behalf of deep-link navigation.
    ///
    /// Returns `Ok(None)` and only logs when `target` has no user record;
    /// presenting that is up to the caller.  Otherwise the conversation is
    /// created if missing and its channel opened.
    pub async fn resolve_and_open(
        &self,
        me: &UserId,
        target: &UserId,
    ) -> Result<Option<(User, MessageChannel)>> {
        let users = CollectionPath::root(USERS_COLLECTION);
        let Some(doc) = self
            .store
            .get(&users, target.as_str())
            .await
            .map_err(ChatError::ReadFailure)?
        else {
            warn!(user = %me, target = %target, "navigation target user not found");
            return Ok(None);
        };

        let user = User::from_document(&doc)?;
        let channel = MessageChannel::open(self.store.clone(), me, target).await?;

        info!(user = %me, target = %target, "opened chat from navigation");
        Ok(Some((user, channel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::{Fields, MemoryStore, StoreOp, WriteMode};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    async fn seed_user(store: &MemoryStore, id: &str, name: &str) {
        let mut record = Fields::new().set(fields::UID, id);
        if !name.is_empty() {
            record = record.set(fields::DISPLAY_NAME, name);
        }
        store
            .set(&CollectionPath::root(USERS_COLLECTION), id, record, WriteMode::Overwrite)
            .await
            .unwrap();
    }

    async fn setup() -> (MemoryStore, ConversationDirectory) {
        let store = MemoryStore::with_operation_log();
        seed_user(&store, "alice", "Alice").await;
        seed_user(&store, "bob", "Bob Stone").await;
        seed_user(&store, "carol", "Carol").await;
        seed_user(&store, "dave", "").await;
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        (store, ConversationDirectory::new(shared))
    }

    fn user_queries(store: &MemoryStore) -> usize {
        let users = CollectionPath::root(USERS_COLLECTION);
        store
            .operations()
            .iter()
            .filter(|(op, coll)| *op == StoreOp::Query && *coll == users)
            .count()
    }

    async fn send(store: &MemoryStore, from: &str, to: &str, text: &str) {
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let channel = MessageChannel::open(shared, &uid(from), &uid(to)).await.unwrap();
        channel.send(&mut text.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_directory_skips_user_fetch() {
        let (store, directory) = setup().await;
        let mut feed = directory.list_conversations(&uid("alice"));

        let entries = feed.next().await.unwrap().unwrap();
        assert!(entries.is_empty());
        assert_eq!(user_queries(&store), 0);
    }

    #[tokio::test]
    async fn test_entries_ordered_by_recency_with_unread() {
        let (store, directory) = setup().await;
        send(&store, "bob", "alice", "hi alice").await;
        send(&store, "carol", "alice", "yo").await;
        send(&store, "carol", "alice", "you there?").await;
        send(&store, "carol", "bob", "not for alice").await;

        let mut feed = directory.list_conversations(&uid("alice"));
        let entries = feed.next().await.unwrap().unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.correspondent.label()).collect();
        assert_eq!(names, vec!["Carol", "Bob Stone"]);
        assert_eq!(entries[0].preview, "you there?");
        assert_eq!(entries[0].unread_count, 2);
        assert_eq!(entries[0].last_sender, Some(uid("carol")));
        assert_eq!(entries[1].unread_count, 1);
        assert_eq!(feed.total_unread(), 3);
    }

    #[tokio::test]
    async fn test_feed_follows_new_conversations() {
        let (store, directory) = setup().await;
        let mut feed = directory.list_conversations(&uid("alice"));
        assert!(feed.next().await.unwrap().unwrap().is_empty());

        send(&store, "bob", "alice", "hello").await;

        let entries = feed.next().await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].correspondent.id, uid("bob"));
    }

    #[tokio::test]
    async fn test_search_is_local_and_case_insensitive() {
        let (store, directory) = setup().await;
        send(&store, "bob", "alice", "a").await;
        send(&store, "carol", "alice", "b").await;
        send(&store, "dave", "alice", "c").await;

        let mut feed = directory.list_conversations(&uid("alice"));
        feed.next().await.unwrap().unwrap();
        let ops_before = store.operations().len();

        let hits: Vec<&str> = feed.search("STONE").iter().map(|e| e.correspondent.label()).collect();
        assert_eq!(hits, vec!["Bob Stone"]);

        // No display name: matched on the id fallback.
        assert_eq!(feed.search("dav").len(), 1);
        assert_eq!(feed.search("").len(), 3);
        assert!(feed.search("zzz").is_empty());

        assert_eq!(store.operations().len(), ops_before);
    }

    #[tokio::test]
    async fn test_more_than_thirty_correspondents_fetched_in_chunks() {
        let (store, directory) = setup().await;
        let chats = CollectionPath::root(CHATS_COLLECTION);
        for i in 0..35 {
            let friend = format!("friend{i:02}");
            seed_user(&store, &friend, "").await;
            store
                .set(
                    &chats,
                    &format!("alice_{friend}"),
                    Fields::new().set(fields::PARTICIPANTS, json!(["alice", friend.as_str()])),
                    WriteMode::Overwrite,
                )
                .await
                .unwrap();
        }

        let mut feed = directory.list_conversations(&uid("alice"));
        let entries = feed.next().await.unwrap().unwrap();

        let ids: BTreeSet<&str> = entries.iter().map(|e| e.correspondent.id.as_str()).collect();
        assert_eq!(entries.len(), 35);
        assert_eq!(ids.len(), 35);
        assert!(ids.contains("friend00") && ids.contains("friend34"));
        // 30 ids in the first query, the remaining 5 in the second.
        assert_eq!(user_queries(&store), 2);
    }

    #[tokio::test]
    async fn test_conversation_without_correspondent_is_skipped() {
        let (store, directory) = setup().await;
        store
            .set(
                &CollectionPath::root(CHATS_COLLECTION),
                "broken",
                Fields::new().set(fields::PARTICIPANTS, json!(["alice"])),
                WriteMode::Overwrite,
            )
            .await
            .unwrap();

        let mut feed = directory.list_conversations(&uid("alice"));
        assert!(feed.next().await.unwrap().unwrap().is_empty());
        assert_eq!(user_queries(&store), 0);
    }

    #[tokio::test]
    async fn test_correspondent_without_user_record_is_omitted() {
        let (store, directory) = setup().await;
        send(&store, "bob", "alice", "hi").await;
        store
            .set(
                &CollectionPath::root(CHATS_COLLECTION),
                "alice_ghost",
                Fields::new().set(fields::PARTICIPANTS, json!(["alice", "ghost"])),
                WriteMode::Overwrite,
            )
            .await
            .unwrap();

        let mut feed = directory.list_conversations(&uid("alice"));
        let entries = feed.next().await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].correspondent.id, uid("bob"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_target_is_silent() {
        let (store, directory) = setup().await;
        let opened = directory
            .resolve_and_open(&uid("alice"), &uid("ghost"))
            .await
            .unwrap();
        assert!(opened.is_none());
        assert_eq!(store.document_count(&CollectionPath::root(CHATS_COLLECTION)), 0);
    }

    #[tokio::test]
    async fn test_resolve_creates_conversation_and_lists_it() {
        let (store, directory) = setup().await;
        let (user, channel) = directory
            .resolve_and_open(&uid("alice"), &uid("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.label(), "Bob Stone");
        assert_eq!(channel.correspondent(), &uid("bob"));

        let chats = CollectionPath::root(CHATS_COLLECTION);
        let doc = store.get(&chats, "alice_bob").await.unwrap().unwrap();
        assert_eq!(doc.get_i64("unreadCount_alice"), Some(0));
        assert_eq!(doc.get_i64("unreadCount_bob"), Some(0));

        let mut feed = directory.list_conversations(&uid("bob"));
        let entries = feed.next().await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].preview, "");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entries() {
        let (store, directory) = setup().await;
        send(&store, "bob", "alice", "first").await;

        let mut feed = directory.list_conversations(&uid("alice"));
        assert_eq!(feed.next().await.unwrap().unwrap().len(), 1);

        store.fail_next(StoreOp::Query);
        send(&store, "carol", "alice", "second").await;

        assert!(feed.next().await.unwrap().is_err());
        assert_eq!(feed.entries().len(), 1);
    }
}
