//! In-process document store.
//!
//! [`MemoryStore`] keeps every collection in memory behind a mutex and
//! re-delivers live query results on each commit.  It supports one-shot fault
//! injection and, when built with [`MemoryStore::with_operation_log`], records
//! every operation it serves, which makes it the backend of choice for
//! exercising failure paths of the chat core.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::ServerClock;
use crate::document::{validate_id, CollectionPath, Document, Fields, WriteMode};
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::store::{DocumentStore, Snapshots, StoreOp};
use crate::watch::{live_query, CHANGE_CHANNEL_CAPACITY};

#[derive(Debug, Clone)]
struct StoredDoc {
    seq: u64,
    data: Map<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<CollectionPath, BTreeMap<String, StoredDoc>>,
    next_seq: u64,
    faults: Vec<StoreOp>,
    /// `None` unless the store was built with an operation log.
    log: Option<Vec<(StoreOp, CollectionPath)>>,
}

struct Inner {
    state: Mutex<State>,
    clock: ServerClock,
    changes: broadcast::Sender<CollectionPath>,
}

/// Cloneable handle to a shared in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_state(State::default())
    }

    /// A store that records every operation it serves, see [`Self::operations`].
    ///
    /// The log is unbounded; use it for tests and short-lived inspection only.
    pub fn with_operation_log() -> Self {
        Self::with_state(State {
            log: Some(Vec::new()),
            ..State::default()
        })
    }

    fn with_state(state: State) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                clock: ServerClock::new(),
                changes,
            }),
        }
    }

    /// Make the next `op` fail with [`StoreError::Unavailable`].
    ///
    /// Faults queue up: calling this twice fails the next two matching calls.
    pub fn fail_next(&self, op: StoreOp) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.faults.push(op);
        }
    }

    /// Every operation served so far, in order.  Always empty unless the
    /// store was built with [`Self::with_operation_log`].
    pub fn operations(&self) -> Vec<(StoreOp, CollectionPath)> {
        self.inner
            .state
            .lock()
            .ok()
            .and_then(|s| s.log.clone())
            .unwrap_or_default()
    }

    /// Number of documents currently in `collection`.
    pub fn document_count(&self, collection: &CollectionPath) -> usize {
        self.inner
            .state
            .lock()
            .map(|s| s.collections.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Lock the state, log `op` and consume a pending fault for it.
    fn begin(&self, op: StoreOp, collection: &CollectionPath) -> Result<MutexGuard<'_, State>> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))?;

        if let Some(log) = state.log.as_mut() {
            log.push((op, collection.clone()));
        }

        if let Some(pos) = state.faults.iter().position(|f| *f == op) {
            state.faults.remove(pos);
            warn!(%op, collection = %collection, "injected store failure");
            return Err(StoreError::Unavailable(format!("injected {op} failure")));
        }

        Ok(state)
    }

    fn notify(&self, collection: &CollectionPath) {
        // No receivers simply means no live queries.
        let _ = self.inner.changes.send(collection.clone());
    }

    fn write(
        state: &mut State,
        clock: &ServerClock,
        collection: &CollectionPath,
        id: &str,
        fields: &Fields,
        mode: WriteMode,
    ) {
        let commit_ts = clock.tick();
        let next_seq = state.next_seq;
        let docs = state.collections.entry(collection.clone()).or_default();

        match docs.get_mut(id) {
            Some(existing) => {
                existing.data = fields.apply(Some(&existing.data), mode, commit_ts);
            }
            None => {
                let data = fields.apply(None, mode, commit_ts);
                docs.insert(id.to_string(), StoredDoc { seq: next_seq, data });
                state.next_seq += 1;
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<Document>> {
        let state = self.begin(StoreOp::Get, collection)?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|stored| Document {
                id: id.to_string(),
                data: stored.data.clone(),
            }))
    }

    async fn set(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<()> {
        validate_id(id)?;
        {
            let mut state = self.begin(StoreOp::Set, collection)?;
            Self::write(&mut state, &self.inner.clock, collection, id, &fields, mode);
        }
        debug!(doc = %collection.describe(id), ?mode, "document written");
        self.notify(collection);
        Ok(())
    }

    async fn create(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<bool> {
        validate_id(id)?;
        {
            let mut state = self.begin(StoreOp::Create, collection)?;
            let exists = state
                .collections
                .get(collection)
                .is_some_and(|docs| docs.contains_key(id));
            if exists {
                return Ok(false);
            }
            Self::write(
                &mut state,
                &self.inner.clock,
                collection,
                id,
                &fields,
                WriteMode::Overwrite,
            );
        }
        debug!(doc = %collection.describe(id), "document created");
        self.notify(collection);
        Ok(true)
    }

    async fn append(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        {
            let mut state = self.begin(StoreOp::Append, collection)?;
            Self::write(
                &mut state,
                &self.inner.clock,
                collection,
                &id,
                &fields,
                WriteMode::Overwrite,
            );
        }
        debug!(doc = %collection.describe(&id), "document appended");
        self.notify(collection);
        Ok(id)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let state = self.begin(StoreOp::Query, &query.collection)?;
        let mut docs: Vec<(u64, Document)> = state
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, stored)| {
                        (
                            stored.seq,
                            Document {
                                id: id.clone(),
                                data: stored.data.clone(),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        docs.sort_by_key(|(seq, _)| *seq);
        Ok(query.evaluate(docs.into_iter().map(|(_, d)| d)))
    }

    fn subscribe(&self, query: Query) -> Snapshots {
        let receiver = self.inner.changes.subscribe();
        let collection = query.collection.clone();
        let store = self.clone();
        live_query(receiver, collection, move || {
            let store = store.clone();
            let query = query.clone();
            async move { store.query(&query).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, Filter};
    use futures::StreamExt;
    use serde_json::json;

    fn chats() -> CollectionPath {
        CollectionPath::root("chats")
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get(&chats(), "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_does_not_overwrite() {
        let store = MemoryStore::new();
        let first = Fields::new().set("lastMessage", "hello");
        let second = Fields::new().set("lastMessage", "");

        assert!(store.create(&chats(), "a_b", first).await.unwrap());
        assert!(!store.create(&chats(), "a_b", second).await.unwrap());

        let doc = store.get(&chats(), "a_b").await.unwrap().unwrap();
        assert_eq!(doc.get_str("lastMessage"), Some("hello"));
    }

    #[tokio::test]
    async fn test_injected_fault_is_one_shot() {
        let store = MemoryStore::new();
        let coll = chats().child("a_b", "messages");
        store.fail_next(StoreOp::Append);

        let err = store.append(&coll, Fields::new().set("text", "x")).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));
        assert_eq!(store.document_count(&coll), 0);

        store.append(&coll, Fields::new().set("text", "x")).await.unwrap();
        assert_eq!(store.document_count(&coll), 1);
    }

    #[tokio::test]
    async fn test_server_timestamps_increase() {
        let store = MemoryStore::new();
        let coll = chats().child("a_b", "messages");
        for i in 0..20 {
            store
                .append(&coll, Fields::new().set("n", i).server_timestamp("timestamp"))
                .await
                .unwrap();
        }
        let docs = store
            .query(&Query::new(coll).order_by("timestamp", Direction::Ascending))
            .await
            .unwrap();
        let ns: Vec<i64> = docs.iter().filter_map(|d| d.get_i64("n")).collect();
        assert_eq!(ns, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_subscription_redelivers_full_result_set() {
        let store = MemoryStore::new();
        let query = Query::new(chats())
            .filter(Filter::ArrayContains("participants".into(), json!("alice")));
        let mut snapshots = store.subscribe(query);

        assert!(snapshots.next().await.unwrap().unwrap().is_empty());

        store
            .set(
                &chats(),
                "alice_bob",
                Fields::new().set("participants", json!(["alice", "bob"])),
                WriteMode::Merge,
            )
            .await
            .unwrap();
        let snap = snapshots.next().await.unwrap().unwrap();
        assert_eq!(snap.len(), 1);

        store
            .set(
                &chats(),
                "bob_carol",
                Fields::new().set("participants", json!(["bob", "carol"])),
                WriteMode::Merge,
            )
            .await
            .unwrap();
        store
            .set(
                &chats(),
                "alice_carol",
                Fields::new().set("participants", json!(["alice", "carol"])),
                WriteMode::Merge,
            )
            .await
            .unwrap();
        let snap = snapshots.next().await.unwrap().unwrap();
        assert_eq!(snap.len(), 2);
    }

    #[tokio::test]
    async fn test_operation_log_records_collection() {
        let store = MemoryStore::with_operation_log();
        let _ = store.get(&chats(), "a_b").await;
        assert_eq!(store.operations(), vec![(StoreOp::Get, chats())]);
    }

    #[tokio::test]
    async fn test_default_store_keeps_no_operation_log() {
        let store = MemoryStore::new();
        for _ in 0..10 {
            let _ = store.get(&chats(), "a_b").await;
            let _ = store.query(&Query::new(chats())).await;
        }
        assert!(store.operations().is_empty());
        assert!(store.inner.state.lock().unwrap().log.is_none());
    }
}
