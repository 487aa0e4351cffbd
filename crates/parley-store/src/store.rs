//! The document-store seam consumed by the chat core.

use async_trait::async_trait;
use futures::stream::BoxStream;

use parley_shared::constants::MAX_IN_FILTER_VALUES;

use crate::document::{CollectionPath, Document, Fields, WriteMode};
use crate::error::Result;
use crate::query::{Filter, Query};

/// Live query results: each item is the full result set at that point.
pub type Snapshots = BoxStream<'static, Result<Vec<Document>>>;

/// Store operations, used to tag injected faults and the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Create,
    Append,
    Query,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreOp::Get => "get",
            StoreOp::Set => "set",
            StoreOp::Create => "create",
            StoreOp::Append => "append",
            StoreOp::Query => "query",
        };
        f.write_str(name)
    }
}

/// A real-time document store.
///
/// Every operation reports failure through its `Result`; none panics.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read. `Ok(None)` when the document does not exist.
    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<Document>>;

    /// Point write, either replacing or merging into the existing document.
    async fn set(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<()>;

    /// Atomic create-if-absent. Returns `false` and writes nothing when the
    /// document already exists.
    async fn create(&self, collection: &CollectionPath, id: &str, fields: Fields)
        -> Result<bool>;

    /// Add a document with a store-generated id and return that id.
    async fn append(&self, collection: &CollectionPath, fields: Fields) -> Result<String>;

    /// One-shot read of a query's current result set.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Subscribe to a query. Dropping the returned stream cancels it.
    fn subscribe(&self, query: Query) -> Snapshots;
}

/// Fetch every document of `collection` whose id is one of `ids`, issuing
/// one query per chunk of at most [`MAX_IN_FILTER_VALUES`] ids.
pub async fn query_in_chunks<S>(
    store: &S,
    collection: &CollectionPath,
    ids: &[String],
) -> Result<Vec<Document>>
where
    S: DocumentStore + ?Sized,
{
    let mut docs = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_IN_FILTER_VALUES) {
        let query = Query::new(collection.clone()).filter(Filter::IdIn(chunk.to_vec()));
        docs.extend(store.query(&query).await?);
    }
    Ok(docs)
}
