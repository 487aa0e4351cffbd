//! # parley-store
//!
//! Real-time document storage for parley.
//!
//! The chat core only ever talks to the [`DocumentStore`] trait: point reads
//! and writes, an atomic create-if-absent, appends with store-assigned ids,
//! and live queries that re-deliver the full result set after each commit.
//! Two backends are provided: [`MemoryStore`] (in-process, with fault
//! injection for tests) and [`SqliteStore`] (durable, backed by `rusqlite`).

pub mod clock;
pub mod database;
pub mod document;
pub mod memory;
pub mod migrations;
pub mod query;
pub mod store;

mod error;
mod watch;

pub use database::SqliteStore;
pub use document::{CollectionPath, Document, FieldValue, Fields, WriteMode};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use query::{Direction, Filter, OrderBy, Query};
pub use store::{query_in_chunks, DocumentStore, Snapshots, StoreOp};
