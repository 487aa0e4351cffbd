//! SQLite-backed document store.
//!
//! The [`SqliteStore`] owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.  SQLite calls are blocking,
//! so every operation hops onto `spawn_blocking`; the connection mutex
//! serialises them, which also makes each read-modify-write atomic.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::clock::ServerClock;
use crate::document::{validate_id, CollectionPath, Document, Fields, WriteMode};
use crate::error::{Result, StoreError};
use crate::migrations;
use crate::query::Query;
use crate::store::{DocumentStore, Snapshots};
use crate::watch::{live_query, CHANGE_CHANNEL_CAPACITY};

struct Inner {
    conn: Mutex<Connection>,
    clock: ServerClock,
    changes: broadcast::Sender<CollectionPath>,
    path: Option<PathBuf>,
}

/// Cloneable handle to a SQLite document database.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

impl SqliteStore {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/parley/parley.db`
    /// - macOS:   `~/Library/Application Support/com.parley.parley/parley.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parley\parley\data\parley.db`
    pub fn open_default() -> Result<Self> {
        Self::open_at(&default_path()?)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        let last_written: i64 = conn.query_row(
            "SELECT COALESCE(MAX(written_at), 0) FROM documents",
            [],
            |row| row.get(0),
        )?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                clock: ServerClock::starting_after(last_written),
                changes,
                path: Some(path.to_path_buf()),
            }),
        })
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.path.clone()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &ServerClock) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let conn = inner
                .conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))?;
            f(&conn, &inner.clock)
        })
        .await?
    }

    fn notify(&self, collection: &CollectionPath) {
        let _ = self.inner.changes.send(collection.clone());
    }
}

/// Default database location inside the platform data directory.
pub fn default_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("com", "parley", "parley").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().join("parley.db"))
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn load_body(
    conn: &Connection,
    collection: &CollectionPath,
    id: &str,
) -> Result<Option<Map<String, Value>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| parse_body(&s)).transpose()
}

fn parse_body(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn upsert(
    conn: &Connection,
    collection: &CollectionPath,
    id: &str,
    body: &Map<String, Value>,
    written_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (collection, id, data, written_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(collection, id)
         DO UPDATE SET data = excluded.data, written_at = excluded.written_at",
        params![
            collection.as_str(),
            id,
            serde_json::to_string(body)?,
            written_at
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<Document>> {
        let collection = collection.clone();
        let id = id.to_string();
        self.with_conn(move |conn, _| {
            Ok(load_body(conn, &collection, &id)?.map(|data| Document { id, data }))
        })
        .await
    }

    async fn set(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<()> {
        validate_id(id)?;
        let coll = collection.clone();
        let id = id.to_string();
        self.with_conn(move |conn, clock| {
            let existing = load_body(conn, &coll, &id)?;
            let commit_ts = clock.tick();
            let body = fields.apply(existing.as_ref(), mode, commit_ts);
            upsert(conn, &coll, &id, &body, commit_ts)
        })
        .await?;
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
        let coll = collection.clone();
        let id = id.to_string();
        let created = self
            .with_conn(move |conn, clock| {
                let commit_ts = clock.tick();
                let body = fields.apply(None, WriteMode::Overwrite, commit_ts);
                let affected = conn.execute(
                    "INSERT OR IGNORE INTO documents (collection, id, data, written_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        coll.as_str(),
                        id,
                        serde_json::to_string(&body)?,
                        commit_ts
                    ],
                )?;
                Ok(affected == 1)
            })
            .await?;
        if created {
            self.notify(collection);
        }
        Ok(created)
    }

    async fn append(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
        let coll = collection.clone();
        let id = Uuid::new_v4().to_string();
        let new_id = id.clone();
        self.with_conn(move |conn, clock| {
            let commit_ts = clock.tick();
            let body = fields.apply(None, WriteMode::Overwrite, commit_ts);
            upsert(conn, &coll, &new_id, &body, commit_ts)
        })
        .await?;
        self.notify(collection);
        Ok(id)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let query = query.clone();
        self.with_conn(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT id, data FROM documents
                 WHERE collection = ?1
                 ORDER BY seq ASC",
            )?;

            let rows = stmt.query_map(params![query.collection.as_str()], |row| {
                let id: String = row.get(0)?;
                let data: String = row.get(1)?;
                Ok((id, data))
            })?;

            let mut docs = Vec::new();
            for row in rows {
                let (id, raw) = row?;
                docs.push(Document {
                    id,
                    data: parse_body(&raw)?,
                });
            }
            Ok(query.evaluate(docs))
        })
        .await
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
