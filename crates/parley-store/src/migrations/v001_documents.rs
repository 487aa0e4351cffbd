//! v001 -- Document table.
//!
//! Every collection shares one table; a document is addressed by
//! `(collection, id)` and its body is stored as JSON text.  `seq` preserves
//! first-write order, which breaks ties between equal order keys.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,                 -- e.g. chats/a_b/messages
    id         TEXT NOT NULL,
    data       TEXT NOT NULL,                 -- JSON object
    written_at INTEGER NOT NULL,              -- commit clock, micros since epoch

    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection_seq
    ON documents(collection, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
