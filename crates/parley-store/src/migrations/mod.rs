//! Schema migrations for the `documents` table.
//!
//! The schema version lives in `PRAGMA user_version`.  On open, every step in
//! [`MIGRATIONS`] newer than the stored version is applied in its own
//! transaction together with the version bump, so a crash mid-upgrade leaves
//! the database at the last completed step.

pub mod v001_documents;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Ordered `(version, name, step)` list; versions are contiguous from 1.
const MIGRATIONS: &[(u32, &str, Step)] = &[(1, "v001_documents", v001_documents::up as Step)];

/// Bring the schema of `conn` up to the newest version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = MIGRATIONS.last().map_or(0, |(version, _, _)| *version);

    if current > target {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{target}"
        )));
    }

    for (version, name, step) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        tracing::info!(version = *version, name = *name, "applying documents schema migration");

        let tx = conn.unchecked_transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", *version)?;
        tx.commit()?;
    }

    if current < target {
        tracing::info!(from = current, to = target, "documents schema upgraded");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conn: &Connection) -> u32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(version(&conn), 1);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'documents'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_rerun_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO documents (collection, id, data, written_at) VALUES ('users', 'a', '{}', 1)",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 7).unwrap();
        assert!(matches!(run_migrations(&conn), Err(StoreError::Migration(_))));
    }
}
