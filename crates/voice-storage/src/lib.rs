//! Local persistence of session transcripts (§9: "desktop host still needs
//! session-local transcripts for crash recovery / session review", scoped
//! deliberately outside the server-side persistence the core excludes).
//!
//! The conversation controller never depends on this crate directly — it
//! only depends on the [`TranscriptSink`] trait, so it stays testable
//! without a database. A host wires a concrete sink, such as
//! [`SqliteTranscriptStore`], in at startup.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use voice_domain::{Role, Turn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Hook the conversation controller records every finalized turn through.
/// Implementations must not block the caller for long — the controller
/// calls this synchronously from inside its event-handling path.
pub trait TranscriptSink: Send + Sync {
    fn record_turn(&self, session_id: &str, turn: &Turn);
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// SQLite-backed transcript store, one row per finalized turn.
pub struct SqliteTranscriptStore {
    conn: Mutex<Connection>,
}

impl SqliteTranscriptStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                item_id TEXT,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                started_at_ms INTEGER NOT NULL,
                finalized_at_ms INTEGER,
                emitted_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, started_at_ms);
            "#,
        )?;
        Ok(())
    }

    /// Insert a turn. Errors are logged by the caller, not propagated — see
    /// the [`TranscriptSink`] impl below.
    pub fn insert_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT INTO turns (session_id, item_id, role, text, started_at_ms, finalized_at_ms, emitted_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                session_id,
                &turn.item_id,
                role_str(turn.role),
                &turn.text,
                turn.started_at_ms,
                turn.finalized_at_ms,
                turn.emitted_at_ms,
            ),
        )?;
        Ok(())
    }

    /// All turns recorded for a session, ordered the same way the UI orders
    /// them: by `started_at_ms` (§4.6).
    pub fn turns_for_session(&self, session_id: &str) -> Result<Vec<Turn>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT item_id, role, text, started_at_ms, finalized_at_ms, emitted_at_ms
             FROM turns WHERE session_id = ?1 ORDER BY started_at_ms ASC",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            let role_str: String = row.get(1)?;
            let role = if role_str == "assistant" { Role::Assistant } else { Role::User };
            Ok(Turn {
                item_id: row.get(0)?,
                role,
                text: row.get(2)?,
                is_final: true,
                started_at_ms: row.get(3)?,
                finalized_at_ms: row.get(4)?,
                emitted_at_ms: row.get(5)?,
            })
        })?;

        let mut turns = Vec::new();
        for row in rows {
            turns.push(row?);
        }
        Ok(turns)
    }
}

impl TranscriptSink for SqliteTranscriptStore {
    fn record_turn(&self, session_id: &str, turn: &Turn) {
        if let Err(e) = self.insert_turn(session_id, turn) {
            tracing::warn!("failed to persist turn locally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, text: &str, started_at_ms: i64) -> Turn {
        Turn {
            item_id: Some("item-1".to_string()),
            role,
            text: text.to_string(),
            is_final: true,
            started_at_ms,
            finalized_at_ms: Some(started_at_ms + 500),
            emitted_at_ms: started_at_ms + 500,
        }
    }

    #[test]
    fn recorded_turn_round_trips_through_the_store() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        store.record_turn("sess-1", &turn(Role::User, "hello doctor", 1000));
        store.record_turn("sess-1", &turn(Role::Assistant, "hello, how are you", 1500));

        let turns = store.turns_for_session("sess-1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn turns_are_ordered_by_started_at_ms_not_insertion_order() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        store.record_turn("sess-1", &turn(Role::Assistant, "second", 2000));
        store.record_turn("sess-1", &turn(Role::User, "first", 1000));

        let turns = store.turns_for_session("sess-1").unwrap();
        assert_eq!(turns[0].text, "first");
        assert_eq!(turns[1].text, "second");
    }

    #[test]
    fn sessions_are_isolated_from_each_other() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        store.record_turn("sess-1", &turn(Role::User, "in session one", 1000));
        store.record_turn("sess-2", &turn(Role::User, "in session two", 1000));

        assert_eq!(store.turns_for_session("sess-1").unwrap().len(), 1);
        assert_eq!(store.turns_for_session("sess-2").unwrap().len(), 1);
    }

    #[test]
    fn open_creates_a_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.db");
        let store = SqliteTranscriptStore::open(&path).unwrap();
        store.record_turn("sess-1", &turn(Role::User, "hello", 1000));
        assert!(path.exists());
    }
}
