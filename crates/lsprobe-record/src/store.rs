//! The durable, append-only trace store.
//!
//! One SQLite database holds every recorded session. Rows are keyed by
//! (session_id, seq) and never updated; concurrent sessions append from
//! their own connections, relying on WAL plus a busy timeout rather than
//! any cross-session locking.
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use lsprobe_wire::{Direction, Message};

use crate::error::RecordError;
use crate::event::RecordedEvent;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trace_events (
    session_id   TEXT    NOT NULL,
    seq          INTEGER NOT NULL,
    direction    TEXT    NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    message      TEXT    NOT NULL,
    PRIMARY KEY (session_id, seq)
);
";

/// Handle to the trace database.
pub struct TraceStore {
    conn: Connection,
}

impl TraceStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store. Test use only; nothing survives the handle.
    pub fn open_in_memory() -> Result<Self, RecordError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RecordError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Append one event. The primary key rejects a duplicated sequence
    /// number, so a buggy writer cannot silently overwrite history.
    pub fn append(&self, event: &RecordedEvent) -> Result<(), RecordError> {
        self.conn.execute(
            "INSERT INTO trace_events (session_id, seq, direction, timestamp_ms, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.session_id,
                event.seq as i64,
                event.direction.as_str(),
                event.timestamp_ms as i64,
                event.message_json(),
            ],
        )?;
        Ok(())
    }

    /// Highest sequence number recorded for a session, if any.
    pub fn last_seq(&self, session_id: &str) -> Result<Option<u64>, RecordError> {
        let seq: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(seq) FROM trace_events WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(seq.map(|s| s as u64))
    }

    /// All session identifiers present in the store, sorted.
    pub fn session_ids(&self) -> Result<Vec<String>, RecordError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT session_id FROM trace_events ORDER BY session_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Up to `limit` events for a session with seq greater than `after`,
    /// in sequence order.
    pub fn events_after(
        &self,
        session_id: &str,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, RecordError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, seq, direction, timestamp_ms, message
             FROM trace_events
             WHERE session_id = ?1 AND seq > ?2
             ORDER BY seq
             LIMIT ?3",
        )?;
        let floor = after.map_or(-1i64, |s| s as i64);
        let rows = stmt.query_map(params![session_id, floor, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (session_id, seq, direction, timestamp_ms, message) = row?;
            events.push(decode_row(session_id, seq, &direction, timestamp_ms, &message)?);
        }
        Ok(events)
    }
}

fn decode_row(
    session_id: String,
    seq: i64,
    direction: &str,
    timestamp_ms: i64,
    message: &str,
) -> Result<RecordedEvent, RecordError> {
    let direction = Direction::parse(direction)
        .ok_or_else(|| RecordError::Corrupt(format!("unknown direction: {}", direction)))?;
    let message = Message::parse(message)
        .map_err(|e| RecordError::Corrupt(format!("unparsable message: {}", e)))?;
    Ok(RecordedEvent {
        session_id,
        seq: seq as u64,
        direction,
        timestamp_ms: timestamp_ms as u64,
        message,
    })
}

impl std::fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceStore").finish()
    }
}
