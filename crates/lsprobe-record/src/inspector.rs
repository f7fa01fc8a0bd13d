//! Read-only access to recorded sessions.
use std::path::{Path, PathBuf};

use lsprobe_wire::Direction;

use crate::error::RecordError;
use crate::event::RecordedEvent;
use crate::store::TraceStore;

const CURSOR_BATCH: usize = 256;

/// Read-time filter over a session's events.
///
/// All criteria are conjunctive; an empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    method: Option<String>,
    direction: Option<Direction>,
    from_ms: Option<u64>,
    until_ms: Option<u64>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only messages with this method. Responses carry no method and
    /// never match a method filter.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Keep events observed at or after this timestamp.
    pub fn from_ms(mut self, from_ms: u64) -> Self {
        self.from_ms = Some(from_ms);
        self
    }

    /// Keep events observed at or before this timestamp.
    pub fn until_ms(mut self, until_ms: u64) -> Self {
        self.until_ms = Some(until_ms);
        self
    }

    fn matches(&self, event: &RecordedEvent) -> bool {
        if let Some(method) = &self.method {
            if event.message.method() != Some(method.as_str()) {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if event.direction != direction {
                return false;
            }
        }
        if let Some(from) = self.from_ms {
            if event.timestamp_ms < from {
                return false;
            }
        }
        if let Some(until) = self.until_ms {
            if event.timestamp_ms > until {
                return false;
            }
        }
        true
    }
}

/// Inspector over a trace database on disk.
///
/// Opens a fresh read connection per query, so a live recorder writing to
/// the same file is never blocked by inspection.
#[derive(Debug, Clone)]
pub struct SessionInspector {
    path: PathBuf,
}

impl SessionInspector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All sessions recorded in the store, sorted by identifier.
    pub fn sessions(&self) -> Result<Vec<String>, RecordError> {
        TraceStore::open(&self.path)?.session_ids()
    }

    /// A sequence-ordered cursor over one session's events.
    ///
    /// The cursor is finite: it sees the events present when each batch is
    /// fetched and ends at the session's current tail. Reading never
    /// mutates the store, so iterating twice yields the same events.
    pub fn events(
        &self,
        session_id: &str,
        filter: EventFilter,
    ) -> Result<EventCursor, RecordError> {
        let store = TraceStore::open(&self.path)?;
        Ok(EventCursor {
            store,
            session_id: session_id.to_string(),
            filter,
            last_seq: None,
            batch: Vec::new(),
            exhausted: false,
        })
    }
}

/// Batched keyset cursor over recorded events.
pub struct EventCursor {
    store: TraceStore,
    session_id: String,
    filter: EventFilter,
    last_seq: Option<u64>,
    batch: Vec<RecordedEvent>,
    exhausted: bool,
}

impl EventCursor {
    fn refill(&mut self) -> Result<(), RecordError> {
        let events = self
            .store
            .events_after(&self.session_id, self.last_seq, CURSOR_BATCH)?;
        if events.len() < CURSOR_BATCH {
            self.exhausted = true;
        }
        if let Some(last) = events.last() {
            self.last_seq = Some(last.seq);
        }
        // Reverse so pop() walks the batch in sequence order.
        self.batch = events;
        self.batch.reverse();
        Ok(())
    }
}

impl Iterator for EventCursor {
    type Item = Result<RecordedEvent, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.batch.is_empty() {
                if self.exhausted {
                    return None;
                }
                if let Err(e) = self.refill() {
                    self.exhausted = true;
                    return Some(Err(e));
                }
                if self.batch.is_empty() {
                    return None;
                }
            }
            while let Some(event) = self.batch.pop() {
                if self.filter.matches(&event) {
                    return Some(Ok(event));
                }
            }
        }
    }
}

impl std::fmt::Debug for EventCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCursor")
            .field("session_id", &self.session_id)
            .field("last_seq", &self.last_seq)
            .finish()
    }
}
