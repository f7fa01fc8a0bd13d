//! Durable recording and inspection of protocol sessions.
//!
//! A [`recorder`] thread drains a session's message tap into an
//! append-only SQLite [`store`]; the [`inspector`] reads it back with
//! sequence-ordered, filterable cursors. Recording is strictly an
//! observer: nothing here can change what a session sends or receives.

pub mod error;
pub mod event;
pub mod inspector;
pub mod recorder;
pub mod retry;
pub mod store;

pub use error::RecordError;
pub use event::RecordedEvent;
pub use inspector::{EventCursor, EventFilter, SessionInspector};
pub use recorder::{spawn as spawn_recorder, RecorderHandle};
pub use store::TraceStore;
