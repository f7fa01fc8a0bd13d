//! The session recorder: a pure observer that persists the message tap.
//!
//! The recorder consumes the session's tap channel on a dedicated thread so
//! SQLite writes never sit on the protocol path. Write failures are retried
//! with bounded exponential backoff; exhausting the attempts marks the
//! recording degraded but never touches the session itself.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use lsprobe_wire::{Direction, Message};

use crate::error::RecordError;
use crate::event::RecordedEvent;
use crate::retry::{next_backoff_ms, MAX_WRITE_ATTEMPTS};
use crate::store::TraceStore;

/// Handle to a running recorder thread.
pub struct RecorderHandle {
    degraded: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl RecorderHandle {
    /// Whether any event exhausted its write retries.
    ///
    /// A degraded recording is a warning, not an error: the protocol
    /// session carried on, but the persisted log may have gaps.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Wait for the recorder to drain. Returns once the tap channel has
    /// been closed (the session dropped its sender) and every received
    /// event has been handled.
    pub fn join(mut self) -> bool {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("recorder thread panicked");
            }
        }
        !self.is_degraded()
    }
}

impl std::fmt::Debug for RecorderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderHandle")
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

/// Start recording a session's tap into the store at `store_path`.
///
/// The store is opened before the thread starts so open failures surface
/// to the caller; after that, the recorder owns its connection outright.
/// Sequence numbers continue from whatever the store already holds for
/// this session.
pub fn spawn(
    store_path: &Path,
    session_id: &str,
    mut tap: mpsc::UnboundedReceiver<(Direction, Message)>,
) -> Result<RecorderHandle, RecordError> {
    let store = TraceStore::open(store_path)?;
    let mut next_seq = store.last_seq(session_id)?.map_or(1, |s| s + 1);
    let session_id = session_id.to_string();
    let degraded = Arc::new(AtomicBool::new(false));
    let degraded_flag = degraded.clone();

    let thread = std::thread::spawn(move || {
        while let Some((direction, message)) = tap.blocking_recv() {
            let event = RecordedEvent::observed_now(&session_id, next_seq, direction, message);
            next_seq += 1;
            persist_with_retry(&store, &event, &degraded_flag);
        }
        tracing::debug!(session = %session_id, "recorder drained");
    });

    Ok(RecorderHandle {
        degraded,
        thread: Some(thread),
    })
}

fn persist_with_retry(store: &TraceStore, event: &RecordedEvent, degraded: &AtomicBool) {
    for attempt in 0..MAX_WRITE_ATTEMPTS {
        match store.append(event) {
            Ok(()) => return,
            Err(e) => {
                if attempt + 1 == MAX_WRITE_ATTEMPTS {
                    // Recording loss must never abort the session: flag it
                    // and keep going.
                    degraded.store(true, Ordering::Release);
                    tracing::warn!(
                        session = %event.session_id,
                        seq = event.seq,
                        "recording degraded, dropping event after {} attempts: {}",
                        MAX_WRITE_ATTEMPTS,
                        e
                    );
                    return;
                }
                std::thread::sleep(Duration::from_millis(next_backoff_ms(attempt)));
            }
        }
    }
}
