//! Recording error types.
/// Errors from the durable trace store and its readers.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The underlying SQLite store failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem error around the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded back into an event.
    #[error("corrupt recorded event: {0}")]
    Corrupt(String),
}
