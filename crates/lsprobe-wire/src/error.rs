//! Wire-level error types.
/// Errors from framing and parsing JSON-RPC traffic.
///
/// `MalformedFrame` and `InvalidPayload` are non-fatal to a decode loop:
/// the decoder stays usable and resynchronizes at the next valid header.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The Content-Length header was missing or not a valid integer.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The frame body was not well-formed JSON-RPC.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the decode loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WireError::MalformedFrame(_) | WireError::InvalidPayload(_)
        )
    }
}
