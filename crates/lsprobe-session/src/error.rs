//! Session-level error types.
/// Errors from session lifecycle and request/response interchange.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Server process failed to start.
    #[error("server failed to start: {0}")]
    SpawnFailed(String),

    /// The initialize handshake was rejected by the server.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// JSON-RPC error returned by the server.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// The error code.
        code: i64,
        /// The error message.
        message: String,
    },

    /// Request timed out waiting for a response.
    #[error("request timed out after {0} ms")]
    RequestTimeout(u64),

    /// The server honored a cancellation for this request.
    #[error("request was cancelled by the server")]
    Cancelled,

    /// The session no longer accepts new requests.
    #[error("session is shutting down; no new requests accepted")]
    SessionClosing,

    /// The transport closed underneath the session.
    #[error("transport closed")]
    TransportClosed,

    /// A capability fixture failed pre-flight schema validation.
    #[error("invalid capability fixture: {0}")]
    InvalidCapabilityFixture(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
