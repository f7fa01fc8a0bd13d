//! lsprobe-session — the LSP session engine for tests.
//!
//! This crate establishes a JSON-RPC session with a language server under
//! test: spawn or connect, negotiate capabilities, correlate concurrent
//! requests and responses, and tear everything down safely. Recording and
//! inspection of the traffic live in `lsprobe-record`.
pub mod capabilities;
pub mod capture;
pub mod correlate;
pub mod error;
pub mod session;
pub mod transport;

// Re-export key types for convenience.
pub use capabilities::{CapabilityOptions, ClientIdentity, NegotiatedCapabilities};
pub use capture::{DiagnosticCapture, WindowMessage, WindowMessageLog};
pub use correlate::{CorrelationTable, Outcome};
pub use error::SessionError;
pub use session::{Session, SessionId, SessionState, TapEvent, REQUEST_CANCELLED};
pub use transport::{ServerConfig, Transport};
