//! lsprobe-wire — JSON-RPC message model and framing for LSP traffic.
//!
//! This crate owns the wire-level protocol: the tagged `Message` type,
//! Content-Length header framing, and an async frame decoder that keeps
//! reading across malformed frames.
pub mod codec;
pub mod error;
pub mod message;

// Re-export key types for convenience.
pub use codec::{encode, frame_body, parse_content_length, FrameDecoder};
pub use error::WireError;
pub use message::{Direction, Message, RequestId, RpcError};
