//! Capture stores for server-pushed traffic tests assert against.
//!
//! Diagnostics and window messages arrive as notifications at arbitrary
//! points in a session; these stores accumulate them so test code can make
//! assertions after the fact. Payloads stay opaque JSON.
use std::collections::HashMap;

/// Diagnostics received from the server, keyed by document URI.
///
/// An empty diagnostics list clears the entry for that URI, mirroring the
/// protocol's publish semantics.
#[derive(Debug, Default)]
pub struct DiagnosticCapture {
    store: HashMap<String, Vec<serde_json::Value>>,
}

impl DiagnosticCapture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a publishDiagnostics payload.
    pub fn publish(&mut self, uri: String, diagnostics: Vec<serde_json::Value>) {
        if diagnostics.is_empty() {
            self.store.remove(&uri);
        } else {
            self.store.insert(uri, diagnostics);
        }
    }

    /// Diagnostics currently held for a URI.
    pub fn for_uri(&self, uri: &str) -> &[serde_json::Value] {
        self.store.get(uri).map_or(&[], |v| v.as_slice())
    }

    /// All URIs with at least one diagnostic.
    pub fn uris(&self) -> Vec<&str> {
        self.store.keys().map(|s| s.as_str()).collect()
    }

    /// Total diagnostics across all documents.
    pub fn total_count(&self) -> usize {
        self.store.values().map(|v| v.len()).sum()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.store.clear();
    }
}

/// One window/logMessage or window/showMessage notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMessage {
    /// The notification method that carried the message.
    pub method: String,
    /// The LSP MessageType (1 = error .. 4 = log), when present.
    pub message_type: Option<i64>,
    /// The message text.
    pub text: String,
}

/// Accumulates window messages in arrival order.
#[derive(Debug, Default)]
pub struct WindowMessageLog {
    messages: Vec<WindowMessage>,
}

impl WindowMessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a window message notification payload.
    pub fn record(&mut self, method: &str, params: &serde_json::Value) {
        self.messages.push(WindowMessage {
            method: method.to_string(),
            message_type: params.get("type").and_then(|t| t.as_i64()),
            text: params
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
        });
    }

    /// All captured messages, oldest first.
    pub fn messages(&self) -> &[WindowMessage] {
        &self.messages
    }

    /// Messages whose text contains `needle`.
    pub fn containing(&self, needle: &str) -> Vec<&WindowMessage> {
        self.messages
            .iter()
            .filter(|m| m.text.contains(needle))
            .collect()
    }

    /// Number of captured messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
