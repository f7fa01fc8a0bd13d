//! Capability negotiation: building the client CapabilitySet and
//! pre-flight validation of fixture-sourced sets.
use std::path::Path;

use lsprobe_fixtures::{validate_capabilities, SCHEMA_VERSION};

use crate::error::SessionError;

/// Recognized optional feature groups a test client may advertise.
///
/// Each enabled option merges one sub-document into the outgoing
/// CapabilitySet. The enumeration is configuration, not protocol logic:
/// tests that need a capability shape outside this set supply a full
/// fixture document instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilityOptions {
    /// Advertise document synchronization (didOpen/didChange/didSave).
    pub text_sync: bool,
    /// Advertise completion-request support.
    pub completion: bool,
    /// Advertise hover-request support.
    pub hover: bool,
    /// Advertise published-diagnostics support.
    pub diagnostics: bool,
    /// Advertise workspace-folder support.
    pub workspace_folders: bool,
}

impl CapabilityOptions {
    /// All feature groups enabled.
    pub fn all() -> Self {
        Self {
            text_sync: true,
            completion: true,
            hover: true,
            diagnostics: true,
            workspace_folders: true,
        }
    }

    /// Build the capabilities sub-document for these options.
    pub fn to_capabilities(&self) -> serde_json::Value {
        let mut text_document = serde_json::Map::new();
        if self.text_sync {
            text_document.insert(
                "synchronization".into(),
                serde_json::json!({"didSave": true, "willSave": false}),
            );
        }
        if self.completion {
            text_document.insert(
                "completion".into(),
                serde_json::json!({"contextSupport": true}),
            );
        }
        if self.hover {
            text_document.insert(
                "hover".into(),
                serde_json::json!({"contentFormat": ["markdown", "plaintext"]}),
            );
        }
        if self.diagnostics {
            text_document.insert(
                "publishDiagnostics".into(),
                serde_json::json!({"relatedInformation": true}),
            );
        }

        let mut capabilities = serde_json::Map::new();
        if !text_document.is_empty() {
            capabilities.insert(
                "textDocument".into(),
                serde_json::Value::Object(text_document),
            );
        }
        if self.workspace_folders {
            capabilities.insert(
                "workspace".into(),
                serde_json::json!({"workspaceFolders": true}),
            );
        }
        serde_json::Value::Object(capabilities)
    }
}

/// The client identity offered at initialize.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Client name sent in `clientInfo`.
    pub name: String,
    /// Client version sent in `clientInfo`.
    pub version: String,
    /// The capabilities document to offer.
    pub capabilities: serde_json::Value,
}

impl ClientIdentity {
    /// Build an identity from recognized capability options.
    pub fn from_options(name: impl Into<String>, options: CapabilityOptions) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: options.to_capabilities(),
        }
    }

    /// Load an identity from a capability fixture file.
    ///
    /// The fixture is validated against the pinned protocol schema
    /// (version 3.17) before use; a stale or malformed fixture aborts
    /// session start rather than producing confusing protocol errors later.
    pub fn from_fixture(path: &Path) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            SessionError::InvalidCapabilityFixture(format!("{}: {}", path.display(), e))
        })?;
        Self::from_fixture_value(document)
    }

    /// Validate and adopt an in-memory fixture document.
    pub fn from_fixture_value(document: serde_json::Value) -> Result<Self, SessionError> {
        let check = validate_capabilities(&document)
            .map_err(|e| SessionError::InvalidCapabilityFixture(e.to_string()))?;
        if let Err(violation) = check {
            tracing::error!(
                schema = SCHEMA_VERSION,
                at = %violation.path,
                "capability fixture rejected: {}",
                violation.message
            );
            return Err(SessionError::InvalidCapabilityFixture(violation.to_string()));
        }

        let name = document["clientInfo"]["name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        let version = document["clientInfo"]["version"]
            .as_str()
            .unwrap_or("0")
            .to_string();
        let capabilities = document["capabilities"].clone();
        Ok(Self {
            name,
            version,
            capabilities,
        })
    }
}

/// The capability sets fixed by a completed handshake.
///
/// Immutable once recorded: the server's set is stored verbatim for later
/// inspection and never interpreted beyond its structure. Feature gating
/// belongs to the calling test code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedCapabilities {
    /// What the client offered.
    pub client: serde_json::Value,
    /// What the server advertised in its initialize response.
    pub server: serde_json::Value,
}

impl NegotiatedCapabilities {
    /// Look up a server capability by dotted path, e.g.
    /// `"completionProvider.triggerCharacters"`.
    pub fn server_capability(&self, dotted: &str) -> Option<&serde_json::Value> {
        let mut current = &self.server;
        for part in dotted.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}
