//! The pinned protocol schema and the validation entry point.
use std::sync::OnceLock;

use crate::error::FixtureError;

/// Protocol version the embedded schema is pinned to.
pub const SCHEMA_VERSION: &str = "3.17";

/// The embedded client-capability schema document.
const SCHEMA_JSON: &str = include_str!("../schema/client_capabilities.schema.json");

/// The first schema violation found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer to the offending location in the instance.
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

fn compiled_schema() -> Result<&'static jsonschema::Validator, FixtureError> {
    static VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
    let compiled = VALIDATOR.get_or_init(|| {
        let schema: serde_json::Value =
            serde_json::from_str(SCHEMA_JSON).map_err(|e| e.to_string())?;
        jsonschema::validator_for(&schema).map_err(|e| e.to_string())
    });
    match compiled {
        Ok(validator) => Ok(validator),
        Err(e) => Err(FixtureError::Schema(e.clone())),
    }
}

/// Validate a capability document against the pinned schema.
///
/// Returns `Ok(Ok(()))` when the document conforms, `Ok(Err(violation))`
/// with the first violation when it does not, and `Err` only when the
/// embedded schema itself is broken.
pub fn validate_capabilities(
    document: &serde_json::Value,
) -> Result<Result<(), Violation>, FixtureError> {
    let validator = compiled_schema()?;
    match validator.validate(document) {
        Ok(()) => Ok(Ok(())),
        Err(error) => Ok(Err(Violation {
            path: error.instance_path().to_string(),
            message: error.to_string(),
        })),
    }
}
