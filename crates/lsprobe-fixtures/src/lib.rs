//! lsprobe-fixtures — schema validation for stored capability fixtures.
//!
//! A fixture is a JSON document describing one test client identity (its
//! `clientInfo` plus the capabilities it advertises). Fixtures are validated
//! against the pinned protocol schema both offline (the `check-capabilities`
//! hook) and as a pre-flight check before a session starts, so that a stale
//! fixture fails loudly instead of producing confusing protocol errors later.
pub mod error;
pub mod schema;

use std::path::{Path, PathBuf};

pub use error::FixtureError;
pub use schema::{validate_capabilities, Violation, SCHEMA_VERSION};

/// Outcome of validating one fixture file.
#[derive(Debug, Clone)]
pub struct FixtureReport {
    /// The fixture file that was checked.
    pub path: PathBuf,
    /// `None` when the fixture passed; otherwise the first violation found.
    pub violation: Option<Violation>,
}

impl FixtureReport {
    /// Whether the fixture validated cleanly.
    pub fn passed(&self) -> bool {
        self.violation.is_none()
    }
}

/// Validate a single fixture file against the pinned schema.
pub fn validate_file(path: &Path) -> Result<FixtureReport, FixtureError> {
    let raw = std::fs::read_to_string(path)?;
    let document: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| FixtureError::Parse(path.display().to_string(), e.to_string()))?;
    Ok(FixtureReport {
        path: path.to_path_buf(),
        violation: validate_capabilities(&document)?.err(),
    })
}

/// Validate every `*.json` fixture under `dir`, sorted by filename.
///
/// Returns one report per fixture. Directories without any fixture files
/// produce an empty set, which callers should treat as suspicious.
pub fn validate_dir(dir: &Path) -> Result<Vec<FixtureReport>, FixtureError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let report = validate_file(&path)?;
        if let Some(violation) = &report.violation {
            tracing::warn!(
                fixture = %report.path.display(),
                at = %violation.path,
                "fixture failed schema validation: {}",
                violation.message
            );
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Whether every report in the set passed.
pub fn all_passed(reports: &[FixtureReport]) -> bool {
    reports.iter().all(FixtureReport::passed)
}
