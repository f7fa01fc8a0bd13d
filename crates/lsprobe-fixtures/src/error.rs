//! Fixture validation error types.
/// Errors from loading or validating capability fixtures.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// The fixture file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The fixture file is not well-formed JSON.
    #[error("fixture {0} is not valid JSON: {1}")]
    Parse(String, String),

    /// The embedded schema itself failed to compile.
    #[error("protocol schema is invalid: {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_display() {
        let err = FixtureError::Parse("caps.json".into(), "eof".into());
        assert_eq!(err.to_string(), "fixture caps.json is not valid JSON: eof");
    }

    #[test]
    fn io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = FixtureError::from(io);
        assert!(err.to_string().contains("missing"));
    }
}
