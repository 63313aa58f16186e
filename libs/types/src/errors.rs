//! Error types for the wire layer
//!
//! Error taxonomy using thiserror

use thiserror::Error;

/// Payload encode/decode failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Unsupported schema version {found} (supported: {supported})")]
    UnsupportedVersion { found: String, supported: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = CodecError::Malformed("expected value".to_string());
        assert_eq!(err.to_string(), "Malformed payload: expected value");
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = CodecError::UnsupportedVersion {
            found: "2.0.0".to_string(),
            supported: "1.0.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported schema version 2.0.0 (supported: 1.0.0)"
        );
    }
}
