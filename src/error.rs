//! Error types for the Hemmer provider framework.
//!
//! Plan modification itself never fails with a Rust error: problems found
//! while walking a schema are reported as [`Diagnostic`](crate::diag::Diagnostic)s.
//! `ProviderError` covers the fallible building blocks underneath the walk
//! (path lookups, value conversion, JSON decoding) and the
//! server-level dispatch.

use thiserror::Error;

/// Errors raised by the framework's data access and server layers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource type is not registered with the server.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A path cannot be applied to a schema or value.
    #[error("Invalid attribute path {path}: {reason}")]
    InvalidPath {
        /// The offending path, rendered as a string.
        path: String,
        /// Why the path could not be applied.
        reason: String,
    },

    /// The path leads to a block where an attribute was expected.
    #[error("Path leads to a block, not an attribute: {0}")]
    PathIsBlock(String),

    /// The path descends into an attribute that has no nested schema.
    #[error("Path is inside an attribute without nested attributes: {0}")]
    PathInsideAtomicAttribute(String),

    /// A value does not have the shape its type requires.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The declared type.
        expected: String,
        /// The runtime shape that was encountered.
        found: String,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request from the orchestration engine.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    pub(crate) fn invalid_path(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(expected: impl ToString, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.into(),
        }
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::UnknownResource(msg)
            | Self::PathIsBlock(msg)
            | Self::PathInsideAtomicAttribute(msg)
            | Self::InvalidRequest(msg) => msg.clone(),
            Self::InvalidPath { path, reason } => format!("{}: {}", path, reason),
            Self::TypeMismatch { expected, found } => {
                format!("expected {}, found {}", expected, found)
            },
            Self::Serialization(err) => err.to_string(),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::InvalidPath { .. } | ProviderError::TypeMismatch { .. } => {
                tonic::Status::invalid_argument(err.to_string())
            },
            ProviderError::PathIsBlock(msg) | ProviderError::PathInsideAtomicAttribute(msg) => {
                tonic::Status::invalid_argument(msg)
            },
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::UnknownResource("custom_resource".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: custom_resource");

        let err = ProviderError::invalid_path("tags[0]", "step cannot be applied to a string");
        assert_eq!(
            format!("{}", err),
            "Invalid attribute path tags[0]: step cannot be applied to a string"
        );

        let err = ProviderError::type_mismatch("list of string", "object");
        assert_eq!(
            format!("{}", err),
            "Type mismatch: expected list of string, found object"
        );
    }

    #[test]
    fn test_error_to_status() {
        let err = ProviderError::UnknownResource("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let err = ProviderError::invalid_path("name", "not in schema");
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let err = ProviderError::PathIsBlock("network".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "network");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::PathIsBlock("network".to_string());
        assert_eq!(err.message(), "network");

        let err = ProviderError::type_mismatch("bool", "string");
        assert_eq!(err.message(), "expected bool, found string");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }

    #[test]
    fn test_serialization_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::Serialization(_)));
        assert!(format!("{}", err).starts_with("Serialization error:"));
    }
}
