//! Error types for skstan

use std::path::PathBuf;

use thiserror::Error;

/// skstan error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `skstan.json` exists but could not be read or is not a JSON object.
    #[error("failed to load config {}: {reason}", path.display())]
    ConfigLoad {
        /// Path of the offending config file.
        path: PathBuf,
        /// Parser or I/O message.
        reason: String,
    },

    /// No persisted artifact for the requested model name.
    #[error("model '{name}' not found at {}", path.display())]
    ModelNotFound {
        /// Requested model name.
        name: String,
        /// Path that was probed.
        path: PathBuf,
    },

    /// Persisted artifact is unreadable or was produced by an incompatible version.
    #[error("failed to deserialize {}: {reason}", path.display())]
    Deserialization {
        /// Artifact path.
        path: PathBuf,
        /// Why the artifact was rejected.
        reason: String,
    },

    /// No backend registered under this name.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// The backend cannot build the requested construct for this model variant.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Estimator used before `fit`.
    #[error("model is not fitted: {0}")]
    NotFitted(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Failure reported by the external statistical library, passed through unchanged.
    #[error("{backend} backend error: {message}")]
    Backend {
        /// Backend that failed.
        backend: String,
        /// Message from the library or process.
        message: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_message_names_path() {
        let e = Error::ModelNotFound {
            name: "linear_regression".to_string(),
            path: PathBuf::from("/models/stan/linear_regression.stan"),
        };
        let msg = e.to_string();
        assert!(msg.contains("linear_regression"));
        assert!(msg.contains("/models/stan/linear_regression.stan"));
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let e: Error = err.into();
        assert!(matches!(e, Error::Json(_)));
    }
}
