//! Collaborator failure types.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the OCR and LLM collaborator clients.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// A required credential variable is not set in the environment
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// The source document could not be read
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP transport failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with an error status
    #[error("remote service error ({status}): {detail}")]
    Remote { status: u16, detail: String },

    /// The remote analysis never reached a terminal success state
    #[error("analysis did not complete: {0}")]
    Incomplete(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let missing = CollaboratorError::MissingCredentials("AZURE_DI_KEY");
        assert_eq!(
            missing.to_string(),
            "missing credentials: AZURE_DI_KEY is not set"
        );

        let remote = CollaboratorError::Remote {
            status: 429,
            detail: "rate limited".to_string(),
        };
        assert_eq!(remote.to_string(), "remote service error (429): rate limited");

        let incomplete = CollaboratorError::Incomplete("stuck".to_string());
        assert_eq!(incomplete.to_string(), "analysis did not complete: stuck");
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = CollaboratorError::Io {
            path: PathBuf::from("/inbox/r.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/inbox/r.jpg"));
    }
}
