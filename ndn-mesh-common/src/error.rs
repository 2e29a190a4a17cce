//! Error types for ndn-mesh.

use thiserror::Error;

/// All possible errors that can occur within ndn-mesh.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or truncated TLV, unexpected type tag or length mismatch.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// No response arrived within the Interest lifetime.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The forwarder rejected a command or a dataset request.
    #[error("Management error {code}: {text}")]
    Management { code: u64, text: String },

    /// No signing identity is available for command Interests.
    #[error("Security error: {0}")]
    Security(String),

    /// A lookup (e.g. URI to FaceId) found zero or ambiguous matches.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Sending or receiving through the underlying transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// The forwarder status code carried by a management error.
    pub fn status_code(&self) -> Option<u64> {
        match self {
            Error::Management { code, .. } => Some(*code),
            _ => None,
        }
    }
}
