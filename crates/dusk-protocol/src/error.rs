use thiserror::Error;

/// Errors raised while encoding or interpreting protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
