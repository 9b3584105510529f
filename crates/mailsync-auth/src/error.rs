//! Error types for credential handling.

/// Result type alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Credential error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bearer token expired before it could be presented.
    #[error("token expired")]
    TokenExpired,

    /// The server sent a challenge the mechanism does not expect.
    #[error("unexpected {mechanism} challenge: {challenge}")]
    UnexpectedChallenge {
        /// Mechanism in progress.
        mechanism: &'static str,
        /// Decoded challenge text.
        challenge: String,
    },

    /// A challenge was not valid base64.
    #[error("invalid base64 challenge: {0}")]
    Base64(#[from] base64::DecodeError),

    /// An OAuth error challenge was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
