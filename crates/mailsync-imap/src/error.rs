//! Error types for the IMAP layer.

use std::time::Duration;

use thiserror::Error;

use crate::types::ResponseCode;

/// Errors raised by the client, the framer and the parser.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or record failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name not usable for certificate verification.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The response did not follow the grammar.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Offset into the response.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// Authentication was refused.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The credential could not produce its next step.
    #[error("credential error: {0}")]
    Credential(#[from] mailsync_auth::Error),

    /// Tagged `NO`.
    #[error("server returned NO: {text}")]
    No {
        /// Bracketed code, if any.
        code: Option<ResponseCode>,
        /// Server text.
        text: String,
    },

    /// Tagged `BAD`.
    #[error("server returned BAD: {0}")]
    Bad(String),

    /// `BYE` outside of LOGOUT.
    #[error("server closed the connection: {0}")]
    Bye(String),

    /// The peer closed the stream.
    #[error("connection closed by server")]
    Closed,

    /// An I/O step exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A command argument cannot be put on the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Well-formed but out-of-sequence data, or a resource limit hit.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if the server refused the command but the connection is
    /// still in a known state.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::No { .. } | Self::Bad(_))
    }

    /// Returns true if the transport can no longer be trusted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Bye(_) | Self::Closed | Self::Timeout(_)
        )
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
