//! Error types for MIME decoding.
//!
//! Errors fall into three tiers, from most to least tolerable. The
//! [`Reader`](crate::Reader) absorbs the first two and records them as
//! warnings; only [`Tier::Fatal`] errors are returned from
//! [`Reader::next_part`](crate::Reader::next_part).

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How far an error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Only the decoded-text view of one part is lost.
    Charset,
    /// The structure is damaged. A skipped header line loses only that
    /// line; a broken multipart stops decomposition of the remaining parts.
    Structure,
    /// The message cannot be decoded.
    Fatal,
}

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The body literal was empty.
    #[error("message is empty")]
    Empty,

    /// A header line that is neither a field nor a continuation. It was
    /// skipped.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Content-Type value could not be parsed.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Base64 transfer encoding could not be decoded.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// A part declared a charset with no known decoder.
    #[error("unsupported charset: {0}")]
    UnknownCharset(String),

    /// A multipart entity has no boundary parameter or no delimiter line.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// A multipart entity ended without its closing delimiter.
    #[error("multipart {boundary:?} has no closing delimiter")]
    UnterminatedMultipart {
        /// Boundary of the unterminated entity.
        boundary: String,
    },

    /// Multipart nesting exceeded the decoder's limit.
    #[error("multipart nesting deeper than {0} levels")]
    TooDeep(usize),
}

impl Error {
    /// Returns the tier this error belongs to.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        match self {
            Self::UnknownCharset(_) => Tier::Charset,
            Self::InvalidHeader(_)
            | Self::InvalidContentType(_)
            | Self::MissingBoundary
            | Self::UnterminatedMultipart { .. }
            | Self::TooDeep(_) => Tier::Structure,
            Self::Empty | Self::Base64Decode(_) => Tier::Fatal,
        }
    }

    /// Returns true when decoding can go on past this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self.tier(), Tier::Fatal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_are_ordered() {
        assert!(Tier::Charset < Tier::Structure);
        assert!(Tier::Structure < Tier::Fatal);
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::UnknownCharset("x-foo".into()).is_recoverable());
        assert!(Error::MissingBoundary.is_recoverable());
        assert!(!Error::Empty.is_recoverable());
    }

    #[test]
    fn test_display() {
        let error = Error::UnterminatedMultipart {
            boundary: "b1".into(),
        };
        assert_eq!(error.to_string(), "multipart \"b1\" has no closing delimiter");
    }
}
