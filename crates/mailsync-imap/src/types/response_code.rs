//! Bracketed response codes (`[UIDVALIDITY 1]`, `[READ-ONLY]`, ...).

use super::{Capability, Flag, SeqNum, Uid, UidValidity};

/// Response code carried in a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`: text must be shown to the user.
    Alert,
    /// `CAPABILITY` list piggybacked on a status response.
    Capability(Vec<Capability>),
    /// `PERMANENTFLAGS`
    PermanentFlags(Vec<Flag>),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `TRYCREATE`
    TryCreate,
    /// `NONEXISTENT` (RFC 5530)
    NonExistent,
    /// `AUTHENTICATIONFAILED` (RFC 5530)
    AuthenticationFailed,
    /// `UIDNEXT`
    UidNext(Uid),
    /// `UIDVALIDITY`
    UidValidity(UidValidity),
    /// `UNSEEN`
    Unseen(SeqNum),
    /// `CLOSED` (RFC 7162): the previous selection ended.
    Closed,
    /// Any other code, verbatim.
    Other(String),
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn carries_values() {
        let code = ResponseCode::UidValidity(UidValidity::new(1).unwrap());
        assert_eq!(code, ResponseCode::UidValidity(UidValidity::new(1).unwrap()));
        assert_ne!(code, ResponseCode::ReadOnly);
    }
}
