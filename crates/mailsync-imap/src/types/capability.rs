//! Server capabilities and completion status.

use std::fmt;

/// Status word of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `OK`
    Ok,
    /// `NO`: the command was understood but refused.
    No,
    /// `BAD`: the command was not understood.
    Bad,
    /// `PREAUTH` greeting.
    PreAuth,
    /// `BYE`: the server is closing the connection.
    Bye,
}

impl Status {
    /// Returns true for `OK` and `PREAUTH`.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// A single advertised capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1`
    Imap4Rev1,
    /// `IMAP4rev2`
    Imap4Rev2,
    /// `IDLE` (RFC 2177)
    Idle,
    /// `STARTTLS`
    StartTls,
    /// `LOGINDISABLED`: plaintext LOGIN is refused.
    LoginDisabled,
    /// `SASL-IR` (RFC 4959): initial response may follow AUTHENTICATE.
    SaslIr,
    /// `AUTH=<mechanism>`, mechanism upper-cased.
    Auth(String),
    /// `UIDPLUS`
    UidPlus,
    /// `MOVE`
    Move,
    /// `ID` (RFC 2971)
    Id,
    /// `SPECIAL-USE`
    SpecialUse,
    /// Anything else, verbatim.
    Other(String),
}

impl Capability {
    /// Parses one capability atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "ID" => Self::Id,
            "SPECIAL-USE" => Self::SpecialUse,
            _ => match upper.strip_prefix("AUTH=") {
                Some(mechanism) => Self::Auth(mechanism.to_string()),
                None => Self::Other(s.to_string()),
            },
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::Imap4Rev2 => f.write_str("IMAP4rev2"),
            Self::Idle => f.write_str("IDLE"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::LoginDisabled => f.write_str("LOGINDISABLED"),
            Self::SaslIr => f.write_str("SASL-IR"),
            Self::Auth(mechanism) => write!(f, "AUTH={mechanism}"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::Move => f.write_str("MOVE"),
            Self::Id => f.write_str("ID"),
            Self::SpecialUse => f.write_str("SPECIAL-USE"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// The capability set last advertised by the server.
///
/// A missing capability is never an error by itself; callers consult the
/// set and pick a fallback (polling instead of IDLE, LOGIN instead of a
/// SASL mechanism).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Wraps a parsed list.
    #[must_use]
    pub const fn new(caps: Vec<Capability>) -> Self {
        Self(caps)
    }

    /// Returns true if `cap` was advertised.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.0.contains(cap)
    }

    /// Returns true if `AUTH=<mechanism>` was advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Returns true if IDLE is available.
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.has(&Capability::Idle)
    }

    /// Iterates the advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    /// Returns true if nothing has been advertised yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
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

    mod status_tests {
        use super::*;

        #[test]
        fn ok_like() {
            assert!(Status::Ok.is_ok());
            assert!(Status::PreAuth.is_ok());
            assert!(!Status::No.is_ok());
            assert!(!Status::Bye.is_ok());
        }
    }

    mod capability_tests {
        use super::*;

        #[test]
        fn parse_known() {
            assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
            assert_eq!(Capability::parse("IDLE"), Capability::Idle);
            assert_eq!(Capability::parse("SASL-IR"), Capability::SaslIr);
        }

        #[test]
        fn parse_auth_mechanism() {
            assert_eq!(
                Capability::parse("auth=xoauth2"),
                Capability::Auth("XOAUTH2".to_string())
            );
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(
                Capability::parse("X-GM-EXT-1"),
                Capability::Other("X-GM-EXT-1".to_string())
            );
        }

        #[test]
        fn set_queries() {
            let caps = Capabilities::new(vec![
                Capability::Imap4Rev1,
                Capability::Auth("PLAIN".to_string()),
            ]);
            assert!(caps.has_auth("plain"));
            assert!(!caps.has_auth("XOAUTH2"));
            assert!(!caps.supports_idle());
        }
    }
}
