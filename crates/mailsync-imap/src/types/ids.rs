//! Command tags and message identifiers.

use std::fmt;
use std::num::NonZeroU32;

/// IMAP command tag.
///
/// Every command carries a tag and the server echoes it in the tagged
/// completion response, which is how a command's end is detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a raw value; `None` for zero, which IMAP never assigns.
            #[must_use]
            pub const fn new(n: u32) -> Option<Self> {
                match NonZeroU32::new(n) {
                    Some(n) => Some(Self(n)),
                    None => None,
                }
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value.get()
            }
        }
    };
}

nonzero_id! {
    /// Message sequence number.
    ///
    /// Session-local position of a message in the selected mailbox. Numbers
    /// shift down when earlier messages are expunged.
    SeqNum
}

nonzero_id! {
    /// Unique identifier of a message.
    ///
    /// Stable for as long as the mailbox's [`UidValidity`] does not change.
    Uid
}

nonzero_id! {
    /// UIDVALIDITY of a mailbox.
    ///
    /// A changed value means every UID obtained earlier is meaningless.
    UidValidity
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
    fn tag_display() {
        let tag = Tag::new("A0007");
        assert_eq!(tag.as_str(), "A0007");
        assert_eq!(tag.to_string(), "A0007");
    }

    #[test]
    fn zero_is_rejected() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
    }

    #[test]
    fn roundtrip_value() {
        assert_eq!(Uid::new(4_000_000_000).unwrap().get(), 4_000_000_000);
        assert_eq!(u32::from(SeqNum::new(9).unwrap()), 9);
    }

    #[test]
    fn ordering_follows_value() {
        assert!(Uid::new(2).unwrap() < Uid::new(10).unwrap());
    }
}
