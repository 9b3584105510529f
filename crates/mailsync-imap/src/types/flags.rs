//! Message flags.

use std::collections::BTreeSet;
use std::fmt;

/// A message flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent`
    Recent,
    /// `\*` in PERMANENTFLAGS: new keywords may be created.
    MayCreate,
    /// Keyword or unrecognized system flag, stored verbatim.
    Keyword(String),
}

impl Flag {
    /// Parses a flag atom. Case-insensitive for system flags.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            "\\*" => Self::MayCreate,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Wire form of the flag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::MayCreate => "\\*",
            Self::Keyword(s) => s,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unordered set of flags.
///
/// Two sets compare equal regardless of the order the server listed them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(BTreeSet<Flag>);

impl Flags {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds a flag. Returns false if it was already present.
    pub fn insert(&mut self, flag: Flag) -> bool {
        self.0.insert(flag)
    }

    /// Removes a flag. Returns false if it was absent.
    pub fn remove(&mut self, flag: &Flag) -> bool {
        self.0.remove(flag)
    }

    /// Returns true if `flag` is set.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    /// Shorthand for `contains(&Flag::Seen)`.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Shorthand for `contains(&Flag::Flagged)`.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.contains(&Flag::Flagged)
    }

    /// Iterates the flags in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.0.iter()
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::collections::btree_set::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Flags {
    type Item = &'a Flag;
    type IntoIter = std::collections::btree_set::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parenthesized list form, e.g. `(\Seen \Flagged)`.
impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, flag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(flag.as_str())?;
        }
        f.write_str(")")
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

    #[test]
    fn parse_system_flags_ignoring_case() {
        assert_eq!(Flag::parse("\\seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\FLAGGED"), Flag::Flagged);
        assert_eq!(Flag::parse("\\*"), Flag::MayCreate);
    }

    #[test]
    fn keyword_kept_verbatim() {
        assert_eq!(
            Flag::parse("$Forwarded"),
            Flag::Keyword("$Forwarded".to_string())
        );
        assert_eq!(Flag::parse("$Forwarded").as_str(), "$Forwarded");
    }

    #[test]
    fn order_does_not_matter() {
        let a: Flags = [Flag::Seen, Flag::Flagged].into_iter().collect();
        let b: Flags = [Flag::Flagged, Flag::Seen].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn insert_and_remove() {
        let mut flags = Flags::new();
        assert!(flags.insert(Flag::Seen));
        assert!(!flags.insert(Flag::Seen));
        assert!(flags.is_seen());
        assert!(flags.remove(&Flag::Seen));
        assert!(flags.is_empty());
    }

    #[test]
    fn display_list() {
        let flags: Flags = [Flag::Flagged, Flag::Seen].into_iter().collect();
        assert_eq!(flags.to_string(), "(\\Seen \\Flagged)");
        assert_eq!(Flags::new().to_string(), "()");
    }
}
