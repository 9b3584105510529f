//! Message identifiers.
//!
//! A message is addressed either by sequence number, its position in the
//! current selection, or by UID, which stays valid for as long as the
//! folder's UID validity does not change. The two numberings look alike
//! on the wire, so every set remembers which one it holds and refuses to
//! be merged with the other.

use std::collections::BTreeSet;
use std::fmt;

use mailsync_imap::{SeqNum, SequenceSet, Uid};

use crate::error::{Error, Result};

/// Which numbering an identifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IdKind {
    /// Position in the current selection; shifts on every expunge.
    Sequence,
    /// Stable identifier within one UID validity epoch.
    Uid,
}

impl IdKind {
    /// Returns true for UIDs.
    #[must_use]
    pub const fn is_uid(self) -> bool {
        matches!(self, Self::Uid)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sequence => "sequence",
            Self::Uid => "uid",
        })
    }
}

/// One message, by sequence number or UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageId {
    /// Sequence number.
    Seq(SeqNum),
    /// UID.
    Uid(Uid),
}

impl MessageId {
    /// Builds an identifier of the given kind. `None` for zero.
    #[must_use]
    pub const fn new(kind: IdKind, n: u32) -> Option<Self> {
        match kind {
            IdKind::Sequence => match SeqNum::new(n) {
                Some(seq) => Some(Self::Seq(seq)),
                None => None,
            },
            IdKind::Uid => match Uid::new(n) {
                Some(uid) => Some(Self::Uid(uid)),
                None => None,
            },
        }
    }

    /// Returns the numbering this identifier uses.
    #[must_use]
    pub const fn kind(self) -> IdKind {
        match self {
            Self::Seq(_) => IdKind::Sequence,
            Self::Uid(_) => IdKind::Uid,
        }
    }

    /// Returns the raw number.
    #[must_use]
    pub const fn get(self) -> u32 {
        match self {
            Self::Seq(seq) => seq.get(),
            Self::Uid(uid) => uid.get(),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(seq) => write!(f, "message #{seq}"),
            Self::Uid(uid) => write!(f, "message UID {uid}"),
        }
    }
}

/// A set of messages, all addressed the same way.
///
/// Unlike [`SequenceSet`], an `IdSet` may be empty: a search that matched
/// nothing is a valid result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSet {
    kind: IdKind,
    set: Option<SequenceSet>,
}

impl IdSet {
    /// An empty set.
    #[must_use]
    pub const fn empty(kind: IdKind) -> Self {
        Self { kind, set: None }
    }

    /// Every message in the folder (`1:*`).
    #[must_use]
    pub const fn all(kind: IdKind) -> Self {
        Self {
            kind,
            set: Some(SequenceSet::All),
        }
    }

    /// Builds a set from raw numbers. Zeros are dropped.
    pub fn from_numbers<I>(kind: IdKind, numbers: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        Self {
            kind,
            set: SequenceSet::from_numbers(numbers.into_iter().filter(|&n| n != 0)),
        }
    }

    /// Builds a UID set.
    pub fn uids<I>(numbers: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        Self::from_numbers(IdKind::Uid, numbers)
    }

    /// Builds a sequence-number set.
    pub fn sequence<I>(numbers: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        Self::from_numbers(IdKind::Sequence, numbers)
    }

    /// An inclusive range; bounds may come in either order. Empty if either
    /// bound is zero.
    #[must_use]
    pub fn range(kind: IdKind, start: u32, end: u32) -> Self {
        Self {
            kind,
            set: SequenceSet::range(start, end),
        }
    }

    /// Returns the numbering of the members.
    #[must_use]
    pub const fn kind(&self) -> IdKind {
        self.kind
    }

    /// Returns true if the set has no members.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.set.is_none()
    }

    /// Number of members; `None` for [`IdSet::all`].
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match &self.set {
            None => Some(0),
            Some(set) => set.count(),
        }
    }

    /// Returns true if `id` is a member. Identifiers of the other kind
    /// never are.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        id.kind() == self.kind && self.set.as_ref().is_some_and(|set| set.contains(id.get()))
    }

    /// Iterates explicit members in ascending order. Yields nothing for
    /// [`IdSet::all`].
    pub fn iter(&self) -> impl Iterator<Item = MessageId> + '_ {
        let kind = self.kind;
        self.set
            .iter()
            .flat_map(SequenceSet::iter)
            .filter_map(move |n| MessageId::new(kind, n))
    }

    /// Adds the members of `other`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdKindMismatch`] if `other` uses the other
    /// numbering; `self` is left unchanged.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if other.kind != self.kind {
            return Err(Error::IdKindMismatch {
                expected: self.kind,
                found: other.kind,
            });
        }
        let Some(theirs) = &other.set else {
            return Ok(());
        };
        if let Some(mine) = self.set.as_mut() {
            mine.merge(theirs);
        } else {
            self.set = Some(theirs.clone());
        }
        Ok(())
    }

    /// Adds one identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdKindMismatch`] if `id` uses the other numbering.
    pub fn insert(&mut self, id: MessageId) -> Result<()> {
        self.merge(&Self::from_numbers(id.kind(), [id.get()]))
    }

    /// Returns the members of `self` that are not in `other`.
    ///
    /// Only explicit sets can be subtracted from; [`IdSet::all`] minus
    /// anything is returned unchanged. Large ranges are subtracted without
    /// being expanded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdKindMismatch`] if the numberings differ.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        if other.kind != self.kind {
            return Err(Error::IdKindMismatch {
                expected: self.kind,
                found: other.kind,
            });
        }
        let (Some(mine @ SequenceSet::Ranges(_)), Some(theirs)) = (&self.set, &other.set) else {
            return Ok(self.clone());
        };
        Ok(Self {
            kind: self.kind,
            set: mine.difference(theirs),
        })
    }

    /// Returns the explicit members as raw numbers.
    #[must_use]
    pub fn numbers(&self) -> BTreeSet<u32> {
        self.set.iter().flat_map(SequenceSet::iter).collect()
    }

    /// Returns the wire form, or `None` when empty.
    #[must_use]
    pub const fn as_sequence_set(&self) -> Option<&SequenceSet> {
        self.set.as_ref()
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.set {
            None => write!(f, "{} (empty)", self.kind),
            Some(set) => write!(f, "{} {set}", self.kind),
        }
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
    use proptest::prelude::*;

    mod message_id_tests {
        use super::*;

        #[test]
        fn test_new_rejects_zero() {
            assert!(MessageId::new(IdKind::Uid, 0).is_none());
            let id = MessageId::new(IdKind::Uid, 7).unwrap();
            assert_eq!(id.kind(), IdKind::Uid);
            assert_eq!(id.get(), 7);
            assert_eq!(id.to_string(), "message UID 7");
        }

        #[test]
        fn test_sequence_display() {
            let id = MessageId::new(IdKind::Sequence, 3).unwrap();
            assert_eq!(id.to_string(), "message #3");
        }
    }

    mod id_set_tests {
        use super::*;

        #[test]
        fn test_empty() {
            let set = IdSet::uids([]);
            assert!(set.is_empty());
            assert_eq!(set.len(), Some(0));
            assert!(set.as_sequence_set().is_none());
            assert_eq!(set.to_string(), "uid (empty)");
        }

        #[test]
        fn test_zero_dropped() {
            let set = IdSet::uids([0, 4]);
            assert_eq!(set.len(), Some(1));
        }

        #[test]
        fn test_merge_same_kind() {
            let mut set = IdSet::uids([1, 2]);
            set.merge(&IdSet::range(IdKind::Uid, 3, 5)).unwrap();
            assert_eq!(set.as_sequence_set().unwrap().to_string(), "1:5");
        }

        #[test]
        fn test_merge_into_empty() {
            let mut set = IdSet::empty(IdKind::Sequence);
            set.merge(&IdSet::sequence([9])).unwrap();
            assert_eq!(set.to_string(), "sequence 9");
        }

        #[test]
        fn test_merge_rejects_other_kind() {
            let mut set = IdSet::uids([1]);
            let error = set.merge(&IdSet::sequence([2])).unwrap_err();
            assert!(matches!(
                error,
                Error::IdKindMismatch {
                    expected: IdKind::Uid,
                    found: IdKind::Sequence
                }
            ));
            assert_eq!(set.len(), Some(1));
        }

        #[test]
        fn test_contains_checks_kind() {
            let set = IdSet::uids([5]);
            assert!(set.contains(MessageId::new(IdKind::Uid, 5).unwrap()));
            assert!(!set.contains(MessageId::new(IdKind::Sequence, 5).unwrap()));
            assert!(IdSet::all(IdKind::Uid).contains(MessageId::new(IdKind::Uid, 99).unwrap()));
        }

        #[test]
        fn test_difference() {
            let set = IdSet::uids([1, 2, 3, 4]);
            let rest = set.difference(&IdSet::uids([2, 4, 8])).unwrap();
            assert_eq!(rest.numbers().into_iter().collect::<Vec<_>>(), vec![1, 3]);
            assert!(set.difference(&IdSet::uids([1, 2, 3, 4])).unwrap().is_empty());
        }

        #[test]
        fn test_difference_of_huge_range() {
            let set = IdSet::range(IdKind::Uid, 1, u32::MAX);
            let rest = set.difference(&IdSet::uids([2])).unwrap();
            assert_eq!(rest.len(), Some(u32::MAX as usize - 1));
            assert!(!rest.contains(MessageId::new(IdKind::Uid, 2).unwrap()));
            assert!(rest.contains(MessageId::new(IdKind::Uid, u32::MAX).unwrap()));
            let all = IdSet::all(IdKind::Uid);
            assert_eq!(all.difference(&IdSet::uids([2])).unwrap(), all);
            assert!(set.difference(&IdSet::all(IdKind::Uid)).unwrap().is_empty());
        }

        #[test]
        fn test_insert() {
            let mut set = IdSet::empty(IdKind::Uid);
            set.insert(MessageId::new(IdKind::Uid, 3).unwrap()).unwrap();
            assert!(set.insert(MessageId::new(IdKind::Sequence, 3).unwrap()).is_err());
            assert_eq!(set.iter().collect::<Vec<_>>().len(), 1);
        }
    }

    proptest! {
        #[test]
        fn prop_merge_is_union(a in prop::collection::vec(1u32..200, 0..20),
                               b in prop::collection::vec(1u32..200, 0..20)) {
            let mut merged = IdSet::uids(a.clone());
            merged.merge(&IdSet::uids(b.clone())).unwrap();
            let expected: BTreeSet<u32> = a.into_iter().chain(b).collect();
            prop_assert_eq!(merged.numbers(), expected);
        }

        #[test]
        fn prop_difference_excludes(a in prop::collection::vec(1u32..100, 0..20),
                                    b in prop::collection::vec(1u32..100, 0..20)) {
            let rest = IdSet::uids(a.clone()).difference(&IdSet::uids(b.clone())).unwrap();
            for n in rest.numbers() {
                prop_assert!(a.contains(&n));
                prop_assert!(!b.contains(&n));
            }
        }
    }
}
