//! Message sets used as command arguments.
//!
//! The same textual syntax (`1:4,7,9:*`) addresses sequence numbers in plain
//! commands and UIDs in `UID` commands, so one type serves both.

use std::fmt;

/// A set of message numbers.
///
/// Explicit sets are kept normalized: ascending, non-overlapping,
/// non-adjacent inclusive ranges. Merging two sets therefore never produces
/// duplicate numbers on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Every message in the mailbox (`1:*`).
    All,
    /// Normalized inclusive ranges.
    Ranges(Vec<(u32, u32)>),
}

impl SequenceSet {
    /// A set holding one number. `None` for zero.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        (n != 0).then(|| Self::Ranges(vec![(n, n)]))
    }

    /// An inclusive range. The bounds may be given in either order.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        if start == 0 || end == 0 {
            return None;
        }
        Some(Self::Ranges(vec![(start.min(end), start.max(end))]))
    }

    /// Builds a normalized set from arbitrary numbers.
    ///
    /// Returns `None` when the input is empty or contains zero: an empty
    /// set cannot be expressed in a command.
    pub fn from_numbers<I>(numbers: I) -> Option<Self>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut values: Vec<u32> = numbers.into_iter().collect();
        if values.is_empty() || values.contains(&0) {
            return None;
        }
        values.sort_unstable();
        values.dedup();

        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for n in values {
            match ranges.last_mut() {
                Some((_, end)) if end.checked_add(1) == Some(n) => *end = n,
                _ => ranges.push((n, n)),
            }
        }
        Some(Self::Ranges(ranges))
    }

    /// Merges another set into this one.
    pub fn merge(&mut self, other: &Self) {
        let Self::Ranges(theirs) = other else {
            *self = Self::All;
            return;
        };
        let Self::Ranges(mine) = self else {
            return;
        };
        mine.extend_from_slice(theirs);
        mine.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(mine.len());
        for &(start, end) in mine.iter() {
            match merged.last_mut() {
                Some((_, last_end)) if start <= last_end.saturating_add(1) => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        *mine = merged;
    }

    /// Returns the members of `self` that are not in `other`, or `None`
    /// when nothing is left.
    ///
    /// Works range by range, so the cost depends on the number of ranges,
    /// not on how many numbers they span. [`SequenceSet::All`] is only
    /// narrowed by another `All`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Option<Self> {
        let Self::Ranges(theirs) = other else {
            return None;
        };
        let Self::Ranges(mine) = self else {
            return Some(Self::All);
        };

        let mut remaining = Vec::with_capacity(mine.len());
        let mut next_cut = 0;
        for &(start, end) in mine {
            while next_cut < theirs.len() && theirs[next_cut].1 < start {
                next_cut += 1;
            }
            let mut from = start;
            let mut covered = false;
            while let Some(&(cut_start, cut_end)) = theirs.get(next_cut) {
                if cut_start > end {
                    break;
                }
                if cut_start > from {
                    remaining.push((from, cut_start - 1));
                }
                if cut_end >= end {
                    // The cut may reach into the next range.
                    covered = true;
                    break;
                }
                from = cut_end + 1;
                next_cut += 1;
            }
            if !covered {
                remaining.push((from, end));
            }
        }
        (!remaining.is_empty()).then_some(Self::Ranges(remaining))
    }

    /// Returns true if `n` is a member.
    #[must_use]
    pub fn contains(&self, n: u32) -> bool {
        match self {
            Self::All => n != 0,
            Self::Ranges(ranges) => ranges.iter().any(|&(s, e)| (s..=e).contains(&n)),
        }
    }

    /// Number of members, or `None` for [`SequenceSet::All`].
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Ranges(ranges) => Some(
                ranges
                    .iter()
                    .map(|&(s, e)| (e - s) as usize + 1)
                    .sum(),
            ),
        }
    }

    /// Iterates the members of an explicit set in ascending order.
    ///
    /// Yields nothing for [`SequenceSet::All`].
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let ranges: &[(u32, u32)] = match self {
            Self::All => &[],
            Self::Ranges(ranges) => ranges,
        };
        ranges.iter().flat_map(|&(s, e)| s..=e)
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("1:*"),
            Self::Ranges(ranges) => {
                for (i, &(start, end)) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if start == end {
                        write!(f, "{start}")?;
                    } else {
                        write!(f, "{start}:{end}")?;
                    }
                }
                Ok(())
            }
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

    mod construction_tests {
        use super::*;

        #[test]
        fn single_and_zero() {
            assert_eq!(SequenceSet::single(5).unwrap().to_string(), "5");
            assert!(SequenceSet::single(0).is_none());
        }

        #[test]
        fn range_is_ordered() {
            assert_eq!(SequenceSet::range(9, 3).unwrap().to_string(), "3:9");
            assert!(SequenceSet::range(0, 3).is_none());
        }

        #[test]
        fn compresses_runs() {
            let set = SequenceSet::from_numbers([7, 1, 2, 3, 9, 8, 3]).unwrap();
            assert_eq!(set.to_string(), "1:3,7:9");
            assert_eq!(set.count(), Some(6));
        }

        #[test]
        fn empty_or_zero_is_none() {
            assert!(SequenceSet::from_numbers(Vec::<u32>::new()).is_none());
            assert!(SequenceSet::from_numbers([0, 1]).is_none());
        }

        #[test]
        fn all_display() {
            assert_eq!(SequenceSet::All.to_string(), "1:*");
            assert!(SequenceSet::All.contains(100));
            assert_eq!(SequenceSet::All.count(), None);
        }
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn adjacent_ranges_join() {
            let mut a = SequenceSet::range(1, 3).unwrap();
            a.merge(&SequenceSet::range(4, 6).unwrap());
            assert_eq!(a.to_string(), "1:6");
        }

        #[test]
        fn overlapping_ranges_join() {
            let mut a = SequenceSet::from_numbers([1, 2, 10]).unwrap();
            a.merge(&SequenceSet::range(2, 5).unwrap());
            assert_eq!(a.to_string(), "1:5,10");
        }

        #[test]
        fn merge_with_all_is_all() {
            let mut a = SequenceSet::single(1).unwrap();
            a.merge(&SequenceSet::All);
            assert_eq!(a, SequenceSet::All);
        }
    }

    mod difference_tests {
        use super::*;

        #[test]
        fn cuts_inside_and_across_ranges() {
            let set = SequenceSet::from_numbers([1, 2, 3, 4, 5, 8, 9, 10]).unwrap();
            let cut = SequenceSet::from_numbers([2, 3, 5, 6, 7, 8]).unwrap();
            assert_eq!(set.difference(&cut).unwrap().to_string(), "1,4,9:10");
        }

        #[test]
        fn one_cut_spans_several_ranges() {
            let set = SequenceSet::from_numbers([1, 3, 5, 7]).unwrap();
            let cut = SequenceSet::range(2, 6).unwrap();
            assert_eq!(set.difference(&cut).unwrap().to_string(), "1,7");
        }

        #[test]
        fn whole_u32_range() {
            let set = SequenceSet::range(1, u32::MAX).unwrap();
            let cut = SequenceSet::from_numbers([1, 7, u32::MAX]).unwrap();
            let rest = set.difference(&cut).unwrap();
            assert_eq!(rest.to_string(), format!("2:6,8:{}", u32::MAX - 1));
            assert!(!rest.contains(u32::MAX));
        }

        #[test]
        fn nothing_left() {
            let set = SequenceSet::range(3, 9).unwrap();
            assert!(set.difference(&SequenceSet::range(1, 20).unwrap()).is_none());
            assert!(set.difference(&SequenceSet::All).is_none());
            assert_eq!(SequenceSet::All.difference(&set), Some(SequenceSet::All));
        }
    }

    proptest! {
        #[test]
        fn difference_matches_filter(a in proptest::collection::vec(1u32..200, 1..40),
                                     b in proptest::collection::vec(1u32..200, 1..40)) {
            let set = SequenceSet::from_numbers(a.clone()).unwrap();
            let cut = SequenceSet::from_numbers(b.clone()).unwrap();
            let expected = SequenceSet::from_numbers(a.into_iter().filter(|n| !b.contains(n)));
            prop_assert_eq!(set.difference(&cut), expected);
        }

        #[test]
        fn membership_is_preserved(values in proptest::collection::vec(1u32..500, 1..60)) {
            let set = SequenceSet::from_numbers(values.clone()).unwrap();
            for v in &values {
                prop_assert!(set.contains(*v));
            }
            let mut expected = values.clone();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(set.iter().collect::<Vec<_>>(), expected);
        }

        #[test]
        fn merge_is_union(a in proptest::collection::vec(1u32..200, 1..30),
                          b in proptest::collection::vec(1u32..200, 1..30)) {
            let mut merged = SequenceSet::from_numbers(a.clone()).unwrap();
            merged.merge(&SequenceSet::from_numbers(b.clone()).unwrap());
            let direct = SequenceSet::from_numbers(a.into_iter().chain(b)).unwrap();
            prop_assert_eq!(merged, direct);
        }
    }
}
