//! Command tag allocation.

use crate::types::Tag;

/// Produces sequential tags: `A0000`, `A0001`, ...
///
/// One generator belongs to one connection; tags only need to be unique
/// among the commands in flight on that connection.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    prefix: char,
    next: u32,
}

impl TagGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { prefix, next: 0 }
    }

    /// Allocates the next tag. The counter wraps after `u32::MAX`.
    pub fn next_tag(&mut self) -> Tag {
        let n = self.next;
        self.next = self.next.wrapping_add(1);
        Tag::new(format!("{}{n:04}", self.prefix))
    }

    /// Number of tags handed out so far (modulo wrap).
    #[must_use]
    pub const fn issued(&self) -> u32 {
        self.next
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
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
    fn sequential() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next_tag().as_str(), "A0000");
        assert_eq!(tags.next_tag().as_str(), "A0001");
        assert_eq!(tags.issued(), 2);
    }

    #[test]
    fn custom_prefix_and_wide_numbers() {
        let mut tags = TagGenerator::new('X');
        tags.next = 12345;
        assert_eq!(tags.next_tag().as_str(), "X12345");
    }

    #[test]
    fn wraps_instead_of_panicking() {
        let mut tags = TagGenerator::new('A');
        tags.next = u32::MAX;
        let _ = tags.next_tag();
        assert_eq!(tags.next_tag().as_str(), "A0000");
    }
}
