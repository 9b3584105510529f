//! Mailbox names, LIST entries and selection state.

use super::{Flags, SeqNum, Uid, UidValidity};

/// Attribute attached to a LIST entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// `\Noselect`: the name exists only as a hierarchy node.
    NoSelect,
    /// `\NonExistent` (RFC 5258), implies `\Noselect`.
    NonExistent,
    /// `\Noinferiors`
    NoInferiors,
    /// `\HasChildren`
    HasChildren,
    /// `\HasNoChildren`
    HasNoChildren,
    /// `\Marked`
    Marked,
    /// `\Unmarked`
    Unmarked,
    /// `\All` special use.
    All,
    /// `\Archive` special use.
    Archive,
    /// `\Drafts` special use.
    Drafts,
    /// `\Flagged` special use.
    Flagged,
    /// `\Junk` special use.
    Junk,
    /// `\Sent` special use.
    Sent,
    /// `\Trash` special use.
    Trash,
    /// Any other attribute, verbatim.
    Other(String),
}

impl MailboxAttribute {
    /// Parses an attribute atom, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NONEXISTENT" => Self::NonExistent,
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Wire form of the attribute.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSelect => "\\Noselect",
            Self::NonExistent => "\\NonExistent",
            Self::NoInferiors => "\\Noinferiors",
            Self::HasChildren => "\\HasChildren",
            Self::HasNoChildren => "\\HasNoChildren",
            Self::Marked => "\\Marked",
            Self::Unmarked => "\\Unmarked",
            Self::All => "\\All",
            Self::Archive => "\\Archive",
            Self::Drafts => "\\Drafts",
            Self::Flagged => "\\Flagged",
            Self::Junk => "\\Junk",
            Self::Sent => "\\Sent",
            Self::Trash => "\\Trash",
            Self::Other(s) => s,
        }
    }
}

/// One untagged LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Attributes in server order.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Full mailbox name.
    pub name: String,
}

impl ListEntry {
    /// Returns false if the mailbox cannot be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| matches!(a, MailboxAttribute::NoSelect | MailboxAttribute::NonExistent))
    }
}

/// Mailbox state reported while processing SELECT or EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages (`EXISTS`).
    pub exists: u32,
    /// Number of recent messages (`RECENT`).
    pub recent: u32,
    /// First unseen message.
    pub unseen: Option<SeqNum>,
    /// Predicted next UID.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY of the selection.
    pub uid_validity: Option<UidValidity>,
    /// Flags defined in the mailbox.
    pub flags: Flags,
    /// Flags the client may change permanently.
    pub permanent_flags: Flags,
    /// True when the selection is read-only.
    pub read_only: bool,
}

/// A data item requested with the STATUS command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    /// `MESSAGES`
    Messages,
    /// `RECENT`
    Recent,
    /// `UIDNEXT`
    UidNext,
    /// `UIDVALIDITY`
    UidValidity,
    /// `UNSEEN`
    Unseen,
}

impl StatusItem {
    /// Wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// Untagged STATUS response data. Items the server omitted stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusData {
    /// Mailbox the data describes.
    pub mailbox: String,
    /// `MESSAGES`
    pub messages: Option<u32>,
    /// `RECENT`
    pub recent: Option<u32>,
    /// `UIDNEXT`
    pub uid_next: Option<Uid>,
    /// `UIDVALIDITY`
    pub uid_validity: Option<UidValidity>,
    /// `UNSEEN`
    pub unseen: Option<u32>,
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
    fn attribute_parse_is_case_insensitive() {
        assert_eq!(MailboxAttribute::parse("\\NoSelect"), MailboxAttribute::NoSelect);
        assert_eq!(MailboxAttribute::parse("\\spam"), MailboxAttribute::Junk);
        assert_eq!(
            MailboxAttribute::parse("\\Important"),
            MailboxAttribute::Other("\\Important".to_string())
        );
    }

    #[test]
    fn selectable() {
        let mut entry = ListEntry {
            attributes: vec![MailboxAttribute::HasChildren],
            delimiter: Some('/'),
            name: "[Gmail]".to_string(),
        };
        assert!(entry.is_selectable());
        entry.attributes.push(MailboxAttribute::NoSelect);
        assert!(!entry.is_selectable());
    }

    #[test]
    fn status_item_keywords() {
        assert_eq!(StatusItem::UidValidity.as_str(), "UIDVALIDITY");
        assert_eq!(StatusItem::Messages.as_str(), "MESSAGES");
    }
}
