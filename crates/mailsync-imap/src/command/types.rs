//! Argument types shared by several commands.

use chrono::NaiveDate;

use crate::types::SequenceSet;

/// A FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `FLAGS`
    Flags,
    /// `INTERNALDATE`
    InternalDate,
    /// `RFC822.SIZE`
    Rfc822Size,
    /// `ENVELOPE`
    Envelope,
    /// `UID`
    Uid,
    /// `BODY[<section>]` or `BODY.PEEK[<section>]`.
    ///
    /// With `peek` the server must not set `\Seen` as a side effect.
    BodySection {
        /// Section specifier; `None` for the whole message.
        section: Option<String>,
        /// Use `BODY.PEEK`.
        peek: bool,
        /// Byte window `<origin.length>`.
        partial: Option<(u32, u32)>,
    },
}

impl FetchAttribute {
    /// The whole message without touching `\Seen`.
    #[must_use]
    pub const fn body_peek() -> Self {
        Self::BodySection {
            section: None,
            peek: true,
            partial: None,
        }
    }
}

/// How STORE combines the given flags with the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Replace,
}

impl StoreMode {
    pub(crate) const fn keyword(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS",
            Self::Remove => "-FLAGS",
            Self::Replace => "FLAGS",
        }
    }
}

/// A SEARCH key.
///
/// Adjacent keys in [`SearchKey::And`] are implicitly conjoined on the wire;
/// `Or` is strictly binary, so wider alternations nest to the right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// `ALL`
    All,
    /// `SEEN`
    Seen,
    /// `UNSEEN`
    Unseen,
    /// `FLAGGED`
    Flagged,
    /// `UNFLAGGED`
    Unflagged,
    /// `ANSWERED`
    Answered,
    /// `DELETED`
    Deleted,
    /// `UNDELETED`
    Undeleted,
    /// `DRAFT`
    Draft,
    /// `RECENT`: `\Recent` is set.
    Recent,
    /// `OLD`: `\Recent` is not set.
    Old,
    /// `NEW`: recent and unseen.
    New,
    /// `KEYWORD <flag>`
    Keyword(String),
    /// `UNKEYWORD <flag>`
    Unkeyword(String),
    /// `HEADER <field> <substring>`
    Header(String, String),
    /// `SUBJECT <substring>`
    Subject(String),
    /// `FROM <substring>`
    From(String),
    /// `TO <substring>`
    To(String),
    /// `CC <substring>`
    Cc(String),
    /// `BODY <substring>`
    Body(String),
    /// `TEXT <substring>`: header or body.
    Text(String),
    /// `SINCE <date>`: internal date on or after.
    Since(NaiveDate),
    /// `BEFORE <date>`: internal date strictly before.
    Before(NaiveDate),
    /// `ON <date>`
    On(NaiveDate),
    /// `SENTSINCE <date>`: Date header on or after.
    SentSince(NaiveDate),
    /// `SENTBEFORE <date>`
    SentBefore(NaiveDate),
    /// `SENTON <date>`
    SentOn(NaiveDate),
    /// `LARGER <n>`
    Larger(u32),
    /// `SMALLER <n>`
    Smaller(u32),
    /// `UID <set>`
    Uid(SequenceSet),
    /// Bare sequence set.
    Sequence(SequenceSet),
    /// Implicit conjunction. Empty means `ALL`.
    And(Vec<Self>),
    /// `OR <a> <b>`
    Or(Box<Self>, Box<Self>),
    /// `NOT <a>`
    Not(Box<Self>),
}

impl SearchKey {
    /// `OR` of two keys.
    #[must_use]
    pub fn or(a: Self, b: Self) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// `NOT` of a key.
    #[must_use]
    pub fn negate(key: Self) -> Self {
        Self::Not(Box::new(key))
    }

    /// Returns true if every string in the key is ASCII, so the search
    /// needs no `CHARSET`.
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        match self {
            Self::Keyword(s)
            | Self::Unkeyword(s)
            | Self::Subject(s)
            | Self::From(s)
            | Self::To(s)
            | Self::Cc(s)
            | Self::Body(s)
            | Self::Text(s) => s.is_ascii(),
            Self::Header(field, value) => field.is_ascii() && value.is_ascii(),
            Self::And(keys) => keys.iter().all(Self::is_ascii),
            Self::Or(a, b) => a.is_ascii() && b.is_ascii(),
            Self::Not(key) => key.is_ascii(),
            _ => true,
        }
    }
}
