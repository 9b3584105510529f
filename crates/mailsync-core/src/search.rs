//! Search criteria and their evaluation.
//!
//! Criteria combine by conjunction: every field that is set must match.
//! Alternatives are pairs of nested criteria; more than two alternatives
//! nest to the right, `a OR (b OR c)`. Exclusions are evaluated
//! separately: the positive criteria are searched first, then each
//! excluded subtree is searched within those results and subtracted.

#![allow(clippy::missing_errors_doc)]

use chrono::{Days, NaiveDate, Utc};
use mailsync_imap::{Flag, SearchKey};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{Error, Operation, Result};
use crate::ids::{IdKind, IdSet};
use crate::session::{Session, timed};

/// A composable search predicate.
///
/// The default value matches every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Header field and a substring its value must contain.
    pub headers: Vec<(String, String)>,
    /// Internal date on or after.
    pub since: Option<NaiveDate>,
    /// Internal date before.
    pub before: Option<NaiveDate>,
    /// `Date:` header on or after.
    pub sent_since: Option<NaiveDate>,
    /// `Date:` header before.
    pub sent_before: Option<NaiveDate>,
    /// Substrings of the header or body.
    pub text: Vec<String>,
    /// Substrings of the body.
    pub body: Vec<String>,
    /// Flags that must be set.
    pub with_flags: Vec<Flag>,
    /// Flags that must not be set.
    pub without_flags: Vec<Flag>,
    /// Pairs of alternatives; each pair must have one side match.
    pub or: Vec<(SearchCriteria, SearchCriteria)>,
    /// Subtrees whose matches are removed from the result.
    pub not: Vec<SearchCriteria>,
}

impl SearchCriteria {
    /// Criteria matching every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent within the last `days` days.
    #[must_use]
    pub fn sent_within(days: u32) -> Self {
        let today = Utc::now().date_naive();
        let since = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self::new().sent_since(since)
    }

    /// The message with this `Message-ID`, angle brackets optional.
    #[must_use]
    pub fn message_id(id: &str) -> Self {
        let id = id.trim();
        let id = if id.starts_with('<') {
            id.to_string()
        } else {
            format!("<{id}>")
        };
        Self::new().header("Message-ID", id)
    }

    /// Matches if any of `alternatives` does.
    ///
    /// An empty list yields criteria matching every message.
    #[must_use]
    pub fn any_of(alternatives: impl IntoIterator<Item = Self>) -> Self {
        let mut alternatives: Vec<Self> = alternatives.into_iter().collect();
        let Some(mut nested) = alternatives.pop() else {
            return Self::new();
        };
        while let Some(left) = alternatives.pop() {
            nested = Self::new().or(left, nested);
        }
        nested
    }

    /// Requires a header field to contain `value`.
    #[must_use]
    pub fn header(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((field.into(), value.into()));
        self
    }

    /// Requires an internal date on or after `date`.
    #[must_use]
    pub const fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    /// Requires an internal date before `date`.
    #[must_use]
    pub const fn before(mut self, date: NaiveDate) -> Self {
        self.before = Some(date);
        self
    }

    /// Requires a sent date on or after `date`.
    #[must_use]
    pub const fn sent_since(mut self, date: NaiveDate) -> Self {
        self.sent_since = Some(date);
        self
    }

    /// Requires a sent date before `date`.
    #[must_use]
    pub const fn sent_before(mut self, date: NaiveDate) -> Self {
        self.sent_before = Some(date);
        self
    }

    /// Requires `text` somewhere in the header or body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text.push(text.into());
        self
    }

    /// Requires `text` in the body.
    #[must_use]
    pub fn body(mut self, text: impl Into<String>) -> Self {
        self.body.push(text.into());
        self
    }

    /// Requires a flag to be set.
    ///
    /// `\*` names a capability rather than a flag; searching for it fails
    /// with [`Error::InvalidArgument`].
    #[must_use]
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.with_flags.push(flag);
        self
    }

    /// Requires a flag to be unset.
    #[must_use]
    pub fn without_flag(mut self, flag: Flag) -> Self {
        self.without_flags.push(flag);
        self
    }

    /// Adds a pair of alternatives.
    #[must_use]
    pub fn or(mut self, left: Self, right: Self) -> Self {
        self.or.push((left, right));
        self
    }

    /// Excludes messages matching `excluded`.
    #[must_use]
    pub fn not(mut self, excluded: Self) -> Self {
        self.not.push(excluded);
        self
    }

    /// Returns true if these criteria match every message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The positive part: everything except the exclusions.
    pub fn positive_key(&self) -> Result<SearchKey> {
        self.conjuncts().map(conjunction)
    }

    /// The whole predicate as a single key, exclusions as `NOT`.
    ///
    /// Used for subtrees nested under OR or NOT, where no set difference
    /// can be taken.
    pub fn to_search_key(&self) -> Result<SearchKey> {
        let mut keys = self.conjuncts()?;
        for excluded in &self.not {
            keys.push(SearchKey::negate(excluded.to_search_key()?));
        }
        Ok(conjunction(keys))
    }

    fn conjuncts(&self) -> Result<Vec<SearchKey>> {
        let mut keys = Vec::new();
        for (field, value) in &self.headers {
            keys.push(header_key(field, value));
        }
        keys.extend(self.since.map(SearchKey::Since));
        keys.extend(self.before.map(SearchKey::Before));
        keys.extend(self.sent_since.map(SearchKey::SentSince));
        keys.extend(self.sent_before.map(SearchKey::SentBefore));
        keys.extend(self.text.iter().cloned().map(SearchKey::Text));
        keys.extend(self.body.iter().cloned().map(SearchKey::Body));
        for flag in &self.with_flags {
            keys.push(flag_key(flag, true)?);
        }
        for flag in &self.without_flags {
            keys.push(flag_key(flag, false)?);
        }
        for (left, right) in &self.or {
            keys.push(SearchKey::or(left.to_search_key()?, right.to_search_key()?));
        }
        Ok(keys)
    }
}

fn conjunction(mut keys: Vec<SearchKey>) -> SearchKey {
    match keys.len() {
        0 => SearchKey::All,
        1 => keys.remove(0),
        _ => SearchKey::And(keys),
    }
}

/// Uses the dedicated keys for the headers that have one.
fn header_key(field: &str, value: &str) -> SearchKey {
    let value = value.to_string();
    match field.to_ascii_lowercase().as_str() {
        "subject" => SearchKey::Subject(value),
        "from" => SearchKey::From(value),
        "to" => SearchKey::To(value),
        "cc" => SearchKey::Cc(value),
        _ => SearchKey::Header(field.to_string(), value),
    }
}

fn flag_key(flag: &Flag, set: bool) -> Result<SearchKey> {
    let key = match (flag, set) {
        (Flag::Seen, true) => SearchKey::Seen,
        (Flag::Seen, false) => SearchKey::Unseen,
        (Flag::Flagged, true) => SearchKey::Flagged,
        (Flag::Flagged, false) => SearchKey::Unflagged,
        (Flag::Deleted, true) => SearchKey::Deleted,
        (Flag::Deleted, false) => SearchKey::Undeleted,
        (Flag::Answered, true) => SearchKey::Answered,
        (Flag::Answered, false) => SearchKey::negate(SearchKey::Answered),
        (Flag::Draft, true) => SearchKey::Draft,
        (Flag::Draft, false) => SearchKey::negate(SearchKey::Draft),
        (Flag::Keyword(keyword), true) => SearchKey::Keyword(keyword.clone()),
        (Flag::Keyword(keyword), false) => SearchKey::Unkeyword(keyword.clone()),
        (Flag::Recent, true) => SearchKey::Recent,
        (Flag::Recent, false) => SearchKey::Old,
        (Flag::MayCreate, _) => {
            return Err(Error::InvalidArgument {
                op: Operation::Search,
                reason: format!("{} is not a searchable flag", flag.as_str()),
            });
        }
    };
    Ok(key)
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Finds the messages in the selected folder matching `criteria`.
    ///
    /// Returns UIDs or sequence numbers according to `kind`. The result is
    /// a set; server order carries no meaning.
    pub async fn search(&mut self, criteria: &SearchCriteria, kind: IdKind) -> Result<IdSet> {
        let uid = kind.is_uid();
        let limit = self.io_limit();

        let positive = criteria.positive_key()?;
        let client = self.selected_client(Operation::Search)?;
        let found = timed(limit, client.search(&positive, uid)).await;
        let mut matched = match found {
            Ok(numbers) => IdSet::from_numbers(kind, numbers),
            Err(error) => return Err(self.fail(Operation::Search, error)),
        };

        for excluded in &criteria.not {
            let Some(scope) = matched.as_sequence_set().cloned() else {
                break;
            };
            let scope = if uid {
                SearchKey::Uid(scope)
            } else {
                SearchKey::Sequence(scope)
            };
            let key = SearchKey::And(vec![scope, excluded.to_search_key()?]);

            let client = self.selected_client(Operation::Search)?;
            let found = match timed(limit, client.search(&key, uid)).await {
                Ok(numbers) => IdSet::from_numbers(kind, numbers),
                Err(error) => return Err(self.fail(Operation::Search, error)),
            };
            matched = matched.difference(&found)?;
        }

        debug!(
            folder = self.selected().map(|selected| selected.mailbox()),
            matched = ?matched.len(),
            "search finished"
        );
        Ok(matched)
    }

    /// Searches by UID.
    pub async fn search_uids(&mut self, criteria: &SearchCriteria) -> Result<IdSet> {
        self.search(criteria, IdKind::Uid).await
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
    use mailsync_imap::{Command, Tag};

    fn wire(key: SearchKey) -> String {
        let bytes = Command::Search { key, uid: true }.serialize(&Tag::new("A1")).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod key_tests {
        use super::*;

        #[test]
        fn test_empty_is_all() {
            let criteria = SearchCriteria::new();
            assert!(criteria.is_empty());
            assert_eq!(criteria.positive_key().unwrap(), SearchKey::All);
            assert_eq!(wire(criteria.to_search_key().unwrap()), "A1 UID SEARCH ALL\r\n");
        }

        #[test]
        fn test_conjunction() {
            let criteria = SearchCriteria::new()
                .sent_since(date(2024, 2, 1))
                .header("X-Mailer", "mutt")
                .without_flag(Flag::Seen);
            assert_eq!(
                wire(criteria.positive_key().unwrap()),
                "A1 UID SEARCH HEADER X-Mailer \"mutt\" SENTSINCE 1-Feb-2024 UNSEEN\r\n"
            );
        }

        #[test]
        fn test_known_headers_use_dedicated_keys() {
            let criteria = SearchCriteria::new().header("Subject", "invoice");
            assert_eq!(
                criteria.positive_key().unwrap(),
                SearchKey::Subject("invoice".to_string())
            );
        }

        #[test]
        fn test_message_id() {
            let a = SearchCriteria::message_id("abc@example.com");
            let b = SearchCriteria::message_id(" <abc@example.com> ");
            assert_eq!(a, b);
            assert_eq!(
                wire(a.positive_key().unwrap()),
                "A1 UID SEARCH HEADER Message-ID \"<abc@example.com>\"\r\n"
            );
        }

        #[test]
        fn test_any_of_nests_right() {
            let criteria = SearchCriteria::any_of([
                SearchCriteria::new().text("a"),
                SearchCriteria::new().text("b"),
                SearchCriteria::new().text("c"),
            ]);
            assert_eq!(
                wire(criteria.positive_key().unwrap()),
                "A1 UID SEARCH OR TEXT \"a\" OR TEXT \"b\" TEXT \"c\"\r\n"
            );
        }

        #[test]
        fn test_any_of_single_and_empty() {
            let single = SearchCriteria::any_of([SearchCriteria::new().text("x")]);
            assert_eq!(single, SearchCriteria::new().text("x"));
            assert!(SearchCriteria::any_of([]).is_empty());
        }

        #[test]
        fn test_not_is_excluded_from_positive_key() {
            let criteria = SearchCriteria::new()
                .text("report")
                .not(SearchCriteria::new().header("From", "noreply"));
            assert_eq!(criteria.positive_key().unwrap(), SearchKey::Text("report".to_string()));
            assert_eq!(
                wire(criteria.to_search_key().unwrap()),
                "A1 UID SEARCH TEXT \"report\" NOT FROM \"noreply\"\r\n"
            );
        }

        #[test]
        fn test_nested_not_inside_or() {
            let left = SearchCriteria::new()
                .with_flag(Flag::Flagged)
                .not(SearchCriteria::new().with_flag(Flag::Deleted));
            let criteria = SearchCriteria::new().or(left, SearchCriteria::new().text("urgent"));
            assert_eq!(
                wire(criteria.positive_key().unwrap()),
                "A1 UID SEARCH OR (FLAGGED NOT DELETED) TEXT \"urgent\"\r\n"
            );
        }

        #[test]
        fn test_recent_flag() {
            let recent = SearchCriteria::new().with_flag(Flag::Recent);
            assert_eq!(recent.positive_key().unwrap(), SearchKey::Recent);
            let old = SearchCriteria::new().without_flag(Flag::Recent);
            assert_eq!(wire(old.positive_key().unwrap()), "A1 UID SEARCH OLD\r\n");
            let answered = SearchCriteria::new().without_flag(Flag::Answered);
            assert_eq!(
                wire(answered.positive_key().unwrap()),
                "A1 UID SEARCH NOT ANSWERED\r\n"
            );
        }

        #[test]
        fn test_may_create_is_refused() {
            let criteria = SearchCriteria::new()
                .text("x")
                .or(SearchCriteria::new(), SearchCriteria::new().with_flag(Flag::MayCreate));
            let error = criteria.to_search_key().unwrap_err();
            assert!(matches!(
                error,
                Error::InvalidArgument {
                    op: Operation::Search,
                    ..
                }
            ));
            assert!(error.is_recoverable());
        }

        #[test]
        fn test_sent_within() {
            let criteria = SearchCriteria::sent_within(30);
            let expected = Utc::now().date_naive() - Days::new(30);
            assert_eq!(criteria.sent_since, Some(expected));
            assert!(SearchCriteria::sent_within(u32::MAX).sent_since.is_some());
        }
    }

    mod session_tests {
        use super::*;
        use crate::error::Error;
        use mailsync_auth::PlainCredential;
        use tokio_test::io::Builder;

        #[tokio::test]
        async fn test_not_is_a_set_difference() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
                .write(b"A0001 EXAMINE INBOX\r\n")
                .read(b"* 5 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n")
                .write(b"A0002 UID SEARCH TEXT \"report\"\r\n")
                .read(b"* SEARCH 4 1 2 3\r\nA0002 OK done\r\n")
                .write(b"A0003 UID SEARCH UID 1:4 FROM \"noreply\"\r\n")
                .read(b"* SEARCH 2\r\nA0003 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock).await.unwrap();
            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await
                .unwrap();
            session.select("INBOX", true).await.unwrap();

            let criteria = SearchCriteria::new()
                .text("report")
                .not(SearchCriteria::new().header("From", "noreply"));
            let found = session.search_uids(&criteria).await.unwrap();
            assert_eq!(found.kind(), IdKind::Uid);
            assert_eq!(
                found.numbers().into_iter().collect::<Vec<_>>(),
                vec![1, 3, 4]
            );
        }

        #[tokio::test]
        async fn test_empty_result_skips_exclusions() {
            // Sequence mode: no UID prefix.
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
                .write(b"A0001 SELECT INBOX\r\n")
                .read(b"* 0 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
                .write(b"A0002 SEARCH ALL\r\n")
                .read(b"* SEARCH\r\nA0002 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock).await.unwrap();
            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await
                .unwrap();
            session.select("INBOX", false).await.unwrap();

            let criteria = SearchCriteria::new().not(SearchCriteria::new().text("x"));
            let found = session.search(&criteria, IdKind::Sequence).await.unwrap();
            assert!(found.is_empty());
            assert_eq!(found.kind(), IdKind::Sequence);
        }

        async fn examined(mock: tokio_test::io::Mock) -> Session<tokio_test::io::Mock> {
            let mut session = Session::from_stream(mock).await.unwrap();
            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await
                .unwrap();
            session.select("INBOX", true).await.unwrap();
            session
        }

        fn login_and_examine() -> Builder {
            let mut builder = Builder::new();
            builder
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
                .write(b"A0001 EXAMINE INBOX\r\n")
                .read(b"* 5 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n");
            builder
        }

        #[tokio::test]
        async fn test_non_ascii_value_waits_for_continuation() {
            let mock = login_and_examine()
                .write(b"A0002 UID SEARCH CHARSET UTF-8 FROM {7}\r\n")
                .read(b"+ Ready\r\n")
                .write("Müller\r\n".as_bytes())
                .read(b"* SEARCH 2\r\nA0002 OK done\r\n")
                .build();
            let mut session = examined(mock).await;

            let criteria = SearchCriteria::new().header("From", "Müller");
            let found = session.search_uids(&criteria).await.unwrap();
            assert_eq!(found.numbers().into_iter().collect::<Vec<_>>(), vec![2]);
        }

        #[tokio::test]
        async fn test_refused_literal_is_rejection() {
            let mock = login_and_examine()
                .write(b"A0002 UID SEARCH CHARSET UTF-8 TEXT {5}\r\n")
                .read(b"A0002 NO charset not supported\r\n")
                .write(b"A0003 NOOP\r\n")
                .read(b"A0003 OK done\r\n")
                .build();
            let mut session = examined(mock).await;

            let error = session
                .search_uids(&SearchCriteria::new().text("café"))
                .await
                .unwrap_err();
            assert!(matches!(error, Error::Rejected { .. }));
            assert!(!session.is_closed());
            session.poll().await.unwrap();
        }

        #[tokio::test]
        async fn test_recent_flag_search() {
            let mock = login_and_examine()
                .write(b"A0002 UID SEARCH RECENT UNSEEN\r\n")
                .read(b"* SEARCH 5\r\nA0002 OK done\r\n")
                .build();
            let mut session = examined(mock).await;

            let criteria = SearchCriteria::new()
                .with_flag(Flag::Recent)
                .without_flag(Flag::Seen);
            let found = session.search_uids(&criteria).await.unwrap();
            assert_eq!(found.numbers().into_iter().collect::<Vec<_>>(), vec![5]);
        }

        #[tokio::test]
        async fn test_line_break_sends_nothing() {
            let mut session = examined(login_and_examine().build()).await;
            let error = session
                .search_uids(&SearchCriteria::new().text("a\r\nA9 LOGOUT"))
                .await
                .unwrap_err();
            assert!(matches!(error, Error::InvalidArgument { .. }));
            assert!(!session.is_closed());
        }

        #[tokio::test]
        async fn test_search_requires_selection() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
                .build();
            let mut session = Session::from_stream(mock).await.unwrap();
            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await
                .unwrap();
            let error = session
                .search_uids(&SearchCriteria::new())
                .await
                .unwrap_err();
            assert!(matches!(
                error,
                Error::InvalidState {
                    op: Operation::Search,
                    ..
                }
            ));
        }
    }
}
