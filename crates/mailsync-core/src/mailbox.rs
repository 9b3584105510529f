//! Folder enumeration and selection.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use mailsync_imap::{
    Client, Flags, ListEntry, LoggedIn, MailboxAttribute, ResponseCode, SelectResult, Selected,
    SeqNum, StatusData, StatusItem, Tag, Uid, UidValidity, UntaggedResponse,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::error::{Error, Operation, Result, SelectFailure};
use crate::session::{Connection, Session, timed};

/// A folder as reported by LIST.
///
/// A snapshot: UID validity may change between sessions, so folders are
/// not meant to be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Full hierarchical name.
    pub name: String,
    /// Hierarchy separator; `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Attributes in server order.
    pub attributes: Vec<MailboxAttribute>,
    /// Filled in by [`Session::list_with_status`].
    pub uid_validity: Option<UidValidity>,
}

impl From<ListEntry> for Folder {
    fn from(entry: ListEntry) -> Self {
        Self {
            name: entry.name,
            delimiter: entry.delimiter,
            attributes: entry.attributes,
            uid_validity: None,
        }
    }
}

impl Folder {
    /// Returns false for `\Noselect` and `\NonExistent` folders.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| matches!(a, MailboxAttribute::NoSelect | MailboxAttribute::NonExistent))
    }

    /// Returns true if the server reported child folders.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.attributes.contains(&MailboxAttribute::HasChildren)
    }

    /// Last component of the name.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        self.delimiter
            .and_then(|delimiter| self.name.rsplit_once(delimiter))
            .map_or(self.name.as_str(), |(_, leaf)| leaf)
    }

    /// Name of the parent folder, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.delimiter
            .and_then(|delimiter| self.name.rsplit_once(delimiter))
            .map(|(parent, _)| parent)
    }

    /// Role of the folder: special-use attributes first, then the name.
    #[must_use]
    pub fn role(&self) -> FolderRole {
        self.attributes
            .iter()
            .find_map(FolderRole::from_attribute)
            .unwrap_or_else(|| FolderRole::from_name(&self.name))
    }
}

/// What a folder is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FolderRole {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Drafts,
    /// Trash folder.
    Trash,
    /// Spam/junk folder.
    Junk,
    /// Archive folder.
    Archive,
    /// Virtual folder of every message.
    All,
    /// Virtual folder of flagged messages.
    Flagged,
    /// Regular folder.
    Regular,
}

impl FolderRole {
    /// Maps a RFC 6154 special-use attribute.
    #[must_use]
    pub const fn from_attribute(attribute: &MailboxAttribute) -> Option<Self> {
        match attribute {
            MailboxAttribute::Sent => Some(Self::Sent),
            MailboxAttribute::Drafts => Some(Self::Drafts),
            MailboxAttribute::Trash => Some(Self::Trash),
            MailboxAttribute::Junk => Some(Self::Junk),
            MailboxAttribute::Archive => Some(Self::Archive),
            MailboxAttribute::All => Some(Self::All),
            MailboxAttribute::Flagged => Some(Self::Flagged),
            _ => None,
        }
    }

    /// Guesses the role from a folder name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            Self::Inbox
        } else if lower.contains("sent") {
            Self::Sent
        } else if lower.contains("draft") {
            Self::Drafts
        } else if lower.contains("trash") || lower.contains("deleted") {
            Self::Trash
        } else if lower.contains("spam") || lower.contains("junk") {
            Self::Junk
        } else if lower.contains("archive") {
            Self::Archive
        } else {
            Self::Regular
        }
    }
}

/// State of a folder right after SELECT or EXAMINE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderStatus {
    /// Folder name.
    pub name: String,
    /// Number of messages.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// First unseen message.
    pub unseen: Option<SeqNum>,
    /// Predicted next UID.
    pub uid_next: Option<Uid>,
    /// UID validity of the selection.
    pub uid_validity: Option<UidValidity>,
    /// Flags defined in the folder.
    pub flags: Flags,
    /// Flags that can be changed permanently.
    pub permanent_flags: Flags,
    /// True for EXAMINE or a server-imposed read-only selection.
    pub read_only: bool,
}

impl From<&Selected> for FolderStatus {
    fn from(selected: &Selected) -> Self {
        let status = selected.status();
        Self {
            name: selected.mailbox().to_string(),
            exists: status.exists,
            recent: status.recent,
            unseen: status.unseen,
            uid_next: status.uid_next,
            uid_validity: status.uid_validity,
            flags: status.flags.clone(),
            permanent_flags: status.permanent_flags.clone(),
            read_only: status.read_only,
        }
    }
}

/// LIST results, read off the wire one folder at a time.
///
/// Single pass: once exhausted, list again for a fresh view. Dropping the
/// list early is fine; the remaining responses are drained before the
/// session's next command.
pub struct FolderList<'a, S> {
    session: &'a mut Session<S>,
    /// Tag of the LIST command; cleared once it completed.
    tag: Option<Tag>,
}

impl<S> std::fmt::Debug for FolderList<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderList")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl<S> FolderList<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the next folder, or `None` once LIST completed.
    ///
    /// A transport failure closes the session.
    pub async fn next(&mut self) -> Result<Option<Folder>> {
        while let Some(tag) = &self.tag {
            let limit = self.session.io_limit();
            let response = match &mut self.session.conn {
                Connection::Authenticated(client) => {
                    let mut stream = client.resume(tag.clone());
                    timed(limit, stream.next()).await
                }
                Connection::Selected(client) => {
                    let mut stream = client.resume(tag.clone());
                    timed(limit, stream.next()).await
                }
                other => {
                    return Err(Error::InvalidState {
                        op: Operation::List,
                        state: other.state(),
                    });
                }
            };
            match response {
                Ok(Some(UntaggedResponse::List(entry))) => return Ok(Some(entry.into())),
                Ok(Some(other)) => debug!(?other, "unilateral data during LIST"),
                Ok(None) => self.tag = None,
                Err(error @ mailsync_imap::Error::Parse { .. }) => {
                    debug!(%error, "skipping unparseable LIST response");
                }
                Err(error) => {
                    self.tag = None;
                    return Err(self.session.fail(Operation::List, error));
                }
            }
        }
        Ok(None)
    }

    /// Reads the remaining folders.
    pub async fn collect(mut self) -> Result<Vec<Folder>> {
        let mut folders = Vec::new();
        while let Some(folder) = self.next().await? {
            folders.push(folder);
        }
        Ok(folders)
    }
}

const STATUS_ITEMS: [StatusItem; 5] = [
    StatusItem::Messages,
    StatusItem::Recent,
    StatusItem::UidNext,
    StatusItem::UidValidity,
    StatusItem::Unseen,
];

/// SELECT or EXAMINE, bounded by the session's command deadline.
async fn open<S, State>(
    client: Client<S, State>,
    name: &str,
    read_only: bool,
    limit: Option<Duration>,
) -> std::result::Result<SelectResult<S>, mailsync_imap::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
    State: LoggedIn,
{
    let future = async move {
        if read_only {
            client.examine(name).await
        } else {
            client.select(name).await
        }
    };
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| mailsync_imap::Error::Timeout(limit)),
        None => Ok(future.await),
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Lists folders matching `pattern` under `reference`.
    ///
    /// `*` matches across hierarchy levels, `%` within one.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<FolderList<'_, S>> {
        let limit = self.io_limit();
        let sent = match &mut self.conn {
            Connection::Authenticated(client) => timed(limit, client.list(reference, pattern))
                .await
                .map(|stream| stream.tag().clone()),
            Connection::Selected(client) => timed(limit, client.list(reference, pattern))
                .await
                .map(|stream| stream.tag().clone()),
            other => {
                return Err(Error::InvalidState {
                    op: Operation::List,
                    state: other.state(),
                });
            }
        };
        match sent {
            Ok(tag) => Ok(FolderList {
                session: self,
                tag: Some(tag),
            }),
            Err(error) => Err(self.fail(Operation::List, error)),
        }
    }

    /// Selects `name`, read-only with EXAMINE when `read_only` is set.
    ///
    /// A previously selected folder is closed implicitly. If the new
    /// selection fails the session is left authenticated with no folder
    /// selected.
    pub async fn select(&mut self, name: &str, read_only: bool) -> Result<FolderStatus> {
        let limit = self.io_limit();
        let opened = match std::mem::replace(&mut self.conn, Connection::Closed) {
            Connection::Authenticated(client) => open(client, name, read_only, limit).await,
            Connection::Selected(client) => open(client, name, read_only, limit).await,
            other => {
                self.conn = other;
                return Err(Error::Select {
                    folder: name.to_string(),
                    reason: SelectFailure::NotAuthenticated,
                });
            }
        };

        match opened {
            Ok(Ok(client)) => {
                let status = FolderStatus::from(client.state());
                info!(
                    folder = name,
                    exists = status.exists,
                    uid_validity = ?status.uid_validity,
                    read_only = status.read_only,
                    "folder selected"
                );
                self.conn = Connection::Selected(client);
                Ok(status)
            }
            Ok(Err((error, client))) => {
                self.conn = Connection::Authenticated(client);
                if error.is_rejection() {
                    let reason = self.select_failure(name, error).await;
                    debug!(folder = name, %reason, "select refused");
                    Err(Error::Select {
                        folder: name.to_string(),
                        reason,
                    })
                } else {
                    Err(self.fail(Operation::Select, error))
                }
            }
            Err(error) => Err(self.fail(Operation::Select, error)),
        }
    }

    /// Works out why the server refused to select `name`.
    async fn select_failure(&mut self, name: &str, error: mailsync_imap::Error) -> SelectFailure {
        let text = match error {
            mailsync_imap::Error::No {
                code: Some(ResponseCode::NonExistent),
                ..
            } => return SelectFailure::NotFound,
            mailsync_imap::Error::No { text, .. } | mailsync_imap::Error::Bad(text) => text,
            other => other.to_string(),
        };

        let limit = self.io_limit();
        let Connection::Authenticated(client) = &mut self.conn else {
            return SelectFailure::Rejected(text);
        };
        match timed(limit, client.list_all("", name)).await {
            Ok(entries) => match entries.iter().find(|entry| entry.name == name) {
                None => SelectFailure::NotFound,
                Some(entry) if !entry.is_selectable() => SelectFailure::NotSelectable,
                Some(_) => SelectFailure::Rejected(text),
            },
            Err(error) => {
                debug!(folder = name, %error, "LIST lookup after failed select");
                SelectFailure::Rejected(text)
            }
        }
    }

    /// Closes the selected folder, returning to the authenticated state.
    ///
    /// CLOSE expunges `\Deleted` messages of a read-write selection.
    pub async fn close(&mut self) -> Result<()> {
        let limit = self.io_limit();
        let client = match std::mem::replace(&mut self.conn, Connection::Closed) {
            Connection::Selected(client) => client,
            other => {
                let state = other.state();
                self.conn = other;
                return Err(Error::InvalidState {
                    op: Operation::Select,
                    state,
                });
            }
        };
        // CLOSE consumes the client; it is gone if the command fails.
        match timed(limit, client.close()).await {
            Ok(client) => {
                self.conn = Connection::Authenticated(client);
                Ok(())
            }
            Err(error) => Err(Error::from_imap(Operation::Select, error)),
        }
    }

    /// Queries message counts and UID validity without selecting.
    pub async fn status(&mut self, name: &str) -> Result<StatusData> {
        let limit = self.io_limit();
        let result = match &mut self.conn {
            Connection::Authenticated(client) => {
                timed(limit, client.status(name, &STATUS_ITEMS)).await
            }
            Connection::Selected(client) => timed(limit, client.status(name, &STATUS_ITEMS)).await,
            other => {
                return Err(Error::InvalidState {
                    op: Operation::Status,
                    state: other.state(),
                });
            }
        };
        result.map_err(|error| self.fail(Operation::Status, error))
    }

    /// Lists folders and fills in each selectable folder's UID validity.
    ///
    /// A folder whose STATUS is refused keeps `uid_validity` empty.
    pub async fn list_with_status(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<Folder>> {
        let mut folders = self.list(reference, pattern).await?.collect().await?;
        for folder in folders.iter_mut().filter(|folder| folder.is_selectable()) {
            match self.status(&folder.name).await {
                Ok(status) => folder.uid_validity = status.uid_validity,
                Err(error) if error.is_recoverable() => {
                    debug!(folder = %folder.name, %error, "STATUS refused");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(folders)
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
    use crate::session::SessionState;
    use mailsync_auth::PlainCredential;
    use tokio_test::io::{Builder, Mock};

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n";

    async fn logged_in(mock: Mock) -> Session<Mock> {
        let mut session = Session::from_stream(mock).await.unwrap();
        session
            .authenticate(&PlainCredential::new("ann", "secret"))
            .await
            .unwrap();
        session
    }

    fn login(builder: &mut Builder) -> &mut Builder {
        builder
            .read(GREETING)
            .write(b"A0000 LOGIN ann secret\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] ok\r\n")
    }

    mod folder_tests {
        use super::*;

        fn folder(name: &str, attributes: Vec<MailboxAttribute>) -> Folder {
            Folder {
                name: name.to_string(),
                delimiter: Some('/'),
                attributes,
                uid_validity: None,
            }
        }

        #[test]
        fn test_names() {
            let f = folder("Work/Projects/2024", vec![]);
            assert_eq!(f.leaf_name(), "2024");
            assert_eq!(f.parent(), Some("Work/Projects"));
            let top = folder("INBOX", vec![]);
            assert_eq!(top.leaf_name(), "INBOX");
            assert_eq!(top.parent(), None);
        }

        #[test]
        fn test_selectable() {
            assert!(folder("INBOX", vec![MailboxAttribute::HasNoChildren]).is_selectable());
            let parent = folder(
                "Archive",
                vec![MailboxAttribute::NoSelect, MailboxAttribute::HasChildren],
            );
            assert!(!parent.is_selectable());
            assert!(parent.has_children());
        }

        #[test]
        fn test_role_prefers_special_use() {
            assert_eq!(folder("INBOX", vec![]).role(), FolderRole::Inbox);
            assert_eq!(folder("Gesendet", vec![MailboxAttribute::Sent]).role(), FolderRole::Sent);
            assert_eq!(folder("Sent Items", vec![]).role(), FolderRole::Sent);
            assert_eq!(
                folder("[Gmail]/All Mail", vec![MailboxAttribute::All]).role(),
                FolderRole::All
            );
            assert_eq!(folder("Receipts", vec![]).role(), FolderRole::Regular);
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn test_list_is_lazy() {
            let mock = login(&mut Builder::new())
                .write(b"A0001 LIST \"\" \"*\"\r\n")
                .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
                .read(b"* LIST (\\Noselect \\HasChildren) \"/\" Archive\r\n")
                .read(b"* LIST (\\HasNoChildren) \"/\" Archive/2024\r\nA0001 OK done\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let mut list = session.list("", "*").await.unwrap();
            let first = list.next().await.unwrap().unwrap();
            assert_eq!(first.name, "INBOX");
            let rest = list.collect().await.unwrap();
            assert_eq!(rest.len(), 2);
            assert!(!rest[0].is_selectable());
            assert_eq!(rest[1].parent(), Some("Archive"));
        }

        #[tokio::test]
        async fn test_list_dropped_mid_way_closes_session() {
            let mock = login(&mut Builder::new())
                .write(b"A0001 LIST \"\" \"*\"\r\n")
                .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
                .read(b"* BYE going away\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let mut list = session.list("", "*").await.unwrap();
            assert_eq!(list.next().await.unwrap().unwrap().name, "INBOX");
            let error = list.next().await.unwrap_err();
            assert!(error.is_session_lost());
            assert!(list.next().await.unwrap().is_none());
            assert!(session.is_closed());
            assert_eq!(session.state(), SessionState::Logout);
        }

        #[tokio::test]
        async fn test_list_resumes_after_dropped_list() {
            let mock = login(&mut Builder::new())
                .write(b"A0001 LIST \"\" \"*\"\r\n")
                .read(b"* LIST () \"/\" INBOX\r\n* LIST () \"/\" Sent\r\nA0001 OK done\r\n")
                .write(b"A0002 LIST \"\" \"%\"\r\n")
                .read(b"* LIST () \"/\" INBOX\r\nA0002 OK done\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let mut list = session.list("", "*").await.unwrap();
            assert!(list.next().await.unwrap().is_some());
            drop(list);
            let folders = session.list("", "%").await.unwrap().collect().await.unwrap();
            assert_eq!(folders.len(), 1);
        }

        #[tokio::test]
        async fn test_list_before_login_is_invalid() {
            let mock = Builder::new().read(GREETING).build();
            let mut session = Session::from_stream(mock).await.unwrap();
            let error = session.list("", "*").await.unwrap_err();
            assert!(matches!(
                error,
                Error::InvalidState {
                    op: Operation::List,
                    state: SessionState::NotAuthenticated
                }
            ));
        }

        #[tokio::test]
        async fn test_select_before_login() {
            let mock = Builder::new().read(GREETING).build();
            let mut session = Session::from_stream(mock).await.unwrap();
            let error = session.select("INBOX", true).await.unwrap_err();
            assert!(matches!(
                error,
                Error::Select {
                    reason: SelectFailure::NotAuthenticated,
                    ..
                }
            ));
            assert_eq!(session.state(), SessionState::NotAuthenticated);
        }

        #[tokio::test]
        async fn test_examine_then_reselect() {
            let examine = b"* 3 EXISTS\r\n* 0 RECENT\r\n* FLAGS (\\Seen \\Flagged)\r\n\
                * OK [UIDVALIDITY 1] ok\r\n* OK [UIDNEXT 4] ok\r\n";
            let mock = login(&mut Builder::new())
                .write(b"A0001 EXAMINE INBOX\r\n")
                .read(examine)
                .read(b"A0001 OK [READ-ONLY] done\r\n")
                .write(b"A0002 EXAMINE INBOX\r\n")
                .read(examine)
                .read(b"A0002 OK [READ-ONLY] done\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let first = session.select("INBOX", true).await.unwrap();
            assert_eq!(first.exists, 3);
            assert!(first.read_only);
            assert_eq!(first.uid_validity.map(UidValidity::get), Some(1));
            assert_eq!(session.state(), SessionState::Selected);

            let second = session.select("INBOX", true).await.unwrap();
            assert_eq!(first, second);
        }

        #[tokio::test]
        async fn test_select_missing_folder() {
            let mock = login(&mut Builder::new())
                .write(b"A0001 SELECT Nope\r\n")
                .read(b"A0001 NO [NONEXISTENT] unknown mailbox\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let error = session.select("Nope", false).await.unwrap_err();
            assert!(matches!(
                error,
                Error::Select {
                    reason: SelectFailure::NotFound,
                    ..
                }
            ));
            assert_eq!(session.state(), SessionState::Authenticated);
        }

        #[tokio::test]
        async fn test_select_noselect_folder_is_classified() {
            let mock = login(&mut Builder::new())
                .write(b"A0001 SELECT Archive\r\n")
                .read(b"A0001 NO cannot select\r\n")
                .write(b"A0002 LIST \"\" \"Archive\"\r\n")
                .read(b"* LIST (\\Noselect) \"/\" Archive\r\nA0002 OK done\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let error = session.select("Archive", false).await.unwrap_err();
            assert!(matches!(
                error,
                Error::Select {
                    reason: SelectFailure::NotSelectable,
                    ..
                }
            ));
            assert!(error.is_recoverable());
        }

        #[tokio::test]
        async fn test_status_and_list_with_status() {
            let mock = login(&mut Builder::new())
                .write(b"A0001 LIST \"\" \"*\"\r\n")
                .read(b"* LIST () \"/\" INBOX\r\n* LIST (\\Noselect) \"/\" Old\r\nA0001 OK done\r\n")
                .write(b"A0002 STATUS INBOX (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)\r\n")
                .read(b"* STATUS INBOX (MESSAGES 3 RECENT 0 UIDNEXT 4 UIDVALIDITY 7 UNSEEN 1)\r\nA0002 OK done\r\n")
                .build();
            let mut session = logged_in(mock).await;

            let folders = session.list_with_status("", "*").await.unwrap();
            assert_eq!(folders[0].uid_validity.map(UidValidity::get), Some(7));
            assert_eq!(folders[1].uid_validity, None);
        }
    }
}
