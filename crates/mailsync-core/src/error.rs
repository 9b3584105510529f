//! Error types for the engine.
//!
//! Every failure names the [`Operation`] it interrupted. Errors raised by
//! the IMAP client are sorted into the engine's categories by
//! [`Error::from_imap`]: transport loss, credential rejection, a refused
//! command, or a response the client could not make sense of.

use std::fmt;

use thiserror::Error;

use crate::fetch::ItemKind;
use crate::ids::{IdKind, MessageId};
use crate::session::SessionState;

/// A named engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opening the transport and reading the greeting.
    Connect,
    /// LOGIN or AUTHENTICATE.
    Authenticate,
    /// Folder enumeration.
    List,
    /// STATUS on a folder.
    Status,
    /// SELECT or EXAMINE.
    Select,
    /// SEARCH.
    Search,
    /// FETCH.
    Fetch,
    /// STORE.
    Store,
    /// IDLE or NOOP polling.
    Idle,
    /// LOGOUT.
    Logout,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Authenticate => "authenticate",
            Self::List => "list",
            Self::Status => "status",
            Self::Select => "select",
            Self::Search => "search",
            Self::Fetch => "fetch",
            Self::Store => "store",
            Self::Idle => "idle",
            Self::Logout => "logout",
        })
    }
}

/// Why a folder could not be selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectFailure {
    /// The server knows no folder by that name.
    NotFound,
    /// The folder exists but carries `\Noselect`.
    NotSelectable,
    /// The session has not authenticated, or is already closed.
    NotAuthenticated,
    /// The server refused for another reason.
    Rejected(String),
}

impl fmt::Display for SelectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no such folder"),
            Self::NotSelectable => f.write_str("folder is not selectable"),
            Self::NotAuthenticated => f.write_str("session is not authenticated"),
            Self::Rejected(text) => write!(f, "server refused: {text}"),
        }
    }
}

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport failed or the server closed the connection.
    #[error("{op} failed: connection error: {source}")]
    Connection {
        /// Operation that was running.
        op: Operation,
        /// Underlying client error.
        #[source]
        source: mailsync_imap::Error,
    },

    /// The server rejected the credentials. The session is gone.
    #[error("authentication failed: {0}")]
    Auth(#[source] mailsync_imap::Error),

    /// The server sent something the client could not interpret.
    ///
    /// The session is closed afterwards; its state is no longer known.
    #[error("{op} failed: protocol error: {source}")]
    Protocol {
        /// Operation that was running.
        op: Operation,
        /// Underlying client error.
        #[source]
        source: mailsync_imap::Error,
    },

    /// A folder could not be selected.
    #[error("cannot select {folder}: {reason}")]
    Select {
        /// Requested folder name.
        folder: String,
        /// What went wrong.
        reason: SelectFailure,
    },

    /// A requested item did not come back for one message.
    #[error("{id}: {item} missing from FETCH response")]
    FetchItemMissing {
        /// The affected message.
        id: MessageId,
        /// The absent item.
        item: ItemKind,
    },

    /// A message body could not be decoded.
    #[error("MIME error: {0}")]
    Parse(#[from] mailsync_mime::Error),

    /// The transport under an IDLE watch failed.
    #[error("IDLE transport failed: {0}")]
    IdleTransport(#[source] mailsync_imap::Error),

    /// The server answered NO or BAD. The session remains usable.
    #[error("{op} rejected by server: {text}")]
    Rejected {
        /// Operation that was refused.
        op: Operation,
        /// Server explanation.
        text: String,
    },

    /// The operation is not valid in the session's current state.
    #[error("{op} is not valid in the {state} state")]
    InvalidState {
        /// Operation that was attempted.
        op: Operation,
        /// State the session was in.
        state: SessionState,
    },

    /// A flag change was attempted on a folder opened read-only.
    #[error("{folder} is open read-only")]
    ReadOnly {
        /// Name of the selected folder.
        folder: String,
    },

    /// Sequence numbers and UIDs were combined in one set.
    #[error("cannot combine {found} identifiers with a {expected} set")]
    IdKindMismatch {
        /// Kind of the receiving set.
        expected: IdKind,
        /// Kind that was offered.
        found: IdKind,
    },

    /// A request cannot be expressed in IMAP. Nothing was sent.
    #[error("{op}: {reason}")]
    InvalidArgument {
        /// Operation that was attempted.
        op: Operation,
        /// What cannot be expressed.
        reason: String,
    },

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Classifies an IMAP client error raised during `op`.
    pub(crate) fn from_imap(op: Operation, error: mailsync_imap::Error) -> Self {
        use mailsync_imap::Error as Imap;

        match error {
            Imap::No { text, .. } | Imap::Bad(text) => Self::Rejected { op, text },
            Imap::InvalidArgument(reason) => Self::InvalidArgument { op, reason },
            error @ (Imap::Auth(_) | Imap::Credential(_)) => Self::Auth(error),
            error if error.is_fatal() && op == Operation::Idle => Self::IdleTransport(error),
            error @ (Imap::Io(_)
            | Imap::Tls(_)
            | Imap::InvalidDnsName(_)
            | Imap::Bye(_)
            | Imap::Closed
            | Imap::Timeout(_)) => Self::Connection { op, source: error },
            error => Self::Protocol { op, source: error },
        }
    }

    /// Returns the operation that failed, when one is recorded.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::Connection { op, .. }
            | Self::Protocol { op, .. }
            | Self::Rejected { op, .. }
            | Self::InvalidState { op, .. }
            | Self::InvalidArgument { op, .. } => Some(*op),
            Self::Auth(_) => Some(Operation::Authenticate),
            Self::Select { .. } => Some(Operation::Select),
            Self::FetchItemMissing { .. } => Some(Operation::Fetch),
            Self::IdleTransport(_) => Some(Operation::Idle),
            Self::ReadOnly { .. } => Some(Operation::Store),
            Self::Parse(_) | Self::IdKindMismatch { .. } | Self::Task(_) => None,
        }
    }

    /// Returns true if the caller can skip the affected item and go on
    /// with the same session.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::FetchItemMissing { .. }
            | Self::Select { .. }
            | Self::Rejected { .. }
            | Self::InvalidState { .. }
            | Self::InvalidArgument { .. }
            | Self::ReadOnly { .. }
            | Self::IdKindMismatch { .. } => true,
            Self::Parse(error) => error.is_recoverable(),
            _ => false,
        }
    }

    /// Returns true if the session that raised this error is closed.
    #[must_use]
    pub const fn is_session_lost(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Auth(_)
                | Self::Protocol { .. }
                | Self::IdleTransport(_)
                | Self::Task(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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

    mod classification_tests {
        use super::*;
        use mailsync_imap::ResponseCode;
        use std::time::Duration;

        #[test]
        fn test_no_is_rejection() {
            let error = Error::from_imap(
                Operation::Search,
                mailsync_imap::Error::No {
                    code: None,
                    text: "bad charset".to_string(),
                },
            );
            assert!(matches!(
                &error,
                Error::Rejected { op: Operation::Search, text } if text == "bad charset"
            ));
            assert!(error.is_recoverable());
            assert!(!error.is_session_lost());
        }

        #[test]
        fn test_nonexistent_code_is_still_rejection() {
            let error = Error::from_imap(
                Operation::Status,
                mailsync_imap::Error::No {
                    code: Some(ResponseCode::NonExistent),
                    text: "gone".to_string(),
                },
            );
            assert_eq!(error.operation(), Some(Operation::Status));
        }

        #[test]
        fn test_transport_loss() {
            let error = Error::from_imap(Operation::Fetch, mailsync_imap::Error::Closed);
            assert!(matches!(error, Error::Connection { op: Operation::Fetch, .. }));
            assert!(error.is_session_lost());
            assert!(!error.is_recoverable());
        }

        #[test]
        fn test_transport_loss_during_idle() {
            let error = Error::from_imap(
                Operation::Idle,
                mailsync_imap::Error::Timeout(Duration::from_secs(1)),
            );
            assert!(matches!(error, Error::IdleTransport(_)));
            assert_eq!(error.operation(), Some(Operation::Idle));
        }

        #[test]
        fn test_auth() {
            let error = Error::from_imap(
                Operation::Authenticate,
                mailsync_imap::Error::Auth("invalid credentials".to_string()),
            );
            assert!(matches!(error, Error::Auth(_)));
            assert!(error.is_session_lost());
        }

        #[test]
        fn test_protocol() {
            let error = Error::from_imap(
                Operation::List,
                mailsync_imap::Error::Protocol("missing tagged response".to_string()),
            );
            assert!(matches!(error, Error::Protocol { op: Operation::List, .. }));
            assert!(error.to_string().starts_with("list failed: protocol error"));
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_select_failure_message() {
            let error = Error::Select {
                folder: "Archive".to_string(),
                reason: SelectFailure::NotSelectable,
            };
            assert_eq!(
                error.to_string(),
                "cannot select Archive: folder is not selectable"
            );
        }

        #[test]
        fn test_invalid_state_message() {
            let error = Error::InvalidState {
                op: Operation::Fetch,
                state: SessionState::Authenticated,
            };
            assert_eq!(
                error.to_string(),
                "fetch is not valid in the authenticated state"
            );
        }

        #[test]
        fn test_parse_tier_decides_recoverability() {
            let charset = Error::Parse(mailsync_mime::Error::UnknownCharset("x-foo".to_string()));
            assert!(charset.is_recoverable());
            let empty = Error::Parse(mailsync_mime::Error::Empty);
            assert!(!empty.is_recoverable());
            assert_eq!(empty.operation(), None);
        }
    }
}
