//! Type-state markers for the client.
//!
//! `NotAuthenticated` and `Authenticated` are plain markers. `Selected`
//! carries what the server reported when the mailbox was opened.

use std::sync::Arc;

use crate::types::{MailboxStatus, UidValidity};

/// Marker for the not-authenticated state.
///
/// Only capability negotiation, STARTTLS and authentication are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Marker for the authenticated state.
///
/// Mailbox operations (LIST, STATUS, SELECT, EXAMINE) are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// State of a selected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub(crate) mailbox: Arc<str>,
    pub(crate) status: MailboxStatus,
}

impl Selected {
    /// Creates a new selected state.
    #[must_use]
    pub fn new(mailbox: impl Into<Arc<str>>, status: MailboxStatus) -> Self {
        Self {
            mailbox: mailbox.into(),
            status,
        }
    }

    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Returns true if the mailbox was opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.status.read_only
    }

    /// Returns the status snapshot from SELECT/EXAMINE, with later
    /// EXISTS and RECENT updates applied.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.status
    }

    /// Returns the UID validity of the selection.
    #[must_use]
    pub const fn uid_validity(&self) -> Option<UidValidity> {
        self.status.uid_validity
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Authenticated {}
    impl Sealed for super::Selected {}
}

/// States in which the user is logged in.
///
/// LIST, STATUS, SELECT and EXAMINE are available in all of them.
pub trait LoggedIn: sealed::Sealed {}

impl LoggedIn for Authenticated {}
impl LoggedIn for Selected {}
