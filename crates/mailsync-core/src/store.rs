//! Flag changes on messages in the selected folder.

#![allow(clippy::missing_errors_doc)]

use mailsync_imap::{Flag, Flags, SeqNum, StoreMode};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{Error, Operation, Result};
use crate::ids::IdSet;
use crate::session::{Session, timed};

/// How the given flags combine with the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlagOperation {
    /// Set the flags, keeping the others.
    Add,
    /// Clear the flags, keeping the others.
    Remove,
    /// Make the flags exactly these.
    Replace,
}

impl From<FlagOperation> for StoreMode {
    fn from(op: FlagOperation) -> Self {
        match op {
            FlagOperation::Add => Self::Add,
            FlagOperation::Remove => Self::Remove,
            FlagOperation::Replace => Self::Replace,
        }
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Changes flags on `ids`.
    ///
    /// Returns the flags the server reported afterwards, keyed by sequence
    /// number. With `silent` set the server reports nothing. A folder
    /// opened read-only is refused without contacting the server.
    pub async fn store(
        &mut self,
        ids: &IdSet,
        op: FlagOperation,
        flags: &[Flag],
        silent: bool,
    ) -> Result<Vec<(SeqNum, Flags)>> {
        let limit = self.io_limit();
        let client = self.selected_client(Operation::Store)?;
        if client.state().is_read_only() {
            return Err(Error::ReadOnly {
                folder: client.mailbox().to_string(),
            });
        }
        let Some(set) = ids.as_sequence_set() else {
            return Ok(Vec::new());
        };

        let stored = client.store(set, op.into(), flags, silent, ids.kind().is_uid());
        match timed(limit, stored).await {
            Ok(updated) => {
                debug!(%ids, ?op, updated = updated.len(), "flags stored");
                Ok(updated)
            }
            Err(error) => Err(self.fail(Operation::Store, error)),
        }
    }

    /// Sets `\Flagged`.
    pub async fn star(&mut self, ids: &IdSet) -> Result<()> {
        self.store(ids, FlagOperation::Add, &[Flag::Flagged], true)
            .await
            .map(|_| ())
    }

    /// Clears `\Flagged`.
    pub async fn unstar(&mut self, ids: &IdSet) -> Result<()> {
        self.store(ids, FlagOperation::Remove, &[Flag::Flagged], true)
            .await
            .map(|_| ())
    }

    /// Sets `\Seen`.
    pub async fn mark_seen(&mut self, ids: &IdSet) -> Result<()> {
        self.store(ids, FlagOperation::Add, &[Flag::Seen], true)
            .await
            .map(|_| ())
    }

    /// Clears `\Seen`.
    pub async fn mark_unseen(&mut self, ids: &IdSet) -> Result<()> {
        self.store(ids, FlagOperation::Remove, &[Flag::Seen], true)
            .await
            .map(|_| ())
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

    async fn selected(mock: Mock, read_only: bool) -> Session<Mock> {
        let mut session = Session::from_stream(mock).await.unwrap();
        session
            .authenticate(&PlainCredential::new("ann", "secret"))
            .await
            .unwrap();
        session.select("INBOX", read_only).await.unwrap();
        session
    }

    fn login(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN ann secret\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
    }

    #[tokio::test]
    async fn test_star_is_silent() {
        let mock = login(&mut Builder::new())
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
            .write(b"A0002 UID STORE 4 +FLAGS.SILENT (\\Flagged)\r\n")
            .read(b"A0002 OK done\r\n")
            .build();
        let mut session = selected(mock, false).await;
        session.star(&IdSet::uids([4])).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_returns_echoed_flags() {
        let mock = login(&mut Builder::new())
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
            .write(b"A0002 STORE 2 -FLAGS (\\Seen)\r\n")
            .read(b"* 2 FETCH (FLAGS (\\Answered))\r\nA0002 OK done\r\n")
            .build();
        let mut session = selected(mock, false).await;
        let updated = session
            .store(&IdSet::sequence([2]), FlagOperation::Remove, &[Flag::Seen], false)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0.get(), 2);
        assert!(updated[0].1.contains(&Flag::Answered));
        assert!(!updated[0].1.is_seen());
    }

    #[tokio::test]
    async fn test_read_only_folder_is_refused() {
        let mock = login(&mut Builder::new())
            .write(b"A0001 EXAMINE INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n")
            .build();
        let mut session = selected(mock, true).await;
        let error = session.mark_seen(&IdSet::uids([1])).await.unwrap_err();
        assert!(matches!(error, Error::ReadOnly { ref folder } if folder == "INBOX"));
        assert_eq!(session.state(), SessionState::Selected);
    }

    #[tokio::test]
    async fn test_empty_set_is_a_no_op() {
        let mock = login(&mut Builder::new())
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 0 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n")
            .build();
        let mut session = selected(mock, false).await;
        let updated = session
            .store(&IdSet::empty(crate::ids::IdKind::Uid), FlagOperation::Replace, &[], false)
            .await
            .unwrap();
        assert!(updated.is_empty());
    }
}
