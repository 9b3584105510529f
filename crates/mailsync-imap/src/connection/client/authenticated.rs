//! Operations available once logged in.

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, LoggedIn, Selected};
use super::{Client, Completed, ResponseStream};
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::{ListEntry, MailboxStatus, ResponseCode, StatusData, StatusItem};
use crate::{Error, Result};

/// Outcome of SELECT/EXAMINE.
///
/// On failure the client is handed back in the authenticated state: a
/// failed SELECT leaves no mailbox selected, even if one was before.
pub type SelectResult<S> =
    std::result::Result<Client<S, Selected>, (Error, Client<S, Authenticated>)>;

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
    State: LoggedIn,
{
    /// Lists mailboxes matching `pattern` under `reference`.
    ///
    /// Entries are read off the wire one at a time as
    /// [`UntaggedResponse::List`] items of the returned stream.
    pub async fn list(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<ResponseStream<'_, S, State>> {
        let tag = self
            .send(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(ResponseStream::new(self, tag))
    }

    /// Lists mailboxes and collects the entries.
    pub async fn list_all(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let mut stream = self.list(reference, pattern).await?;
        let mut entries = Vec::new();
        while let Some(response) = stream.next().await? {
            if let UntaggedResponse::List(entry) = response {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Queries mailbox counters without selecting it.
    pub async fn status(&mut self, mailbox: &str, items: &[StatusItem]) -> Result<StatusData> {
        let completed = self
            .execute(&Command::Status {
                mailbox: mailbox.to_string(),
                items: items.to_vec(),
            })
            .await?;
        completed
            .untagged
            .into_iter()
            .find_map(|response| match response {
                UntaggedResponse::Status(data) => Some(data),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol(format!("no STATUS data for {mailbox}")))
    }

    /// Selects a mailbox for read-write access.
    pub async fn select(self, mailbox: &str) -> SelectResult<S> {
        self.open(mailbox, false).await
    }

    /// Opens a mailbox read-only with EXAMINE.
    ///
    /// Fetching bodies from an examined mailbox never sets `\Seen`.
    pub async fn examine(self, mailbox: &str) -> SelectResult<S> {
        self.open(mailbox, true).await
    }

    async fn open(mut self, mailbox: &str, read_only: bool) -> SelectResult<S> {
        let command = if read_only {
            Command::Examine {
                mailbox: mailbox.to_string(),
            }
        } else {
            Command::Select {
                mailbox: mailbox.to_string(),
            }
        };

        match self.execute(&command).await {
            Ok(completed) => {
                let status = mailbox_status(&completed, read_only);
                tracing::debug!(
                    mailbox,
                    exists = status.exists,
                    uid_validity = ?status.uid_validity,
                    read_only = status.read_only,
                    "mailbox opened"
                );
                Ok(self.into_state(Selected::new(mailbox, status)))
            }
            Err(error) => Err((error, self.into_state(Authenticated))),
        }
    }
}

/// Builds the mailbox snapshot from SELECT/EXAMINE responses.
pub(crate) fn mailbox_status(completed: &Completed, read_only: bool) -> MailboxStatus {
    let mut status = MailboxStatus {
        read_only,
        ..MailboxStatus::default()
    };

    for response in &completed.untagged {
        match response {
            UntaggedResponse::Exists(n) => status.exists = *n,
            UntaggedResponse::Recent(n) => status.recent = *n,
            UntaggedResponse::Flags(flags) => status.flags = flags.clone(),
            UntaggedResponse::Ok { code: Some(code), .. } => match code {
                ResponseCode::Unseen(seq) => status.unseen = Some(*seq),
                ResponseCode::UidNext(uid) => status.uid_next = Some(*uid),
                ResponseCode::UidValidity(validity) => status.uid_validity = Some(*validity),
                ResponseCode::PermanentFlags(flags) => {
                    status.permanent_flags = flags.iter().cloned().collect();
                }
                _ => {}
            },
            _ => {}
        }
    }

    match completed.code {
        Some(ResponseCode::ReadOnly) => status.read_only = true,
        Some(ResponseCode::ReadWrite) => status.read_only = false,
        _ => {}
    }
    status
}
