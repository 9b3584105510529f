//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, Selected};
use super::{Client, ResponseStream};
use crate::command::{Command, FetchAttribute, SearchKey, StoreMode};
use crate::parser::{FetchItem, UntaggedResponse};
use crate::types::{Flag, Flags, SeqNum, SequenceSet};
use crate::{Error, Result};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Closes the mailbox and returns to the authenticated state.
    ///
    /// CLOSE expunges `\Deleted` messages when the mailbox is read-write.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Close).await?;
        Ok(self.into_state(Authenticated))
    }

    /// Runs SEARCH and returns the matching numbers.
    ///
    /// With `uid` set the numbers are UIDs, otherwise sequence numbers.
    pub async fn search(&mut self, key: &SearchKey, uid: bool) -> Result<Vec<u32>> {
        let completed = self
            .execute(&Command::Search {
                key: key.clone(),
                uid,
            })
            .await?;

        let mut found = Vec::new();
        for response in completed.untagged {
            match response {
                UntaggedResponse::Search(numbers) => found.extend(numbers),
                other => self.apply(&other),
            }
        }
        Ok(found)
    }

    /// Starts a FETCH and returns a reader for its responses.
    pub async fn fetch(
        &mut self,
        set: &SequenceSet,
        items: &[FetchAttribute],
        uid: bool,
    ) -> Result<FetchResponses<'_, S>> {
        let tag = self
            .send(&Command::Fetch {
                set: set.clone(),
                items: items.to_vec(),
                uid,
            })
            .await?;
        Ok(FetchResponses {
            inner: ResponseStream::new(self, tag),
        })
    }

    /// Changes flags and returns the flags the server echoed back.
    ///
    /// With `silent` set the server echoes nothing.
    pub async fn store(
        &mut self,
        set: &SequenceSet,
        mode: StoreMode,
        flags: &[Flag],
        silent: bool,
        uid: bool,
    ) -> Result<Vec<(SeqNum, Flags)>> {
        if self.state.is_read_only() {
            return Err(Error::Protocol(format!(
                "{} is open read-only",
                self.state.mailbox()
            )));
        }

        let completed = self
            .execute(&Command::Store {
                set: set.clone(),
                mode,
                flags: flags.to_vec(),
                silent,
                uid,
            })
            .await?;

        let mut updated = Vec::new();
        for response in completed.untagged {
            if let UntaggedResponse::Fetch { seq, items } = response {
                if let Some(flags) = items.into_iter().find_map(|item| match item {
                    FetchItem::Flags(flags) => Some(flags),
                    _ => None,
                }) {
                    updated.push((seq, flags));
                }
            } else {
                self.apply(&response);
            }
        }
        Ok(updated)
    }

    /// Sends NOOP, applies size changes to the selection and returns
    /// everything the server reported.
    pub async fn poll(&mut self) -> Result<Vec<UntaggedResponse>> {
        let updates = self.noop().await?;
        for update in &updates {
            self.apply(update);
        }
        Ok(updates)
    }

    /// Tracks mailbox size changes reported unilaterally.
    pub(crate) fn apply(&mut self, response: &UntaggedResponse) {
        let status = &mut self.state.status;
        match response {
            UntaggedResponse::Exists(n) => status.exists = *n,
            UntaggedResponse::Recent(n) => status.recent = *n,
            UntaggedResponse::Expunge(_) => status.exists = status.exists.saturating_sub(1),
            _ => {}
        }
    }
}

/// FETCH responses in server order.
#[derive(Debug)]
pub struct FetchResponses<'a, S> {
    inner: ResponseStream<'a, S, Selected>,
}

impl<S> FetchResponses<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the next message's data items, or `None` when the command
    /// completed.
    ///
    /// A response the parser rejects is returned as an error; the stream
    /// stays usable and the next call continues with the following message.
    pub async fn next(&mut self) -> Result<Option<(SeqNum, Vec<FetchItem>)>> {
        while let Some(response) = self.inner.next().await? {
            match response {
                UntaggedResponse::Fetch { seq, items } => return Ok(Some((seq, items))),
                other => {
                    tracing::trace!(?other, "unilateral data during FETCH");
                    self.inner.client.apply(&other);
                }
            }
        }
        Ok(None)
    }

    /// Reads and discards the remaining responses.
    pub async fn finish(self) -> Result<()> {
        self.inner.finish().await
    }

    /// Returns true once the tagged completion has been read.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.inner.is_done()
    }
}
