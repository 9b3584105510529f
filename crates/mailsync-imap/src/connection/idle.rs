//! IMAP IDLE command support (RFC 2177).
//!
//! IDLE lets the server push mailbox changes without the client polling.

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use super::client::{Client, Pending, Selected, check_status};
use super::framed::{ResponseAccumulator, is_tagged};
use crate::command::Command;
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{Flags, SeqNum, Tag, Uid};
use crate::{Error, Result};

/// Event received during IDLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count (EXISTS response).
    Exists(u32),
    /// Message expunged (EXPUNGE response).
    Expunge(SeqNum),
    /// Message data changed, usually flags (FETCH response).
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// UID, when the server includes it.
        uid: Option<Uid>,
        /// Updated flags, when included.
        flags: Option<Flags>,
    },
    /// Recent count changed.
    Recent(u32),
    /// The wait elapsed without a change.
    Timeout,
}

/// Handle for an active IDLE.
///
/// Call [`wait`](Self::wait) to receive events and [`done`](Self::done) to
/// leave IDLE. A handle dropped without `done` leaves the client to send
/// DONE before its next command.
#[derive(Debug)]
pub struct IdleHandle<'a, S> {
    client: &'a mut Client<S, Selected>,
    tag: Tag,
    finished: bool,
}

impl<S> IdleHandle<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Waits for a server event or until `duration` elapses.
    ///
    /// Cancelling this future (or letting it time out) loses no data.
    ///
    /// # Notes
    ///
    /// RFC 2177 recommends re-issuing IDLE at least every 29 minutes.
    pub async fn wait(&mut self, duration: Duration) -> Result<IdleEvent> {
        if self.finished {
            return Err(Error::Protocol("IDLE already ended".to_string()));
        }
        loop {
            let raw = match timeout(duration, self.client.stream.read_response()).await {
                Ok(raw) => raw?,
                Err(_) => return Ok(IdleEvent::Timeout),
            };
            if let Some(event) = self.event(&raw)? {
                return Ok(event);
            }
        }
    }

    /// Maps one response to an event; `None` for data that is not one.
    fn event(&mut self, raw: &[u8]) -> Result<Option<IdleEvent>> {
        if is_tagged(raw, &self.tag) {
            // The server ended IDLE on its own.
            self.finished = true;
            self.client.pending = None;
            return match ResponseParser::parse(raw)? {
                Response::Tagged {
                    status, code, text, ..
                } => check_status(status, code, text)
                    .and(Err(Error::Protocol("server ended IDLE".to_string()))),
                _ => Err(Error::Protocol("malformed tagged response".to_string())),
            };
        }

        let untagged = match ResponseParser::parse(raw) {
            Ok(Response::Untagged(untagged)) => untagged,
            Ok(_) => return Ok(None),
            Err(error) => {
                tracing::debug!(%error, "skipping unparseable response during IDLE");
                return Ok(None);
            }
        };
        self.client.apply(&untagged);

        Ok(match untagged {
            UntaggedResponse::Exists(n) => Some(IdleEvent::Exists(n)),
            UntaggedResponse::Recent(n) => Some(IdleEvent::Recent(n)),
            UntaggedResponse::Expunge(seq) => Some(IdleEvent::Expunge(seq)),
            UntaggedResponse::Fetch { seq, items } => {
                let mut uid = None;
                let mut flags = None;
                for item in items {
                    match item {
                        FetchItem::Uid(u) => uid = Some(u),
                        FetchItem::Flags(f) => flags = Some(f),
                        _ => {}
                    }
                }
                Some(IdleEvent::Fetch { seq, uid, flags })
            }
            UntaggedResponse::Bye { text, .. } => return Err(Error::Bye(text)),
            // Keepalive `* OK Still here` and the like.
            _ => None,
        })
    }

    /// Leaves IDLE by sending DONE and reading the completion.
    pub async fn done(self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.client.stream.write_command(b"DONE\r\n").await?;
        self.client.pending = Some(Pending::Command(self.tag.clone()));

        let responses = ResponseAccumulator::new(self.tag.clone())
            .read_until_tagged(&mut self.client.stream)
            .await?;
        self.client.pending = None;

        for raw in &responses {
            match ResponseParser::parse(raw) {
                Ok(Response::Untagged(untagged)) => self.client.apply(&untagged),
                Ok(Response::Tagged {
                    status, code, text, ..
                }) => return check_status(status, code, text),
                _ => {}
            }
        }
        Err(Error::Protocol("missing IDLE completion".to_string()))
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Enters IDLE.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut handle = client.idle().await?;
    /// loop {
    ///     match handle.wait(Duration::from_secs(600)).await? {
    ///         IdleEvent::Exists(n) => println!("{n} messages"),
    ///         IdleEvent::Timeout => break,
    ///         _ => {}
    ///     }
    /// }
    /// handle.done().await?;
    /// ```
    ///
    /// Check `capabilities().supports_idle()` first; servers without IDLE
    /// answer BAD.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        let tag = self.send(&Command::Idle).await?;

        loop {
            let raw = self.stream.read_response().await?;
            if is_tagged(&raw, &tag) {
                self.pending = None;
                return match ResponseParser::parse(&raw)? {
                    Response::Tagged {
                        status, code, text, ..
                    } => check_status(status, code, text)
                        .and(Err(Error::Protocol("IDLE completed immediately".to_string()))),
                    _ => Err(Error::Protocol("malformed tagged response".to_string())),
                };
            }
            match ResponseParser::parse(&raw) {
                Ok(Response::Continuation { .. }) => break,
                Ok(Response::Untagged(untagged)) => self.apply(&untagged),
                _ => {}
            }
        }

        tracing::debug!(%tag, mailbox = self.mailbox(), "entered IDLE");
        self.pending = Some(Pending::Idle(tag.clone()));
        Ok(IdleHandle {
            client: self,
            tag,
            finished: false,
        })
    }
}
