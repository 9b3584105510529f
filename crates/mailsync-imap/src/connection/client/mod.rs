//! Type-state IMAP client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at compile time:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN/AUTHENTICATE
//! - `Selected`: after SELECT/EXAMINE
//!
//! Each state only exposes methods that are valid for that state. Exactly
//! one command is in flight at a time; a command whose responses were not
//! read to completion (an abandoned stream, an IDLE that was never ended)
//! is settled before the next command is written.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

pub use self::authenticated::SelectResult;
pub use self::selected::FetchResponses;
pub use self::states::{Authenticated, LoggedIn, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator, is_tagged};
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capabilities, ResponseCode, Status, Tag};
use crate::{Error, Result};

/// Work the server may still be doing for an earlier command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pending {
    /// Responses up to this tag have not been read.
    Command(Tag),
    /// IDLE is active under this tag; DONE has not been sent.
    Idle(Tag),
}

/// Outcome of a completed command.
#[derive(Debug, Default)]
pub(crate) struct Completed {
    pub(crate) untagged: Vec<UntaggedResponse>,
    pub(crate) code: Option<ResponseCode>,
}

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tags: TagGenerator,
    pub(crate) capabilities: Capabilities,
    pub(crate) pending: Option<Pending>,
    pub(crate) state: State,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the capabilities last advertised by the server.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the type-state value.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Sends CAPABILITY and replaces the stored set.
    pub async fn capability(&mut self) -> Result<&Capabilities> {
        let completed = self.execute(&Command::Capability).await?;
        for response in completed.untagged {
            if let UntaggedResponse::Capability(caps) = response {
                self.capabilities = Capabilities::new(caps);
            }
        }
        Ok(&self.capabilities)
    }

    /// Sends NOOP and returns the unilateral data the server flushed.
    pub async fn noop(&mut self) -> Result<Vec<UntaggedResponse>> {
        Ok(self.execute(&Command::Noop).await?.untagged)
    }

    /// Logs out and closes the connection.
    ///
    /// The connection is gone afterwards whatever happens, so transport
    /// errors while saying goodbye are logged and swallowed.
    pub async fn logout(mut self) -> Result<()> {
        match self.execute(&Command::Logout).await {
            Ok(_) | Err(Error::Closed | Error::Bye(_)) => {}
            Err(error) => tracing::debug!(%error, "error during LOGOUT"),
        }
        Ok(())
    }

    /// Moves the connection into another state.
    pub(crate) fn into_state<Next>(self, state: Next) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tags: self.tags,
            capabilities: self.capabilities,
            pending: self.pending,
            state,
        }
    }

    /// Writes a command and returns its tag without reading any response.
    ///
    /// Literals are synchronizing: after each `{n}` the server's
    /// continuation is awaited before the literal data goes out.
    pub(crate) async fn send(&mut self, command: &Command) -> Result<Tag> {
        self.settle().await?;
        let tag = self.tags.next_tag();
        let segments = command.encode(&tag)?.into_segments();
        tracing::trace!(%tag, command = command.name(), "sending command");
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                self.await_continuation(&tag).await?;
            }
            self.stream.write_command(segment).await?;
            self.pending = Some(Pending::Command(tag.clone()));
        }
        Ok(tag)
    }

    /// Waits for the go-ahead to send a literal.
    async fn await_continuation(&mut self, tag: &Tag) -> Result<()> {
        loop {
            let raw = self.stream.read_response().await?;
            if is_tagged(&raw, tag) {
                self.pending = None;
                return match ResponseParser::parse(&raw)? {
                    Response::Tagged {
                        status, code, text, ..
                    } => check_status(status, code, text).and(Err(Error::Protocol(
                        "command completed before its literal was sent".to_string(),
                    ))),
                    _ => Err(Error::Protocol("malformed tagged response".to_string())),
                };
            }
            match ResponseParser::parse(&raw) {
                Ok(Response::Continuation { .. }) => return Ok(()),
                Ok(Response::Untagged(untagged)) => self.observe(&untagged),
                _ => {}
            }
        }
    }

    /// Runs a command to completion.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Completed> {
        let tag = self.send(command).await?;
        let responses = ResponseAccumulator::new(tag.clone())
            .read_until_tagged(&mut self.stream)
            .await?;
        self.pending = None;
        self.complete(&tag, &responses)
    }

    /// Parses the responses of a finished command.
    fn complete(&mut self, tag: &Tag, responses: &[Bytes]) -> Result<Completed> {
        let mut completed = Completed::default();
        let mut outcome = None;

        for raw in responses {
            match ResponseParser::parse(raw) {
                Ok(Response::Untagged(untagged)) => {
                    self.observe(&untagged);
                    completed.untagged.push(untagged);
                }
                Ok(Response::Tagged {
                    tag: done,
                    status,
                    code,
                    text,
                }) if &done == tag => outcome = Some((status, code, text)),
                Ok(other) => tracing::debug!(?other, "ignoring unexpected response"),
                Err(error) => tracing::debug!(%error, "skipping unparseable response"),
            }
        }

        let (status, code, text) =
            outcome.ok_or_else(|| Error::Protocol(format!("missing tagged response for {tag}")))?;
        if let Some(ResponseCode::Capability(caps)) = &code {
            self.capabilities = Capabilities::new(caps.clone());
        }
        check_status(status, code.clone(), text)?;
        completed.code = code;
        Ok(completed)
    }

    /// Applies capability announcements carried by untagged data.
    fn observe(&mut self, untagged: &UntaggedResponse) {
        match untagged {
            UntaggedResponse::Capability(caps)
            | UntaggedResponse::Ok {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => self.capabilities = Capabilities::new(caps.clone()),
            _ => {}
        }
    }

    /// Reads the responses of the command tagged `tag` again, after its
    /// stream was dropped.
    ///
    /// The stream is empty if that command has already completed.
    pub fn resume(&mut self, tag: Tag) -> ResponseStream<'_, S, State> {
        let done = self.pending != Some(Pending::Command(tag.clone()));
        ResponseStream {
            client: self,
            tag,
            done,
        }
    }

    /// Finishes whatever an abandoned stream or IDLE left behind.
    pub(crate) async fn settle(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let tag = match pending {
            Pending::Command(tag) => tag,
            Pending::Idle(tag) => {
                tracing::debug!(%tag, "ending abandoned IDLE");
                self.stream.write_command(b"DONE\r\n").await?;
                tag
            }
        };
        tracing::debug!(%tag, "draining responses of an abandoned command");
        ResponseAccumulator::new(tag)
            .read_until_tagged(&mut self.stream)
            .await?;
        Ok(())
    }
}

/// Maps a completion status to a result.
pub(crate) fn check_status(status: Status, code: Option<ResponseCode>, text: String) -> Result<()> {
    match status {
        Status::Ok | Status::PreAuth => Ok(()),
        Status::No => Err(Error::No { code, text }),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
    }
}

/// Responses of one command, read one at a time.
///
/// Dropping the stream early is allowed: the client drains the remaining
/// responses before it writes the next command.
pub struct ResponseStream<'a, S, State> {
    client: &'a mut Client<S, State>,
    tag: Tag,
    done: bool,
}

impl<S, State> std::fmt::Debug for ResponseStream<'_, S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("tag", &self.tag)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<'a, S, State> ResponseStream<'a, S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) const fn new(client: &'a mut Client<S, State>, tag: Tag) -> Self {
        Self {
            client,
            tag,
            done: false,
        }
    }

    /// Returns the next untagged response, or `None` once the command
    /// completed successfully.
    ///
    /// A response that fails to parse is returned as an error without
    /// ending the stream; framing is unaffected, so reading can go on.
    pub async fn next(&mut self) -> Result<Option<UntaggedResponse>> {
        while !self.done {
            let raw = self.client.stream.read_response().await?;

            if is_tagged(&raw, &self.tag) {
                self.done = true;
                self.client.pending = None;
                return match ResponseParser::parse(&raw)? {
                    Response::Tagged {
                        status, code, text, ..
                    } => check_status(status, code, text).map(|()| None),
                    _ => Err(Error::Protocol("malformed tagged response".to_string())),
                };
            }

            match ResponseParser::parse(&raw)? {
                Response::Untagged(untagged) => {
                    self.client.observe(&untagged);
                    return Ok(Some(untagged));
                }
                other => tracing::debug!(?other, "ignoring unexpected response"),
            }
        }
        Ok(None)
    }

    /// Reads and discards the remaining responses.
    pub async fn finish(mut self) -> Result<()> {
        loop {
            match self.next().await {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(()),
                Err(error @ Error::Parse { .. }) => {
                    tracing::debug!(%error, "skipping unparseable response");
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Returns the tag of the command being read.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns true once the tagged completion has been read.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }
}
