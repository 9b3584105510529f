//! Streamed message retrieval.
//!
//! [`Session::fetch`] hands the session to a producer task that issues a
//! single FETCH and forwards each message through a bounded queue in the
//! order the server sends them. A slow consumer stalls the producer once
//! the queue is full. [`FetchStream::finish`] returns the session, still
//! selected, whether or not every message was consumed.

#![allow(clippy::missing_errors_doc)]

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use mailsync_imap::{Envelope, FetchAttribute, FetchItem, Flags, SeqNum, Uid};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::FetchConfig;
use crate::error::{Error, Operation, Result};
use crate::ids::{IdKind, IdSet, MessageId};
use crate::session::{Session, timed};

/// A message attribute that can be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    /// Parsed envelope.
    Envelope,
    /// Current flags.
    Flags,
    /// Server arrival time.
    InternalDate,
    /// Unique identifier.
    Uid,
    /// Size in octets.
    Size,
    /// Raw message body.
    Body,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Envelope => "envelope",
            Self::Flags => "flags",
            Self::InternalDate => "internal date",
            Self::Uid => "UID",
            Self::Size => "size",
            Self::Body => "body",
        })
    }
}

/// Which body to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BodyRequest {
    section: Option<String>,
    peek: bool,
}

/// The attributes to fetch for each message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSpec {
    items: Vec<ItemKind>,
    body: Option<BodyRequest>,
}

impl FetchSpec {
    /// Fetches nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelope, flags and the whole body without setting `\Seen`.
    #[must_use]
    pub fn full() -> Self {
        Self::new().envelope().flags().internal_date().body_peek()
    }

    /// Adds the envelope.
    #[must_use]
    pub fn envelope(self) -> Self {
        self.with(ItemKind::Envelope)
    }

    /// Adds the flags.
    #[must_use]
    pub fn flags(self) -> Self {
        self.with(ItemKind::Flags)
    }

    /// Adds the internal date.
    #[must_use]
    pub fn internal_date(self) -> Self {
        self.with(ItemKind::InternalDate)
    }

    /// Adds the UID. UID fetches always include it.
    #[must_use]
    pub fn uid(self) -> Self {
        self.with(ItemKind::Uid)
    }

    /// Adds the size.
    #[must_use]
    pub fn size(self) -> Self {
        self.with(ItemKind::Size)
    }

    /// Adds the whole body using `BODY.PEEK[]`, leaving `\Seen` untouched.
    #[must_use]
    pub fn body_peek(self) -> Self {
        self.body_section(None, true)
    }

    /// Adds a body section. Without `peek` the server marks the message
    /// as seen, unless the folder was opened read-only.
    #[must_use]
    pub fn body_section(mut self, section: Option<&str>, peek: bool) -> Self {
        self.body = Some(BodyRequest {
            section: section.map(str::to_string),
            peek,
        });
        self.with(ItemKind::Body)
    }

    fn with(mut self, item: ItemKind) -> Self {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
        self
    }

    /// Returns true if `item` was requested.
    #[must_use]
    pub fn requests(&self, item: ItemKind) -> bool {
        self.items.contains(&item)
    }

    /// The attributes sent on the wire for a fetch by `kind`.
    #[must_use]
    pub fn attributes(&self, kind: IdKind) -> Vec<FetchAttribute> {
        let mut attributes = Vec::with_capacity(self.items.len() + 1);
        if kind.is_uid() && !self.requests(ItemKind::Uid) {
            attributes.push(FetchAttribute::Uid);
        }
        for item in &self.items {
            attributes.push(match item {
                ItemKind::Envelope => FetchAttribute::Envelope,
                ItemKind::Flags => FetchAttribute::Flags,
                ItemKind::InternalDate => FetchAttribute::InternalDate,
                ItemKind::Uid => FetchAttribute::Uid,
                ItemKind::Size => FetchAttribute::Rfc822Size,
                ItemKind::Body => {
                    let body = self.body.clone().unwrap_or(BodyRequest {
                        section: None,
                        peek: true,
                    });
                    FetchAttribute::BodySection {
                        section: body.section,
                        peek: body.peek,
                        partial: None,
                    }
                }
            });
        }
        attributes
    }
}

/// One fetched message.
///
/// Attributes the server did not return are `None` and listed in
/// `missing`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    /// Identifier in the kind the fetch was made with.
    pub id: MessageId,
    /// Sequence number at the time of the fetch.
    pub seq: SeqNum,
    /// Unique identifier.
    pub uid: Option<Uid>,
    /// Flags.
    pub flags: Option<Flags>,
    /// Server arrival time.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// Size in octets.
    pub size: Option<u32>,
    /// Envelope as sent by the server.
    pub envelope: Option<Envelope>,
    /// Raw body.
    pub body: Option<Bytes>,
    /// Requested attributes that were not returned.
    pub missing: Vec<ItemKind>,
}

impl FetchedMessage {
    fn new(id: MessageId, seq: SeqNum) -> Self {
        Self {
            id,
            seq,
            uid: None,
            flags: None,
            internal_date: None,
            size: None,
            envelope: None,
            body: None,
            missing: Vec::new(),
        }
    }

    /// Decoded subject from the envelope.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.envelope
            .as_ref()?
            .subject
            .as_deref()
            .map(mailsync_mime::encoding::decode_rfc2047)
    }

    /// Returns true if `\Seen` is among the fetched flags.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.as_ref().is_some_and(Flags::is_seen)
    }

    /// Opens the body for MIME decoding.
    pub fn decode(&self) -> Result<mailsync_mime::Reader> {
        let body = self.body.clone().ok_or(Error::FetchItemMissing {
            id: self.id,
            item: ItemKind::Body,
        })?;
        Ok(mailsync_mime::open(body)?)
    }
}

/// Builds a message from one FETCH response.
///
/// Returns `None` for responses that do not belong to the request, such
/// as unsolicited flag updates.
fn assemble(
    seq: SeqNum,
    items: Vec<FetchItem>,
    set: &IdSet,
    spec: &FetchSpec,
) -> Option<Result<FetchedMessage>> {
    let uid = items.iter().find_map(|item| match item {
        FetchItem::Uid(uid) => Some(*uid),
        _ => None,
    });
    let id = match set.kind() {
        IdKind::Uid => MessageId::Uid(uid?),
        IdKind::Sequence => MessageId::Seq(seq),
    };
    if !set.contains(id) {
        return None;
    }

    let mut message = FetchedMessage::new(id, seq);
    message.uid = uid;
    for item in items {
        match item {
            FetchItem::Flags(flags) => message.flags = Some(flags),
            FetchItem::InternalDate(date) => message.internal_date = Some(date),
            FetchItem::Rfc822Size(size) => message.size = Some(size),
            FetchItem::Envelope(envelope) => message.envelope = Some(*envelope),
            FetchItem::Body { data, .. } => {
                if message.body.is_none() {
                    message.body = data;
                }
            }
            FetchItem::Uid(_) | FetchItem::ModSeq(_) => {}
        }
    }

    if spec.requests(ItemKind::Body) && message.body.is_none() {
        return Some(Err(Error::FetchItemMissing {
            id,
            item: ItemKind::Body,
        }));
    }
    message.missing = spec
        .items
        .iter()
        .copied()
        .filter(|item| match item {
            ItemKind::Envelope => message.envelope.is_none(),
            ItemKind::Flags => message.flags.is_none(),
            ItemKind::InternalDate => message.internal_date.is_none(),
            ItemKind::Uid => message.uid.is_none(),
            ItemKind::Size => message.size.is_none(),
            ItemKind::Body => false,
        })
        .collect();
    if !message.missing.is_empty() {
        debug!(%id, missing = ?message.missing, "partial FETCH response");
    }
    Some(Ok(message))
}

/// Messages arriving from a running fetch.
pub struct FetchStream<S> {
    rx: mpsc::Receiver<Result<FetchedMessage>>,
    task: JoinHandle<Session<S>>,
}

impl<S> fmt::Debug for FetchStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchStream")
            .field("queued", &self.rx.len())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl<S> FetchStream<S> {
    /// Returns the next message or per-message error, or `None` when the
    /// fetch is over.
    ///
    /// An error that ends the fetch is delivered as the last item.
    pub async fn next(&mut self) -> Option<Result<FetchedMessage>> {
        self.rx.recv().await
    }

    /// Stops consuming and returns the session.
    ///
    /// Unread responses are drained first, so the session is left in the
    /// selected state unless the connection failed.
    pub async fn finish(self) -> Result<Session<S>> {
        drop(self.rx);
        Ok(self.task.await?)
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Starts fetching `set` from the selected folder.
    ///
    /// The session moves into the stream and comes back from
    /// [`FetchStream::finish`]. Failures, including calling this outside
    /// the selected state, arrive through the stream.
    #[must_use]
    pub fn fetch(self, set: &IdSet, spec: &FetchSpec, config: &FetchConfig) -> FetchStream<S> {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let task = tokio::spawn(produce(self, set.clone(), spec.clone(), tx));
        FetchStream { rx, task }
    }

    /// Fetches `set` and collects the result.
    ///
    /// Messages missing their body are returned separately. Any other
    /// failure is returned as the error; the session is kept either way.
    pub async fn fetch_all(
        &mut self,
        set: &IdSet,
        spec: &FetchSpec,
        config: &FetchConfig,
    ) -> Result<FetchBatch> {
        let mut stream = self.take().fetch(set, spec, config);
        let mut batch = FetchBatch::default();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => batch.messages.push(message),
                Err(error @ Error::FetchItemMissing { .. }) => batch.failures.push(error),
                Err(error) => failure = Some(error),
            }
        }
        *self = stream.finish().await?;
        match failure {
            Some(error) => Err(error),
            None => Ok(batch),
        }
    }
}

/// The collected result of [`Session::fetch_all`].
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Messages in server order.
    pub messages: Vec<FetchedMessage>,
    /// Per-message failures.
    pub failures: Vec<Error>,
}

async fn produce<S>(
    mut session: Session<S>,
    set: IdSet,
    spec: FetchSpec,
    tx: mpsc::Sender<Result<FetchedMessage>>,
) -> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = session.io_limit();
    let client = match session.selected_client(Operation::Fetch) {
        Ok(client) => client,
        Err(error) => {
            let _ = tx.send(Err(error)).await;
            return session;
        }
    };
    let Some(sequence_set) = set.as_sequence_set() else {
        trace!("empty fetch set, nothing to do");
        return session;
    };

    let attributes = spec.attributes(set.kind());
    let mut responses =
        match timed(limit, client.fetch(sequence_set, &attributes, set.kind().is_uid())).await {
            Ok(responses) => responses,
            Err(error) => {
                let error = session.fail(Operation::Fetch, error);
                let _ = tx.send(Err(error)).await;
                return session;
            }
        };

    let mut delivered = 0_usize;
    let mut abandoned = false;
    let outcome = loop {
        match timed(limit, responses.next()).await {
            Ok(Some((seq, items))) => {
                let Some(message) = assemble(seq, items, &set, &spec) else {
                    trace!(seq = seq.get(), "skipping unrequested FETCH response");
                    continue;
                };
                if tx.send(message).await.is_err() {
                    abandoned = true;
                    break Ok(());
                }
                delivered += 1;
            }
            Ok(None) => break Ok(()),
            Err(error) => break Err(error),
        }
    };

    let outcome = if abandoned {
        debug!(delivered, "fetch abandoned, draining");
        timed(limit, responses.finish()).await
    } else {
        drop(responses);
        outcome
    };

    match outcome {
        Ok(()) => debug!(delivered, "fetch finished"),
        Err(error) => {
            let error = session.fail(Operation::Fetch, error);
            warn!(%error, delivered, "fetch ended early");
            let _ = tx.send(Err(error)).await;
        }
    }
    session
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
    use mailsync_imap::{Command, SequenceSet, Tag};
    use tokio_test::io::{Builder, Mock};

    fn wire(spec: &FetchSpec, kind: IdKind) -> String {
        let command = Command::Fetch {
            set: SequenceSet::range(1, 3).unwrap(),
            items: spec.attributes(kind),
            uid: kind.is_uid(),
        };
        String::from_utf8(command.serialize(&Tag::new("A1")).unwrap()).unwrap()
    }

    fn greet(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN ann secret\r\n")
            .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
            .write(b"A0001 EXAMINE INBOX\r\n")
            .read(b"* 3 EXISTS\r\n* OK [UIDVALIDITY 1] ok\r\nA0001 OK [READ-ONLY] done\r\n")
    }

    async fn selected(mock: Mock) -> Session<Mock> {
        let mut session = Session::from_stream(mock).await.unwrap();
        session
            .authenticate(&PlainCredential::new("ann", "secret"))
            .await
            .unwrap();
        session.select("INBOX", true).await.unwrap();
        session
    }

    mod spec_tests {
        use super::*;

        #[test]
        fn test_uid_fetch_always_asks_for_uid() {
            let spec = FetchSpec::new().flags();
            assert_eq!(wire(&spec, IdKind::Uid), "A1 UID FETCH 1:3 (UID FLAGS)\r\n");
            assert_eq!(wire(&spec, IdKind::Sequence), "A1 FETCH 1:3 FLAGS\r\n");
        }

        #[test]
        fn test_full_uses_peek() {
            assert_eq!(
                wire(&FetchSpec::full(), IdKind::Sequence),
                "A1 FETCH 1:3 (ENVELOPE FLAGS INTERNALDATE BODY.PEEK[])\r\n"
            );
        }

        #[test]
        fn test_duplicates_are_ignored() {
            let spec = FetchSpec::new().flags().flags().uid();
            assert_eq!(wire(&spec, IdKind::Uid), "A1 UID FETCH 1:3 (FLAGS UID)\r\n");
        }

        #[test]
        fn test_body_section() {
            let spec = FetchSpec::new().body_section(Some("1"), false);
            assert_eq!(wire(&spec, IdKind::Sequence), "A1 FETCH 1:3 BODY[1]\r\n");
        }
    }

    mod assemble_tests {
        use super::*;

        fn seq(n: u32) -> SeqNum {
            SeqNum::new(n).unwrap()
        }

        #[test]
        fn test_missing_attribute_is_absent() {
            let spec = FetchSpec::new().flags().envelope();
            let set = IdSet::sequence([1]);
            let message = assemble(seq(1), vec![FetchItem::Flags(Flags::new())], &set, &spec)
                .unwrap()
                .unwrap();
            assert_eq!(message.flags, Some(Flags::new()));
            assert_eq!(message.envelope, None);
            assert_eq!(message.missing, vec![ItemKind::Envelope]);
        }

        #[test]
        fn test_missing_body_is_an_error() {
            let spec = FetchSpec::full();
            let set = IdSet::sequence([2]);
            let items = vec![FetchItem::Body {
                section: None,
                origin: None,
                data: None,
            }];
            let error = assemble(seq(2), items, &set, &spec).unwrap().unwrap_err();
            assert!(matches!(
                error,
                Error::FetchItemMissing {
                    item: ItemKind::Body,
                    ..
                }
            ));
            assert!(error.is_recoverable());
        }

        #[test]
        fn test_unrequested_responses_are_skipped() {
            let spec = FetchSpec::new().flags();
            let uids = IdSet::uids([10]);
            // Unsolicited flag update without a UID.
            assert!(assemble(seq(1), vec![FetchItem::Flags(Flags::new())], &uids, &spec).is_none());
            let other = vec![FetchItem::Uid(Uid::new(11).unwrap())];
            assert!(assemble(seq(2), other, &uids, &spec).is_none());
        }

        #[test]
        fn test_decode_without_body() {
            let message = FetchedMessage::new(MessageId::Seq(seq(1)), seq(1));
            assert!(matches!(
                message.decode(),
                Err(Error::FetchItemMissing { .. })
            ));
        }

        #[test]
        fn test_subject_is_decoded() {
            let mut message = FetchedMessage::new(MessageId::Seq(seq(1)), seq(1));
            message.envelope = Some(Envelope {
                subject: Some("=?UTF-8?Q?Caf=C3=A9?=".to_string()),
                ..Envelope::default()
            });
            assert_eq!(message.subject().as_deref(), Some("Café"));
        }
    }

    mod stream_tests {
        use super::*;

        #[tokio::test]
        async fn test_messages_arrive_in_server_order() {
            let mock = greet(&mut Builder::new())
                .write(b"A0002 UID FETCH 5,9 (UID FLAGS)\r\n")
                .read(b"* 2 FETCH (UID 9 FLAGS (\\Seen))\r\n")
                .read(b"* 1 FETCH (UID 5 FLAGS ())\r\n")
                .read(b"A0002 OK done\r\n")
                .build();
            let session = selected(mock).await;

            let set = IdSet::uids([5, 9]);
            let mut stream = session.fetch(&set, &FetchSpec::new().flags(), &FetchConfig::new());
            let first = stream.next().await.unwrap().unwrap();
            let second = stream.next().await.unwrap().unwrap();
            assert!(stream.next().await.is_none());
            assert_eq!(first.id.get(), 9);
            assert!(first.is_seen());
            assert_eq!(second.id.get(), 5);
            assert!(!second.is_seen());

            let session = stream.finish().await.unwrap();
            assert_eq!(session.state(), SessionState::Selected);
        }

        #[tokio::test]
        async fn test_abandoned_stream_keeps_session_selected() {
            let mock = greet(&mut Builder::new())
                .write(b"A0002 FETCH 1:3 FLAGS\r\n")
                .read(b"* 1 FETCH (FLAGS ())\r\n")
                .read(b"* 2 FETCH (FLAGS ())\r\n")
                .read(b"* 3 FETCH (FLAGS ())\r\n")
                .read(b"A0002 OK done\r\n")
                .write(b"A0003 NOOP\r\n")
                .read(b"A0003 OK done\r\n")
                .build();
            let session = selected(mock).await;

            let set = IdSet::range(IdKind::Sequence, 1, 3);
            let config = FetchConfig::new().queue_depth(1);
            let mut stream = session.fetch(&set, &FetchSpec::new().flags(), &config);
            assert!(stream.next().await.unwrap().is_ok());

            let mut session = stream.finish().await.unwrap();
            assert_eq!(session.state(), SessionState::Selected);
            session.poll().await.unwrap();
        }

        #[tokio::test]
        async fn test_missing_body_does_not_end_stream() {
            let mock = greet(&mut Builder::new())
                .write(b"A0002 FETCH 1:2 BODY.PEEK[]\r\n")
                .read(b"* 1 FETCH (BODY[] NIL)\r\n")
                .read(b"* 2 FETCH (BODY[] {4}\r\nabcd)\r\n")
                .read(b"A0002 OK done\r\n")
                .build();
            let mut session = selected(mock).await;

            let set = IdSet::range(IdKind::Sequence, 1, 2);
            let batch = session
                .fetch_all(&set, &FetchSpec::new().body_peek(), &FetchConfig::new())
                .await
                .unwrap();
            assert_eq!(batch.failures.len(), 1);
            assert_eq!(batch.messages.len(), 1);
            assert_eq!(batch.messages[0].body.as_deref(), Some(&b"abcd"[..]));
            assert_eq!(session.state(), SessionState::Selected);
        }

        #[tokio::test]
        async fn test_fetch_outside_selection() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .build();
            let session = Session::from_stream(mock).await.unwrap();
            let mut stream = session.fetch(
                &IdSet::all(IdKind::Uid),
                &FetchSpec::new().flags(),
                &FetchConfig::new(),
            );
            let error = stream.next().await.unwrap().unwrap_err();
            assert!(matches!(
                error,
                Error::InvalidState {
                    op: Operation::Fetch,
                    state: SessionState::NotAuthenticated
                }
            ));
            assert!(stream.next().await.is_none());
            let session = stream.finish().await.unwrap();
            assert_eq!(session.state(), SessionState::NotAuthenticated);
        }

        #[tokio::test]
        async fn test_rejected_fetch_keeps_session() {
            let mock = greet(&mut Builder::new())
                .write(b"A0002 FETCH 7 FLAGS\r\n")
                .read(b"A0002 NO no such message\r\n")
                .build();
            let mut session = selected(mock).await;

            let error = session
                .fetch_all(&IdSet::sequence([7]), &FetchSpec::new().flags(), &FetchConfig::new())
                .await
                .unwrap_err();
            assert!(matches!(error, Error::Rejected { op: Operation::Fetch, .. }));
            assert_eq!(session.state(), SessionState::Selected);
        }
    }
}
