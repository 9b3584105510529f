//! Change notifications for the selected folder.
//!
//! An [`IdleWatcher`] takes ownership of a selected session and runs it in
//! a background task. Servers that advertise IDLE push changes; for the
//! others the watcher polls with NOOP. Changes reach a [`WatchHandler`],
//! and the watcher's [`WatchState`] is published on a `watch` channel.
//!
//! When the connection fails the watcher enters [`WatchState::Failed`],
//! reports the error to the handler and, if a [`Reconnect`] source was
//! given and the policy allows, reconnects with exponential backoff:
//! re-authenticating, re-selecting the same folder and resuming.
//!
//! [`Handle::stop`] ends the watch and returns the session, still selected.

#![allow(clippy::missing_errors_doc)]

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mailsync_auth::Credential;
use mailsync_imap::{Capabilities, Flags, IdleEvent, ImapStream, UntaggedResponse};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::error::{Error, Operation, Result};
use crate::ids::MessageId;
use crate::session::{Session, SessionManager, timed};

/// A change in the watched folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The folder now holds this many messages.
    CountChanged(u32),
    /// A message was removed. Later sequence numbers shift down by one.
    Expunged(MessageId),
    /// A message's flags changed.
    FlagsChanged {
        /// UID when the server sent one, else the sequence number.
        id: MessageId,
        /// New flags, when included.
        flags: Option<Flags>,
    },
}

impl WatchEvent {
    fn from_idle(event: IdleEvent) -> Option<Self> {
        match event {
            IdleEvent::Exists(count) => Some(Self::CountChanged(count)),
            IdleEvent::Expunge(seq) => Some(Self::Expunged(MessageId::Seq(seq))),
            IdleEvent::Fetch { seq, uid, flags } => Some(Self::FlagsChanged {
                id: uid.map_or(MessageId::Seq(seq), MessageId::Uid),
                flags,
            }),
            IdleEvent::Recent(_) | IdleEvent::Timeout => None,
        }
    }

    fn from_untagged(response: UntaggedResponse) -> Option<Self> {
        match response {
            UntaggedResponse::Exists(count) => Some(Self::CountChanged(count)),
            UntaggedResponse::Expunge(seq) => Some(Self::Expunged(MessageId::Seq(seq))),
            UntaggedResponse::Fetch { seq, items } => {
                let mut uid = None;
                let mut flags = None;
                for item in items {
                    match item {
                        mailsync_imap::FetchItem::Uid(u) => uid = Some(u),
                        mailsync_imap::FetchItem::Flags(f) => flags = Some(f),
                        _ => {}
                    }
                }
                Self::from_idle(IdleEvent::Fetch { seq, uid, flags })
            }
            _ => None,
        }
    }
}

/// Lifecycle of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WatchState {
    /// Waiting in IDLE.
    Idle,
    /// Polling with NOOP; the server lacks IDLE.
    Polling,
    /// Waiting out a backoff delay or reconnecting.
    Reconnecting,
    /// The connection failed.
    Failed,
    /// Stopped by the caller.
    Stopped,
}

impl WatchState {
    /// Returns true once the watcher task has ended or is about to.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        })
    }
}

/// Receives watch events.
///
/// Called from the watcher task; a slow handler delays reading from the
/// server.
pub trait WatchHandler: Send + 'static {
    /// A change was observed.
    fn on_event(&mut self, event: WatchEvent);

    /// The watcher failed, or a reconnect attempt did.
    fn on_error(&mut self, error: &Error) {
        let _ = error;
    }
}

impl<F> WatchHandler for F
where
    F: FnMut(WatchEvent) + Send + 'static,
{
    fn on_event(&mut self, event: WatchEvent) {
        (*self)(event);
    }
}

/// Future returned by [`Reconnect::reconnect`].
pub type ReconnectFuture<S> = Pin<Box<dyn Future<Output = Result<Session<S>>> + Send>>;

/// Produces a fresh authenticated session after a failure.
pub trait Reconnect<S>: Send + Sync {
    /// Connects and authenticates. The watcher selects the folder itself.
    fn reconnect(&self) -> ReconnectFuture<S>;
}

impl<S, F, Fut> Reconnect<S> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Session<S>>> + Send + 'static,
{
    fn reconnect(&self) -> ReconnectFuture<S> {
        Box::pin(self())
    }
}

/// Reconnects through a [`SessionManager`] with stored credentials.
#[derive(Debug, Clone)]
pub struct Reconnector {
    manager: SessionManager,
    host: String,
    credential: Arc<dyn Credential>,
}

impl Reconnector {
    /// Reconnects to `host` and authenticates with `credential`.
    pub fn new(
        manager: SessionManager,
        host: impl Into<String>,
        credential: Arc<dyn Credential>,
    ) -> Self {
        Self {
            manager,
            host: host.into(),
            credential,
        }
    }
}

impl Reconnect<ImapStream> for Reconnector {
    fn reconnect(&self) -> ReconnectFuture<ImapStream> {
        let manager = self.manager.clone();
        let host = self.host.clone();
        let credential = Arc::clone(&self.credential);
        Box::pin(async move { manager.open(&host, credential.as_ref()).await })
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends NOOP and returns the changes the server reported.
    pub async fn poll(&mut self) -> Result<Vec<WatchEvent>> {
        let limit = self.io_limit();
        let client = self.selected_client(Operation::Idle)?;
        match timed(limit, client.poll()).await {
            Ok(updates) => Ok(updates
                .into_iter()
                .filter_map(WatchEvent::from_untagged)
                .collect()),
            Err(error) => Err(self.fail(Operation::Idle, error)),
        }
    }

    fn supports_idle(&self) -> bool {
        self.capabilities().is_some_and(Capabilities::supports_idle)
    }
}

/// Starts watching with a default configuration and no reconnection.
pub fn watch<S, H>(session: Session<S>, handler: H) -> Handle<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: WatchHandler,
{
    IdleWatcher::new(WatchConfig::new()).watch(session, handler)
}

/// Configures and starts watchers.
pub struct IdleWatcher<S> {
    config: WatchConfig,
    reconnect: Option<Arc<dyn Reconnect<S>>>,
}

impl<S> fmt::Debug for IdleWatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleWatcher")
            .field("config", &self.config)
            .field("reconnect", &self.reconnect.is_some())
            .finish()
    }
}

impl<S> IdleWatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// A watcher that gives up on the first failure.
    #[must_use]
    pub const fn new(config: WatchConfig) -> Self {
        Self {
            config,
            reconnect: None,
        }
    }

    /// Recovers from failures through `reconnect`, as the policy allows.
    #[must_use]
    pub fn reconnect(mut self, reconnect: impl Reconnect<S> + 'static) -> Self {
        self.reconnect = Some(Arc::new(reconnect));
        self
    }

    /// Watches the folder `session` has selected.
    ///
    /// A session that is not selected leaves the watcher
    /// [`Failed`](WatchState::Failed) straight away, with the error passed
    /// to the handler.
    pub fn watch<H: WatchHandler>(&self, session: Session<S>, handler: H) -> Handle<S> {
        let selection = session
            .selected()
            .map(|selected| (selected.mailbox().to_string(), selected.is_read_only()));
        let initial = match &selection {
            Some(_) if session.supports_idle() => WatchState::Idle,
            Some(_) => WatchState::Polling,
            None => WatchState::Failed,
        };
        let (state_tx, state_rx) = watch::channel(initial);
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(
            Watcher {
                session,
                selection,
                config: self.config,
                reconnect: self.reconnect.clone(),
                handler,
                state: state_tx,
                stop: stop_rx,
                stopping: false,
                failures: 0,
            }
            .run(),
        );

        Handle {
            stop: Some(stop_tx),
            state: state_rx,
            task,
            grace: self.config.grace_period,
        }
    }
}

/// Controls a running watcher.
///
/// Dropping the handle stops the watcher; the session is dropped with it.
pub struct Handle<S> {
    stop: Option<oneshot::Sender<()>>,
    state: watch::Receiver<WatchState>,
    task: JoinHandle<Session<S>>,
    grace: Duration,
}

impl<S> fmt::Debug for Handle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("state", &*self.state.borrow())
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl<S> Handle<S> {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// A receiver for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    /// Stops the watcher and returns the session.
    ///
    /// Waits at most the configured grace period. After a clean stop the
    /// session is selected on the watched folder; after an unrecovered
    /// failure it is closed. If the watcher does not finish in time it is
    /// aborted and the session is lost.
    pub async fn stop(mut self) -> Result<Session<S>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(joined) => Ok(joined?),
            Err(_) => {
                warn!(grace = ?self.grace, "watcher did not stop in time, aborting");
                self.task.abort();
                Err(Error::IdleTransport(mailsync_imap::Error::Timeout(
                    self.grace,
                )))
            }
        }
    }
}

/// How a watch cycle ended without error.
enum Flow {
    Stopped,
}

enum Recovery {
    Recovered,
    Stopped,
    GaveUp,
}

struct Watcher<S, H> {
    session: Session<S>,
    selection: Option<(String, bool)>,
    config: WatchConfig,
    reconnect: Option<Arc<dyn Reconnect<S>>>,
    handler: H,
    state: watch::Sender<WatchState>,
    stop: oneshot::Receiver<()>,
    stopping: bool,
    /// Reconnect attempts since the session last proved healthy.
    failures: u32,
}

impl<S, H> Watcher<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: WatchHandler,
{
    fn set(&self, state: WatchState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "watch state changed");
        }
    }

    async fn run(mut self) -> Session<S> {
        let Some((folder, _)) = self.selection.clone() else {
            let error = Error::InvalidState {
                op: Operation::Idle,
                state: self.session.state(),
            };
            warn!(%error, "nothing to watch");
            self.set(WatchState::Failed);
            self.handler.on_error(&error);
            return self.session;
        };

        loop {
            let cycle = if self.session.supports_idle() {
                self.idle(&folder).await
            } else {
                self.poll(&folder).await
            };
            let error = match cycle {
                Ok(Flow::Stopped) => {
                    self.set(WatchState::Stopped);
                    info!(%folder, "watch stopped");
                    return self.session;
                }
                Err(error) => error,
            };

            warn!(%folder, %error, "watch failed");
            self.set(WatchState::Failed);
            self.handler.on_error(&error);
            if self.stopping {
                return self.session;
            }
            match self.recover(&folder).await {
                Recovery::Recovered => info!(%folder, "watch resumed"),
                Recovery::Stopped => {
                    self.set(WatchState::Stopped);
                    return self.session;
                }
                Recovery::GaveUp => {
                    self.set(WatchState::Failed);
                    return self.session;
                }
            }
        }
    }

    /// Runs IDLE until stopped or failed, renewing it periodically.
    async fn idle(&mut self, folder: &str) -> Result<Flow> {
        self.set(WatchState::Idle);
        let limit = self.session.io_limit();
        let renewal = self.config.idle_renewal;

        loop {
            let client = self.session.selected_client(Operation::Idle)?;
            let mut handle = match timed(limit, client.idle()).await {
                Ok(handle) => handle,
                Err(error) => return Err(self.session.fail(Operation::Idle, error)),
            };
            debug!(%folder, "entered IDLE");

            let stop_requested = loop {
                let outcome = tokio::select! {
                    _ = &mut self.stop => None,
                    event = handle.wait(renewal) => Some(event),
                };
                match outcome {
                    None => break true,
                    Some(Ok(IdleEvent::Timeout)) => break false,
                    Some(Ok(event)) => {
                        if let Some(event) = WatchEvent::from_idle(event) {
                            self.failures = 0;
                            self.handler.on_event(event);
                        }
                    }
                    Some(Err(error)) => {
                        drop(handle);
                        return Err(self.session.fail(Operation::Idle, error));
                    }
                }
            };

            if stop_requested {
                self.stopping = true;
            }
            let done = timed(limit, handle.done()).await;
            if let Err(error) = done {
                return Err(self.session.fail(Operation::Idle, error));
            }
            debug!(%folder, "left IDLE");
            if stop_requested {
                return Ok(Flow::Stopped);
            }
            self.failures = 0;
        }
    }

    /// Polls with NOOP until stopped or failed.
    async fn poll(&mut self, folder: &str) -> Result<Flow> {
        self.set(WatchState::Polling);
        debug!(%folder, interval = ?self.config.poll_interval, "polling");
        loop {
            tokio::select! {
                _ = &mut self.stop => {
                    self.stopping = true;
                    return Ok(Flow::Stopped);
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
            let events = self.session.poll().await?;
            self.failures = 0;
            for event in events {
                self.handler.on_event(event);
            }
        }
    }

    /// Reconnects and re-selects, backing off between attempts.
    ///
    /// Attempts count across cycles. The count resets only after the
    /// session delivers an event or completes an IDLE renewal or a poll.
    async fn recover(&mut self, folder: &str) -> Recovery {
        let policy = self.config.reconnect;
        let reconnect = match &self.reconnect {
            Some(reconnect) if policy.enabled => Arc::clone(reconnect),
            _ => return Recovery::GaveUp,
        };
        let read_only = self.selection.as_ref().is_some_and(|(_, read_only)| *read_only);
        self.session.logout().await;

        while self.failures < policy.backoff.max_attempts {
            self.failures += 1;
            let attempt = self.failures;
            let delay = policy.backoff.delay(attempt);
            self.set(WatchState::Reconnecting);
            info!(%folder, attempt, ?delay, "reconnecting after backoff");

            let reopened = tokio::select! {
                _ = &mut self.stop => {
                    self.stopping = true;
                    return Recovery::Stopped;
                }
                reopened = reopen(reconnect.as_ref(), delay, folder, read_only) => reopened,
            };
            match reopened {
                Ok(session) => {
                    self.session = session;
                    return Recovery::Recovered;
                }
                Err(error) => {
                    warn!(%folder, attempt, %error, "reconnect attempt failed");
                    self.handler.on_error(&error);
                }
            }
        }
        warn!(%folder, attempts = policy.backoff.max_attempts, "giving up on reconnecting");
        Recovery::GaveUp
    }
}

async fn reopen<S>(
    reconnect: &dyn Reconnect<S>,
    delay: Duration,
    folder: &str,
    read_only: bool,
) -> Result<Session<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::sleep(delay).await;
    let mut session = reconnect.reconnect().await?;
    if let Err(error) = session.select(folder, read_only).await {
        session.logout().await;
        return Err(error);
    }
    Ok(session)
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
    use mailsync_imap::{Flag, SeqNum, Uid};
    use tokio::sync::mpsc;
    use tokio_test::io::{Builder, Mock};

    async fn selected(mock: Mock) -> Session<Mock> {
        let mut session = Session::from_stream(mock).await.unwrap();
        session
            .authenticate(&PlainCredential::new("ann", "secret"))
            .await
            .unwrap();
        session.select("INBOX", true).await.unwrap();
        session
    }

    fn events() -> (
        impl FnMut(WatchEvent) + Send + 'static,
        mpsc::UnboundedReceiver<WatchEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |event| {
                let _ = tx.send(event);
            },
            rx,
        )
    }

    mod event_tests {
        use super::*;

        #[test]
        fn test_idle_events() {
            let seq = SeqNum::new(3).unwrap();
            assert_eq!(
                WatchEvent::from_idle(IdleEvent::Exists(4)),
                Some(WatchEvent::CountChanged(4))
            );
            assert_eq!(
                WatchEvent::from_idle(IdleEvent::Expunge(seq)),
                Some(WatchEvent::Expunged(MessageId::Seq(seq)))
            );
            assert_eq!(WatchEvent::from_idle(IdleEvent::Recent(1)), None);
            assert_eq!(WatchEvent::from_idle(IdleEvent::Timeout), None);
        }

        #[test]
        fn test_flag_change_prefers_uid() {
            let seq = SeqNum::new(3).unwrap();
            let uid = Uid::new(30).unwrap();
            let mut flags = Flags::new();
            flags.insert(Flag::Seen);
            let event = WatchEvent::from_idle(IdleEvent::Fetch {
                seq,
                uid: Some(uid),
                flags: Some(flags.clone()),
            });
            assert_eq!(
                event,
                Some(WatchEvent::FlagsChanged {
                    id: MessageId::Uid(uid),
                    flags: Some(flags),
                })
            );
        }

        #[test]
        fn test_state_display() {
            assert_eq!(WatchState::Reconnecting.to_string(), "reconnecting");
            assert!(WatchState::Stopped.is_terminal());
            assert!(!WatchState::Polling.is_terminal());
        }
    }

    mod watcher_tests {
        use super::*;

        #[tokio::test]
        async fn test_idle_events_then_stop() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] ok\r\n")
                .write(b"A0001 EXAMINE INBOX\r\n")
                .read(b"* 3 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n")
                .write(b"A0002 IDLE\r\n")
                .read(b"+ idling\r\n")
                .read(b"* 4 EXISTS\r\n")
                .read(b"* 2 EXPUNGE\r\n")
                .write(b"DONE\r\n")
                .read(b"A0002 OK IDLE terminated\r\n")
                .build();
            let session = selected(mock).await;
            let (handler, mut rx) = events();

            let handle = watch(session, handler);
            assert_eq!(rx.recv().await, Some(WatchEvent::CountChanged(4)));
            assert_eq!(
                rx.recv().await,
                Some(WatchEvent::Expunged(MessageId::Seq(SeqNum::new(2).unwrap())))
            );
            assert_eq!(handle.state(), WatchState::Idle);

            let session = handle.stop().await.unwrap();
            assert_eq!(session.state(), SessionState::Selected);
            assert_eq!(session.selected().unwrap().status().exists, 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_polls_without_idle() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
                .write(b"A0001 EXAMINE INBOX\r\n")
                .read(b"* 3 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n")
                .write(b"A0002 NOOP\r\n")
                .read(b"* 5 EXISTS\r\nA0002 OK done\r\n")
                .build();
            let session = selected(mock).await;
            let (handler, mut rx) = events();

            let handle = IdleWatcher::new(WatchConfig::new().poll_interval(Duration::from_secs(30)))
                .watch(session, handler);
            assert_eq!(handle.state(), WatchState::Polling);
            assert_eq!(rx.recv().await, Some(WatchEvent::CountChanged(5)));

            let session = handle.stop().await.unwrap();
            assert_eq!(session.state(), SessionState::Selected);
        }

        #[tokio::test]
        async fn test_unselected_session_fails() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n")
                .build();
            let session = Session::from_stream(mock).await.unwrap();
            let (handler, _rx) = events();

            let handle = watch(session, handler);
            assert_eq!(handle.state(), WatchState::Failed);
            let session = handle.stop().await.unwrap();
            assert_eq!(session.state(), SessionState::NotAuthenticated);
        }

        #[tokio::test]
        async fn test_server_bye_fails_without_reconnect() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n")
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] ok\r\n")
                .write(b"A0001 EXAMINE INBOX\r\n")
                .read(b"* 3 EXISTS\r\nA0001 OK [READ-ONLY] done\r\n")
                .write(b"A0002 IDLE\r\n")
                .read(b"+ idling\r\n")
                .read(b"* BYE shutting down\r\n")
                .build();
            let session = selected(mock).await;

            struct Recorder(mpsc::UnboundedSender<String>);
            impl WatchHandler for Recorder {
                fn on_event(&mut self, _event: WatchEvent) {}
                fn on_error(&mut self, error: &Error) {
                    let _ = self.0.send(error.to_string());
                }
            }
            let (tx, mut errors) = mpsc::unbounded_channel();
            let handle = IdleWatcher::new(WatchConfig::new()).watch(session, Recorder(tx));

            let reported = errors.recv().await.unwrap();
            assert!(reported.contains("IDLE transport failed"), "{reported}");
            let mut states = handle.subscribe();
            states
                .wait_for(|state| *state == WatchState::Failed)
                .await
                .unwrap();
            let session = handle.stop().await.unwrap();
            assert!(session.is_closed());
        }
    }
}
