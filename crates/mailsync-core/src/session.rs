//! Sessions and connection establishment.
//!
//! A [`Session`] owns one IMAP connection and knows which protocol state it
//! is in. The type-state client underneath consumes itself on every state
//! change; the session keeps whichever client is current and swaps it on
//! each transition, so callers hold a single value for the connection's
//! whole life.
//!
//! A session is closed for good after logout, after a rejected login, and
//! after any error that leaves the connection in an unknown state.

#![allow(clippy::missing_errors_doc)]

use std::fmt;
use std::future::Future;
use std::time::Duration;

use mailsync_auth::Credential;
use mailsync_imap::{
    Authenticated, Capabilities, Client, ConnectionConfig, ImapStream, NotAuthenticated, Security,
    Selected,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Error, Operation, Result};

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// Connected, greeting read.
    NotAuthenticated,
    /// Logged in, no folder selected.
    Authenticated,
    /// A folder is selected.
    Selected,
    /// Closed; nothing more can be done with this session.
    Logout,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotAuthenticated => "not-authenticated",
            Self::Authenticated => "authenticated",
            Self::Selected => "selected",
            Self::Logout => "logout",
        })
    }
}

/// The client in whatever state it currently is.
pub(crate) enum Connection<S> {
    NotAuthenticated(Client<S, NotAuthenticated>),
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>),
    Closed,
}

impl<S> Connection<S> {
    pub(crate) const fn state(&self) -> SessionState {
        match self {
            Self::NotAuthenticated(_) => SessionState::NotAuthenticated,
            Self::Authenticated(_) => SessionState::Authenticated,
            Self::Selected(_) => SessionState::Selected,
            Self::Closed => SessionState::Logout,
        }
    }
}

/// One IMAP connection and its protocol state.
///
/// A session serves one command flow at a time. Components that need it
/// for longer, a fetch stream or an IDLE watch, take it by value and hand
/// it back when they finish.
pub struct Session<S = ImapStream> {
    pub(crate) conn: Connection<S>,
    security: Option<Security>,
    io_timeout: Option<Duration>,
}

impl<S> fmt::Debug for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Session");
        debug
            .field("state", &self.conn.state())
            .field("security", &self.security);
        if let Connection::Selected(client) = &self.conn {
            debug.field("mailbox", &client.state().mailbox());
        }
        debug.finish_non_exhaustive()
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a freshly connected client.
    #[must_use]
    pub const fn new(client: Client<S, NotAuthenticated>) -> Self {
        Self {
            conn: Connection::NotAuthenticated(client),
            security: None,
            io_timeout: None,
        }
    }

    /// Reads the greeting from an already connected stream.
    pub async fn from_stream(stream: S) -> Result<Self> {
        Client::from_stream(stream)
            .await
            .map(Self::new)
            .map_err(|source| Error::Connection {
                op: Operation::Connect,
                source,
            })
    }

    /// Bounds every command by `timeout`. A command that overruns closes
    /// the session.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    const fn with_security(mut self, security: Security) -> Self {
        self.security = Some(security);
        self
    }

    /// Returns the current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.conn.state()
    }

    /// Returns true once the session is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.conn, Connection::Closed)
    }

    /// Returns the transport security negotiated by the connection
    /// manager, or `None` for sessions built from a raw stream.
    #[must_use]
    pub const fn security(&self) -> Option<Security> {
        self.security
    }

    /// Returns the capabilities the server last advertised.
    ///
    /// Missing capabilities are not an error; callers decide what to do
    /// without, e.g. poll instead of IDLE.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&Capabilities> {
        match &self.conn {
            Connection::NotAuthenticated(client) => Some(client.capabilities()),
            Connection::Authenticated(client) => Some(client.capabilities()),
            Connection::Selected(client) => Some(client.capabilities()),
            Connection::Closed => None,
        }
    }

    /// Returns the selected folder's state, if one is selected.
    #[must_use]
    pub const fn selected(&self) -> Option<&Selected> {
        match &self.conn {
            Connection::Selected(client) => Some(client.state()),
            _ => None,
        }
    }

    /// Queries CAPABILITY again.
    pub async fn refresh_capabilities(&mut self) -> Result<&Capabilities> {
        let limit = self.io_timeout;
        let result = match &mut self.conn {
            Connection::NotAuthenticated(client) => {
                timed(limit, client.capability()).await.map(|_| ())
            }
            Connection::Authenticated(client) => {
                timed(limit, client.capability()).await.map(|_| ())
            }
            Connection::Selected(client) => {
                timed(limit, client.capability()).await.map(|_| ())
            }
            Connection::Closed => {
                return Err(Error::InvalidState {
                    op: Operation::Connect,
                    state: SessionState::Logout,
                });
            }
        };
        if let Err(error) = result {
            return Err(self.fail(Operation::Connect, error));
        }
        self.capabilities().ok_or(Error::InvalidState {
            op: Operation::Connect,
            state: SessionState::Logout,
        })
    }

    /// Authenticates with a password or bearer credential.
    ///
    /// On rejection the session is closed; a new connection is needed to
    /// try again.
    pub async fn authenticate(&mut self, credential: &dyn Credential) -> Result<()> {
        let client = match std::mem::replace(&mut self.conn, Connection::Closed) {
            Connection::NotAuthenticated(client) => client,
            other => {
                let state = other.state();
                self.conn = other;
                return Err(Error::InvalidState {
                    op: Operation::Authenticate,
                    state,
                });
            }
        };

        let mechanism = credential.mechanism();
        match timed(self.io_timeout, client.authenticate(credential)).await {
            Ok(client) => {
                info!(%mechanism, "session authenticated");
                self.conn = Connection::Authenticated(client);
                Ok(())
            }
            Err(error) => {
                warn!(%mechanism, %error, "authentication failed, session discarded");
                Err(Error::from_imap(Operation::Authenticate, error))
            }
        }
    }

    /// Logs out and closes the connection.
    ///
    /// Safe to call on a session that is already closed, and never fails:
    /// the connection is gone afterwards either way.
    pub async fn logout(&mut self) {
        let limit = self.io_timeout;
        let result = match std::mem::replace(&mut self.conn, Connection::Closed) {
            Connection::NotAuthenticated(client) => timed(limit, client.logout()).await,
            Connection::Authenticated(client) => timed(limit, client.logout()).await,
            Connection::Selected(client) => timed(limit, client.logout()).await,
            Connection::Closed => {
                debug!("logout on a closed session");
                return;
            }
        };
        match result {
            Ok(()) => debug!("logged out"),
            Err(error) => debug!(%error, "error during logout"),
        }
    }

    /// Moves the connection out, leaving this session closed.
    pub(crate) fn take(&mut self) -> Self {
        Self {
            conn: std::mem::replace(&mut self.conn, Connection::Closed),
            security: self.security,
            io_timeout: self.io_timeout,
        }
    }

    /// Returns the selected client, or the reason there is none.
    pub(crate) fn selected_client(&mut self, op: Operation) -> Result<&mut Client<S, Selected>> {
        match &mut self.conn {
            Connection::Selected(client) => Ok(client),
            other => Err(Error::InvalidState {
                op,
                state: other.state(),
            }),
        }
    }

    /// Per-command deadline.
    pub(crate) const fn io_limit(&self) -> Option<Duration> {
        self.io_timeout
    }

    /// Classifies a client error, closing the session if the connection
    /// can no longer be trusted.
    pub(crate) fn fail(&mut self, op: Operation, error: mailsync_imap::Error) -> Error {
        let error = Error::from_imap(op, error);
        if error.is_session_lost() && !self.is_closed() {
            warn!(%op, %error, "session lost");
            self.conn = Connection::Closed;
        }
        error
    }
}

/// Runs a client future under an optional deadline.
pub(crate) async fn timed<T>(
    limit: Option<Duration>,
    future: impl Future<Output = mailsync_imap::Result<T>>,
) -> mailsync_imap::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| mailsync_imap::Error::Timeout(limit))?,
        None => future.await,
    }
}

/// Opens sessions according to a [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    config: TransportConfig,
}

impl SessionManager {
    /// Creates a manager.
    #[must_use]
    pub const fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Transports to try, most secure first.
    fn attempts(&self) -> Vec<(Security, u16)> {
        let mut attempts = vec![(Security::Implicit, self.config.implicit_tls_port)];
        if self.config.fallback.allows_starttls() {
            attempts.push((Security::StartTls, self.config.plain_port));
        }
        if self.config.fallback.allows_plaintext() {
            attempts.push((Security::None, self.config.plain_port));
        }
        attempts
    }

    /// Connects to `host`.
    ///
    /// Implicit TLS is tried first. STARTTLS and then plaintext follow only
    /// when the fallback policy allows them; each step down is logged as a
    /// warning. Connection failures are not retried beyond that ladder.
    pub async fn connect(&self, host: &str) -> Result<Session> {
        let mut last_error = None;

        for (attempt, (security, port)) in self.attempts().into_iter().enumerate() {
            if attempt > 0 {
                warn!(host, port, %security, "falling back to a less secure transport");
            }
            debug!(host, port, %security, "connecting");

            let config = ConnectionConfig::new(host)
                .security(security)
                .port(port)
                .connect_timeout(self.config.connect_timeout);
            match mailsync_imap::connect(&config).await {
                Ok(client) => {
                    if security.is_plaintext() {
                        warn!(host, port, "connected without encryption");
                    }
                    info!(host, port, %security, "connected");
                    return Ok(Session::new(client)
                        .with_security(security)
                        .with_io_timeout(self.config.io_timeout));
                }
                Err(error) => {
                    warn!(host, port, %security, %error, "connection attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(Error::Connection {
            op: Operation::Connect,
            source: last_error.unwrap_or(mailsync_imap::Error::Closed),
        })
    }

    /// Connects to `host` and authenticates.
    pub async fn open(&self, host: &str, credential: &dyn Credential) -> Result<Session> {
        let mut session = self.connect(host).await?;
        session.authenticate(credential).await?;
        Ok(session)
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
    use mailsync_auth::PlainCredential;
    use mailsync_imap::Capability;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN] ready\r\n";

    mod lifecycle_tests {
        use super::*;

        #[tokio::test]
        async fn test_authenticate_then_logout_twice() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1 IDLE] logged in\r\n")
                .write(b"A0001 LOGOUT\r\n")
                .read(b"* BYE bye\r\nA0001 OK done\r\n")
                .build();

            let mut session = Session::from_stream(mock).await.unwrap();
            assert_eq!(session.state(), SessionState::NotAuthenticated);
            assert!(session.security().is_none());

            session
                .authenticate(&PlainCredential::new("ann", "secret"))
                .await
                .unwrap();
            assert_eq!(session.state(), SessionState::Authenticated);
            assert!(session.capabilities().unwrap().supports_idle());

            session.logout().await;
            assert_eq!(session.state(), SessionState::Logout);
            assert!(session.capabilities().is_none());
            session.logout().await;
            assert!(session.is_closed());
        }

        #[tokio::test]
        async fn test_rejected_login_discards_session() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"A0000 LOGIN ann wrong\r\n")
                .read(b"A0000 NO [AUTHENTICATIONFAILED] nope\r\n")
                .build();

            let mut session = Session::from_stream(mock).await.unwrap();
            let error = session
                .authenticate(&PlainCredential::new("ann", "wrong"))
                .await
                .unwrap_err();
            assert!(matches!(error, Error::Auth(_)));
            assert_eq!(session.state(), SessionState::Logout);
        }

        #[tokio::test]
        async fn test_authenticate_twice_is_invalid() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"A0000 LOGIN ann secret\r\n")
                .read(b"A0000 OK [CAPABILITY IMAP4rev1] ok\r\n")
                .build();

            let mut session = Session::from_stream(mock).await.unwrap();
            let credential = PlainCredential::new("ann", "secret");
            session.authenticate(&credential).await.unwrap();
            let error = session.authenticate(&credential).await.unwrap_err();
            assert!(matches!(
                error,
                Error::InvalidState {
                    op: Operation::Authenticate,
                    state: SessionState::Authenticated
                }
            ));
            assert_eq!(session.state(), SessionState::Authenticated);
        }

        #[tokio::test]
        async fn test_missing_capability_is_not_an_error() {
            let mock = Builder::new()
                .read(b"* OK hi\r\n")
                .write(b"A0000 CAPABILITY\r\n")
                .read(b"* CAPABILITY IMAP4rev1\r\nA0000 OK done\r\n")
                .build();

            let mut session = Session::from_stream(mock).await.unwrap();
            assert!(session.capabilities().unwrap().is_empty());
            let caps = session.refresh_capabilities().await.unwrap();
            assert!(caps.has(&Capability::Imap4Rev1));
            assert!(!caps.supports_idle());
        }

        #[tokio::test]
        async fn test_bye_greeting_is_connection_error() {
            let mock = Builder::new().read(b"* BYE busy\r\n").build();
            let error = Session::from_stream(mock).await.unwrap_err();
            assert!(matches!(
                error,
                Error::Connection {
                    op: Operation::Connect,
                    ..
                }
            ));
        }
    }

    mod manager_tests {
        use super::*;
        use crate::config::FallbackPolicy;
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        async fn closed_port() -> u16 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        }

        #[test]
        fn test_attempt_order() {
            let manager = SessionManager::new(
                TransportConfig::new()
                    .plain_port(1143)
                    .fallback(FallbackPolicy::AllowPlaintext),
            );
            assert_eq!(
                manager.attempts(),
                vec![
                    (Security::Implicit, 993),
                    (Security::StartTls, 1143),
                    (Security::None, 1143),
                ]
            );
            assert_eq!(SessionManager::default().attempts().len(), 1);
        }

        #[tokio::test]
        async fn test_implicit_only_does_not_fall_back() {
            let port = closed_port().await;
            let manager = SessionManager::new(
                TransportConfig::new()
                    .implicit_tls_port(port)
                    .plain_port(port),
            );
            let error = manager.connect("127.0.0.1").await.unwrap_err();
            assert!(matches!(
                error,
                Error::Connection {
                    op: Operation::Connect,
                    ..
                }
            ));
        }

        #[tokio::test]
        async fn test_falls_back_to_plaintext() {
            let implicit = closed_port().await;
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let plain = listener.local_addr().unwrap().port();

            let server = tokio::spawn(async move {
                // First connection: STARTTLS is refused.
                let (socket, _) = listener.accept().await.unwrap();
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                write.write_all(b"* OK [CAPABILITY IMAP4rev1] hi\r\n").await.unwrap();
                assert_eq!(lines.next_line().await.unwrap().unwrap(), "A0000 STARTTLS");
                write.write_all(b"A0000 BAD no TLS here\r\n").await.unwrap();

                // Second connection: plaintext.
                let (socket, _) = listener.accept().await.unwrap();
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                write.write_all(b"* OK [CAPABILITY IMAP4rev1] hi\r\n").await.unwrap();
                assert_eq!(lines.next_line().await.unwrap().unwrap(), "A0000 LOGOUT");
                write.write_all(b"* BYE bye\r\nA0000 OK done\r\n").await.unwrap();
            });

            let manager = SessionManager::new(
                TransportConfig::new()
                    .implicit_tls_port(implicit)
                    .plain_port(plain)
                    .fallback(FallbackPolicy::AllowPlaintext)
                    .connect_timeout(Duration::from_secs(5)),
            );
            let mut session = manager.connect("127.0.0.1").await.unwrap();
            assert_eq!(session.security(), Some(Security::None));
            assert_eq!(session.state(), SessionState::NotAuthenticated);

            session.logout().await;
            server.await.unwrap();
        }
    }
}
