//! The byte transport under a connection: TCP, optionally wrapped in TLS.
//!
//! Implicit TLS handshakes before the greeting; STARTTLS starts in
//! plaintext and is upgraded in place by
//! [`Client::starttls`](super::Client::starttls).

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::Security;
use crate::{Error, Result};

/// Anything a transport can delegate to.
trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// A TCP stream, with or without TLS.
pub enum ImapStream {
    /// Plaintext, before STARTTLS or for [`Security::None`].
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for ImapStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapStream")
            .field("tls", &self.is_tls())
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}

impl ImapStream {
    /// Opens a TCP connection and, for [`Security::Implicit`], completes
    /// the TLS handshake. Other modes return a plaintext stream.
    pub async fn open(host: &str, port: u16, security: Security) -> Result<Self> {
        let tcp = TcpStream::connect((host, port)).await?;
        // Commands are short lines; do not hold them back.
        tcp.set_nodelay(true)?;
        tracing::debug!(host, port, %security, "tcp connected");
        match security {
            Security::Implicit => handshake(tcp, host).await,
            Security::StartTls | Security::None => Ok(Self::Plain(tcp)),
        }
    }

    /// Upgrades a plaintext stream after a successful `STARTTLS`.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => handshake(tcp, host).await,
            Self::Tls(_) => Err(Error::Protocol("stream is already TLS".to_string())),
        }
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// The socket underneath, TLS or not.
    fn tcp(&self) -> &TcpStream {
        match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(tls) => tls.get_ref().0,
        }
    }

    fn io(self: Pin<&mut Self>) -> Pin<&mut dyn Io> {
        match self.get_mut() {
            Self::Plain(tcp) => Pin::new(tcp as &mut dyn Io),
            Self::Tls(tls) => Pin::new(&mut **tls as &mut dyn Io),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.io().poll_read(cx, buf)
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.io().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.io().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.io().poll_shutdown(cx)
    }
}

/// A connector trusting the Mozilla root set.
#[must_use]
pub fn tls_connector() -> TlsConnector {
    let roots: rustls::RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn handshake(tcp: TcpStream, host: &str) -> Result<ImapStream> {
    let name = ServerName::try_from(host.to_owned())?;
    let tls = tls_connector().connect(name, tcp).await?;
    tracing::debug!(host, "tls established");
    Ok(ImapStream::Tls(Box::new(tls)))
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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_invalid_server_name() {
        assert!(ServerName::try_from("not a host".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let error = ImapStream::open("127.0.0.1", port, Security::None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_plain_stream_carries_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"* OK ready\r\n").await.unwrap();
            let mut line = [0u8; 9];
            socket.read_exact(&mut line).await.unwrap();
            line
        });

        let mut stream = ImapStream::open("127.0.0.1", port, Security::StartTls)
            .await
            .unwrap();
        assert!(!stream.is_tls());
        assert!(format!("{stream:?}").contains("127.0.0.1"));

        let mut greeting = [0u8; 12];
        stream.read_exact(&mut greeting).await.unwrap();
        assert_eq!(&greeting, b"* OK ready\r\n");
        stream.write_all(b"A1 NOOP\r\n").await.unwrap();
        stream.flush().await.unwrap();
        assert_eq!(&server.await.unwrap(), b"A1 NOOP\r\n");
    }
}
