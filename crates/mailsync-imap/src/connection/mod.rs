//! IMAP connection management.
//!
//! This module provides:
//! - Configuration (host, port, security mode)
//! - TLS/plaintext stream abstraction
//! - Cancellation-safe framed I/O
//! - Type-state connection wrapper
//! - IDLE support

mod client;
mod config;
mod framed;
mod idle;
mod stream;

pub use client::{
    Authenticated, Client, FetchResponses, LoggedIn, NotAuthenticated, ResponseStream,
    SelectResult, Selected,
};
pub use config::{ConnectionConfig, Security};
pub use framed::{FramedStream, ResponseAccumulator};
pub use idle::{IdleEvent, IdleHandle};
pub use stream::{ImapStream, tls_connector};

use crate::{Error, Result};

/// Opens a connection and reads the greeting, upgrading with STARTTLS
/// when the configuration asks for it.
///
/// The whole sequence is bounded by `config.connect_timeout`.
///
/// # Errors
///
/// Returns an error if the TCP connection, the TLS handshake, the greeting
/// or the STARTTLS exchange fails, or the deadline passes.
pub async fn connect(config: &ConnectionConfig) -> Result<Client<ImapStream, NotAuthenticated>> {
    let attempt = async {
        let stream = ImapStream::open(&config.host, config.port, config.security).await?;
        let client = Client::from_stream(stream).await?;
        match config.security {
            Security::StartTls => client.starttls(&config.host).await,
            Security::Implicit | Security::None => Ok(client),
        }
    };

    tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
}
