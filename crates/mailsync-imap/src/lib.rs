//! # mailsync-imap
//!
//! The IMAP4rev1 (RFC 3501) client the mailsync engine is built on.
//!
//! ## Features
//!
//! - **Type-state connection management**: compile-time enforcement of valid
//!   IMAP state transitions (`NotAuthenticated` → `Authenticated` → `Selected`)
//! - **Pluggable authentication**: LOGIN or any SASL mechanism through the
//!   `mailsync_auth::Credential` trait, with continuation handling
//! - **Streaming reads**: LIST and FETCH responses are read one at a time, so
//!   a large FETCH never has to fit in memory at once
//! - **IDLE support**: push notifications via RFC 2177
//! - **TLS via rustls**: implicit TLS and STARTTLS without OpenSSL
//! - **Sans-I/O parser**: protocol parsing separated from network I/O
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_imap::command::{FetchAttribute, SearchKey};
//! use mailsync_imap::connection::{ConnectionConfig, connect};
//! use mailsync_imap::SequenceSet;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> mailsync_imap::Result<()> {
//!     let client = connect(&ConnectionConfig::new("imap.example.com")).await?;
//!     let client = client.login("user@example.com", "password").await?;
//!
//!     // EXAMINE never sets \Seen as a side effect.
//!     let mut client = client.examine("INBOX").await.map_err(|(e, _)| e)?;
//!     let uids = client.search(&SearchKey::All, true).await?;
//!
//!     let set = SequenceSet::from_numbers(uids).unwrap();
//!     let items = [FetchAttribute::Uid, FetchAttribute::Envelope];
//!     let mut responses = client.fetch(&set, &items, true).await?;
//!     while let Some((seq, items)) = responses.next().await? {
//!         println!("{seq}: {} items", items.len());
//!     }
//!
//!     if client.capabilities().supports_idle() {
//!         let mut handle = client.idle().await?;
//!         let event = handle.wait(Duration::from_secs(30)).await?;
//!         println!("{event:?}");
//!         handle.done().await?;
//!     }
//!
//!     client.logout().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── login()/authenticate() ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ─── select()/examine() ───→ Selected
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │      Selected       │ ─── close() ───→ Authenticated
//! └─────────────────────┘     select()/examine() ───→ Selected
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command types and wire encoding
//! - [`connection`]: transports, framing and the type-state client
//! - [`parser`]: sans-I/O response parser
//! - [`types`]: core IMAP types (flags, mailboxes, sequence sets, ...)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchAttribute, SearchKey, StoreMode, TagGenerator, Wire};
pub use connection::{
    Authenticated, Client, ConnectionConfig, FetchResponses, IdleEvent, IdleHandle, ImapStream,
    LoggedIn, NotAuthenticated, ResponseStream, Security, SelectResult, Selected, connect,
};
pub use error::{Error, Result};
pub use parser::{Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capabilities, Capability, Flag, Flags, ListEntry, MailboxAttribute, MailboxStatus,
    ResponseCode, SeqNum, SequenceSet, Status, StatusData, StatusItem, Tag, Uid, UidValidity,
};
