//! # mailsync-core
//!
//! Client-side mail synchronization engine.
//!
//! This crate provides:
//! - **Sessions**: connection with a TLS fallback ladder, authentication
//!   through `mailsync_auth::Credential`, idempotent logout
//! - **Folders**: lazy enumeration, STATUS, read-only or read-write selection
//! - **Search**: composable criteria; exclusions evaluated as set differences
//! - **Fetch**: a producer task streaming messages through a bounded queue
//! - **Flags**: STORE with add/remove/replace semantics
//! - **Watching**: IDLE or NOOP polling with reconnect and backoff
//! - **Sync**: select, search a date window, fetch and MIME-decode a folder
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_auth::PlainCredential;
//! use mailsync_core::{FetchConfig, FetchSpec, SearchCriteria, SessionManager, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> mailsync_core::Result<()> {
//!     let manager = SessionManager::new(TransportConfig::new());
//!     let credential = PlainCredential::new("user@example.com", "password");
//!     let mut session = manager.open("imap.example.com", &credential).await?;
//!
//!     session.select("INBOX", true).await?;
//!     let uids = session.search_uids(&SearchCriteria::sent_within(30)).await?;
//!
//!     let mut stream = session.fetch(&uids, &FetchSpec::full(), &FetchConfig::new());
//!     while let Some(message) = stream.next().await {
//!         let message = message?;
//!         println!("{}: {:?}", message.id, message.subject());
//!     }
//!
//!     let mut session = stream.finish().await?;
//!     session.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! A session is used by one operation at a time. Fetching and watching
//! take the session by value and hand it back when they finish.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod fetch;
pub mod ids;
pub mod mailbox;
pub mod search;
pub mod session;
pub mod store;
pub mod sync;
pub mod watch;

pub use config::{
    Backoff, FallbackPolicy, FetchConfig, ReconnectPolicy, SyncConfig, TransportConfig,
    WatchConfig,
};
pub use error::{Error, Operation, Result, SelectFailure};
pub use fetch::{FetchBatch, FetchSpec, FetchStream, FetchedMessage, ItemKind};
pub use ids::{IdKind, IdSet, MessageId};
pub use mailbox::{Folder, FolderList, FolderRole, FolderStatus};
pub use search::SearchCriteria;
pub use session::{Session, SessionManager, SessionState};
pub use store::FlagOperation;
pub use sync::{FolderSync, SyncedMessage, sync_all, sync_folder};
pub use watch::{
    Handle, IdleWatcher, Reconnect, ReconnectFuture, Reconnector, WatchEvent, WatchHandler,
    WatchState, watch,
};
