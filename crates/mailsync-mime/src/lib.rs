//! # mailsync-mime
//!
//! Tolerant MIME decoder for message bodies fetched by the sync engine.
//!
//! ## Features
//!
//! - **Streaming decomposition**: nested multipart entities are flattened
//!   into a sequence of leaf parts, one per [`Reader::next_part`] call
//! - **Classification**: each leaf is [`MimePart::Inline`] or
//!   [`MimePart::Attachment`]; content types are exposed verbatim
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words,
//!   RFC 2231 parameters, and charsets via `encoding_rs`
//! - **Tiered errors**: unknown charsets and broken structure are recorded
//!   as [`Reader::warnings`]; only undecodable content is fatal
//!
//! ## Quick Start
//!
//! ```
//! use mailsync_mime::MimePart;
//!
//! let raw = concat!(
//!     "From: Ann <ann@example.com>\r\n",
//!     "Subject: Report\r\n",
//!     "Content-Type: multipart/mixed; boundary=sep\r\n",
//!     "\r\n",
//!     "--sep\r\n",
//!     "Content-Type: text/plain; charset=utf-8\r\n",
//!     "\r\n",
//!     "See attached.\r\n",
//!     "--sep\r\n",
//!     "Content-Type: text/csv\r\n",
//!     "Content-Disposition: attachment; filename=\"q3.csv\"\r\n",
//!     "\r\n",
//!     "a,b\r\n",
//!     "--sep--\r\n",
//! );
//!
//! let mut reader = mailsync_mime::open(raw.as_bytes().to_vec())?;
//! assert_eq!(reader.header().subject.as_deref(), Some("Report"));
//!
//! while let Some(part) = reader.next_part()? {
//!     match part {
//!         MimePart::Inline { body, .. } => assert_eq!(body.text(), Some("See attached.")),
//!         MimePart::Attachment { filename, .. } => assert_eq!(filename.as_deref(), Some("q3.csv")),
//!     }
//! }
//! # Ok::<(), mailsync_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod part;
mod reader;

pub mod charset;
pub mod encoding;

pub use address::{Address, parse_address_list};
pub use content_type::{ContentDisposition, ContentType, DispositionKind};
pub use encoding::TransferEncoding;
pub use error::{Error, Result, Tier};
pub use header::{Headers, MessageHeader};
pub use part::{MimePart, PartBody, PartHeader};
pub use reader::{MAX_DEPTH, Reader, open};
