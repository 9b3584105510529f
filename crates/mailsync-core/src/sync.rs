//! Folder synchronization.
//!
//! Selects a folder, finds the messages sent within a recent window,
//! streams them and decodes each body. Failures that affect one message
//! are collected next to the results; failures that affect the session
//! end the sync.

#![allow(clippy::missing_errors_doc)]

use mailsync_mime::{MessageHeader, MimePart};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::fetch::{FetchSpec, FetchedMessage};
use crate::ids::IdKind;
use crate::mailbox::FolderStatus;
use crate::search::SearchCriteria;
use crate::session::Session;

/// A fetched and decoded message.
#[derive(Debug, Clone)]
pub struct SyncedMessage {
    /// Attributes as fetched.
    pub message: FetchedMessage,
    /// Parsed outer header.
    pub header: MessageHeader,
    /// Leaf parts in document order.
    pub parts: Vec<MimePart>,
    /// Problems the decoder tolerated.
    pub warnings: Vec<String>,
}

impl SyncedMessage {
    /// Decodes a fetched message.
    ///
    /// Recoverable decoder problems become warnings. The first fatal one
    /// fails the message with [`Error::Parse`].
    pub fn decode(message: FetchedMessage) -> Result<Self> {
        let mut reader = message.decode()?;
        let mut parts = Vec::new();
        while let Some(part) = reader.next_part()? {
            parts.push(part);
        }
        let warnings: Vec<String> = reader.warnings().iter().map(ToString::to_string).collect();
        if !warnings.is_empty() {
            debug!(id = %message.id, ?warnings, "message decoded with warnings");
        }
        Ok(Self {
            header: reader.header().clone(),
            message,
            parts,
            warnings,
        })
    }

    /// The first inline part of type `text/<subtype>`, decoded to text.
    #[must_use]
    pub fn text(&self, subtype: &str) -> Option<&str> {
        self.parts
            .iter()
            .filter(|part| !part.is_attachment())
            .find(|part| {
                let content_type = part.content_type();
                content_type.main_type.eq_ignore_ascii_case("text")
                    && content_type.sub_type.eq_ignore_ascii_case(subtype)
            })
            .and_then(|part| part.body().text())
    }

    /// Parts classified as attachments.
    pub fn attachments(&self) -> impl Iterator<Item = &MimePart> {
        self.parts.iter().filter(|part| part.is_attachment())
    }

    /// Returns true if any part is an attachment.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.attachments().next().is_some()
    }
}

/// The outcome of syncing one folder.
#[derive(Debug)]
pub struct FolderSync {
    /// Folder state after selection.
    pub status: FolderStatus,
    /// Decoded messages in server order.
    pub messages: Vec<SyncedMessage>,
    /// Messages that could not be fetched or decoded.
    pub failures: Vec<Error>,
}

/// Syncs one folder.
///
/// The session ends up with `folder` selected.
pub async fn sync_folder<S>(
    session: &mut Session<S>,
    folder: &str,
    config: &SyncConfig,
    fetch: &FetchConfig,
) -> Result<FolderSync>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let status = session.select(folder, config.read_only).await?;
    let mut outcome = FolderSync {
        status,
        messages: Vec::new(),
        failures: Vec::new(),
    };
    if outcome.status.exists == 0 {
        debug!(folder, "folder is empty");
        return Ok(outcome);
    }

    let criteria = SearchCriteria::sent_within(config.window_days);
    let uids = session.search(&criteria, IdKind::Uid).await?;
    if uids.is_empty() {
        debug!(folder, days = config.window_days, "nothing in window");
        return Ok(outcome);
    }

    let spec = FetchSpec::new().flags().uid().envelope().body_peek();
    let mut stream = session.take().fetch(&uids, &spec, fetch);
    let mut terminal = None;
    while let Some(item) = stream.next().await {
        match item.and_then(SyncedMessage::decode) {
            Ok(message) => outcome.messages.push(message),
            Err(error @ (Error::FetchItemMissing { .. } | Error::Parse(_))) => {
                warn!(folder, %error, "skipping message");
                outcome.failures.push(error);
            }
            Err(error) => terminal = Some(error),
        }
    }
    *session = stream.finish().await?;
    if let Some(error) = terminal {
        return Err(error);
    }

    info!(
        folder,
        synced = outcome.messages.len(),
        failed = outcome.failures.len(),
        "folder synced"
    );
    Ok(outcome)
}

/// Syncs every selectable folder matching the configured pattern.
///
/// A folder that cannot be selected or searched is reported and skipped;
/// losing the session ends the run.
pub async fn sync_all<S>(
    session: &mut Session<S>,
    config: &SyncConfig,
    fetch: &FetchConfig,
) -> Result<Vec<(String, Result<FolderSync>)>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let folders = session
        .list(&config.reference, &config.pattern)
        .await?
        .collect()
        .await?;

    let mut results = Vec::with_capacity(folders.len());
    for folder in folders.into_iter().filter(|folder| folder.is_selectable()) {
        match sync_folder(session, &folder.name, config, fetch).await {
            Err(error) if error.is_session_lost() => return Err(error),
            result => {
                if let Err(error) = &result {
                    warn!(folder = %folder.name, %error, "folder skipped");
                }
                results.push((folder.name, result));
            }
        }
    }
    Ok(results)
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
    use crate::ids::MessageId;
    use bytes::Bytes;
    use mailsync_imap::SeqNum;

    fn fetched(body: &'static [u8]) -> FetchedMessage {
        let seq = SeqNum::new(1).unwrap();
        let mut message = FetchedMessage {
            id: MessageId::Seq(seq),
            seq,
            uid: None,
            flags: None,
            internal_date: None,
            size: None,
            envelope: None,
            body: None,
            missing: Vec::new(),
        };
        message.body = Some(Bytes::from_static(body));
        message
    }

    const MIXED: &[u8] = b"From: Ann <ann@example.com>\r\n\
Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See attached.\r\n\
--b1\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--b1--\r\n";

    #[test]
    fn test_decode_text_and_attachment() {
        let synced = SyncedMessage::decode(fetched(MIXED)).unwrap();
        assert_eq!(synced.header.subject.as_deref(), Some("Report"));
        assert_eq!(synced.parts.len(), 2);
        assert_eq!(synced.text("plain").map(str::trim_end), Some("See attached."));
        assert!(synced.has_attachment());
        let attachment = synced.attachments().next().unwrap();
        assert_eq!(attachment.filename(), Some("report.pdf"));
        assert_eq!(attachment.body().bytes().as_ref(), b"%PDF-");
        assert!(synced.warnings.is_empty());
    }

    #[test]
    fn test_unknown_charset_is_a_warning() {
        let body = b"Subject: x\r\nContent-Type: text/plain; charset=x-unknown-9\r\n\r\nhello\r\n";
        let synced = SyncedMessage::decode(fetched(body)).unwrap();
        assert_eq!(synced.parts.len(), 1);
        assert!(!synced.warnings.is_empty());
    }

    #[test]
    fn test_missing_body() {
        let mut message = fetched(b"");
        message.body = None;
        let error = SyncedMessage::decode(message).unwrap_err();
        assert!(matches!(error, Error::FetchItemMissing { .. }));
    }
}
