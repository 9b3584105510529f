//! Leaf parts yielded by the [`Reader`](crate::Reader).

use bytes::{Buf, Bytes};

use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::TransferEncoding;
use crate::header::Headers;

/// Headers of a leaf part, parsed and verbatim.
#[derive(Debug, Clone)]
pub struct PartHeader {
    /// All headers of the part.
    pub headers: Headers,
    /// Parsed `Content-Type`, or the RFC 2045 default.
    pub content_type: ContentType,
    /// Parsed `Content-Disposition`, if present.
    pub disposition: Option<ContentDisposition>,
    /// Transfer encoding that was removed from the body.
    pub transfer_encoding: TransferEncoding,
}

impl PartHeader {
    /// The `Content-Type` header exactly as sent.
    #[must_use]
    pub fn raw_content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// The `Content-Disposition` header exactly as sent.
    #[must_use]
    pub fn raw_disposition(&self) -> Option<&str> {
        self.headers.get("content-disposition")
    }

    /// Filename from the disposition, falling back to the `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.disposition
            .as_ref()
            .and_then(ContentDisposition::filename)
            .or_else(|| self.content_type.name())
            .filter(|name| !name.trim().is_empty())
    }

    /// `Content-ID` without angle brackets, else `X-Attachment-Id`.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> {
        self.headers
            .get("content-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
            .or_else(|| self.headers.get("x-attachment-id").map(str::trim))
            .filter(|id| !id.is_empty())
    }
}

/// Decoded content of a leaf part.
#[derive(Debug, Clone)]
pub struct PartBody {
    bytes: Bytes,
    text: Option<String>,
}

impl PartBody {
    pub(crate) const fn new(bytes: Bytes, text: Option<String>) -> Self {
        Self { bytes, text }
    }

    /// Body bytes after transfer decoding, before charset decoding.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Body as text, for `text/*` parts in a supported charset.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Length of the decoded body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true for an empty body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a reader over the decoded bytes.
    #[must_use]
    pub fn reader(&self) -> impl std::io::Read {
        self.bytes.clone().reader()
    }
}

/// A leaf part of a message.
///
/// A part is an attachment when its disposition says so, or when it carries
/// a filename without an explicit `inline` disposition. Everything else is
/// inline; telling plain text from HTML is left to the caller.
#[derive(Debug, Clone)]
pub enum MimePart {
    /// Part of the displayable body.
    Inline {
        /// Part headers.
        header: PartHeader,
        /// Decoded content.
        body: PartBody,
    },
    /// A named or explicitly attached part.
    Attachment {
        /// Part headers.
        header: PartHeader,
        /// Decoded filename, if any.
        filename: Option<String>,
        /// `Content-ID` or `X-Attachment-Id`.
        content_id: Option<String>,
        /// Decoded content.
        body: PartBody,
    },
}

impl MimePart {
    pub(crate) fn classify(header: PartHeader, body: PartBody) -> Self {
        let explicit_inline = header
            .disposition
            .as_ref()
            .is_some_and(ContentDisposition::is_inline);
        let attached = header
            .disposition
            .as_ref()
            .is_some_and(ContentDisposition::is_attachment);
        let filename = header.filename().map(str::to_string);

        if attached || (filename.is_some() && !explicit_inline) {
            let content_id = header.content_id().map(str::to_string);
            Self::Attachment {
                header,
                filename,
                content_id,
                body,
            }
        } else {
            Self::Inline { header, body }
        }
    }

    /// Returns the part headers.
    #[must_use]
    pub const fn header(&self) -> &PartHeader {
        match self {
            Self::Inline { header, .. } | Self::Attachment { header, .. } => header,
        }
    }

    /// Returns the decoded content.
    #[must_use]
    pub const fn body(&self) -> &PartBody {
        match self {
            Self::Inline { body, .. } | Self::Attachment { body, .. } => body,
        }
    }

    /// Returns the parsed content type.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.header().content_type
    }

    /// Returns true for [`MimePart::Attachment`].
    #[must_use]
    pub const fn is_attachment(&self) -> bool {
        matches!(self, Self::Attachment { .. })
    }

    /// Returns the attachment filename.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Attachment { filename, .. } => filename.as_deref(),
            Self::Inline { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;

    use super::*;

    fn header(raw: &[(&str, &str)]) -> PartHeader {
        let mut headers = Headers::new();
        for (name, value) in raw {
            headers.add(*name, *value);
        }
        PartHeader {
            content_type: headers
                .get("content-type")
                .and_then(|v| ContentType::parse(v).ok())
                .unwrap_or_default(),
            disposition: headers.get("content-disposition").map(ContentDisposition::parse),
            transfer_encoding: TransferEncoding::SevenBit,
            headers,
        }
    }

    fn body() -> PartBody {
        PartBody::new(Bytes::from_static(b"data"), None)
    }

    #[test]
    fn test_plain_part_is_inline() {
        let part = MimePart::classify(header(&[("Content-Type", "text/plain")]), body());
        assert!(!part.is_attachment());
        assert_eq!(part.content_type().mime_type(), "text/plain");
    }

    #[test]
    fn test_disposition_attachment_without_name() {
        let part = MimePart::classify(header(&[("Content-Disposition", "attachment")]), body());
        assert!(part.is_attachment());
        assert!(part.filename().is_none());
    }

    #[test]
    fn test_name_parameter_makes_attachment() {
        let part = MimePart::classify(
            header(&[
                ("Content-Type", "image/png; name=\"logo.png\""),
                ("X-Attachment-Id", "f_123"),
            ]),
            body(),
        );
        assert_eq!(part.filename(), Some("logo.png"));
        assert!(matches!(
            part,
            MimePart::Attachment { content_id: Some(ref id), .. } if id == "f_123"
        ));
    }

    #[test]
    fn test_explicit_inline_with_filename_stays_inline() {
        let part = MimePart::classify(
            header(&[
                ("Content-Type", "image/png"),
                ("Content-Disposition", "inline; filename=\"logo.png\""),
                ("Content-ID", "<logo@x>"),
            ]),
            body(),
        );
        assert!(!part.is_attachment());
        assert_eq!(part.header().content_id(), Some("logo@x"));
        assert_eq!(part.header().raw_disposition(), Some("inline; filename=\"logo.png\""));
    }

    #[test]
    fn test_body_reader() {
        let mut out = String::new();
        body().reader().read_to_string(&mut out).unwrap();
        assert_eq!(out, "data");
        assert_eq!(body().len(), 4);
    }
}
