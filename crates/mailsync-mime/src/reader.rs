//! Streaming decomposition of a message into leaf parts.
//!
//! The reader walks nested multipart entities with an explicit stack of
//! frames, one per open multipart, and yields leaf parts in document order.
//! Recoverable problems are recorded as warnings:
//!
//! - an unknown charset drops the text view of one part;
//! - a header line that is neither a field nor a continuation is skipped;
//! - a missing or unterminated boundary stops decomposition after the parts
//!   already yielded.

use bytes::Bytes;

use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::TransferEncoding;
use crate::error::{Error, Result};
use crate::header::{Headers, MessageHeader, split_entity};
use crate::part::{MimePart, PartBody, PartHeader};
use crate::charset;

/// Deepest multipart nesting the reader follows.
pub const MAX_DEPTH: usize = 32;

/// Opens a message for decoding.
///
/// Parses the outer header block eagerly; parts are decoded on demand by
/// [`Reader::next_part`].
///
/// # Errors
///
/// Returns [`Error::Empty`] for an empty literal. Malformed header lines
/// are skipped and show up in [`Reader::warnings`].
pub fn open(body: impl Into<Bytes>) -> Result<Reader> {
    let data: Bytes = body.into();
    if data.is_empty() {
        return Err(Error::Empty);
    }

    let (head, body_start) = split_entity(&data);
    let (headers, skipped) = Headers::from_bytes(head);
    let header = MessageHeader::from_headers(&headers);
    let body = data.slice(body_start..);

    let mut reader = Reader {
        header,
        headers: headers.clone(),
        single: None,
        frames: Vec::new(),
        warnings: Vec::new(),
        truncated: false,
        stopped: false,
        yielded: 0,
    };
    for error in skipped {
        reader.warn(error);
    }
    let content_type = reader.content_type(&headers);
    reader.enter(headers, content_type, body);
    Ok(reader)
}

/// A message being decoded.
#[derive(Debug)]
pub struct Reader {
    header: MessageHeader,
    headers: Headers,
    /// Body of a single-part message, until it is yielded.
    single: Option<(Headers, ContentType, Bytes)>,
    frames: Vec<Frame>,
    warnings: Vec<Error>,
    truncated: bool,
    stopped: bool,
    yielded: usize,
}

impl Reader {
    /// Returns the standard fields of the outer header.
    #[must_use]
    pub const fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Returns all outer headers verbatim.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the recoverable problems met so far.
    #[must_use]
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// Returns true if decomposition stopped early.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Returns the next leaf part, or `None` at the end of the message.
    ///
    /// # Errors
    ///
    /// Returns a [`Tier::Fatal`](crate::Tier::Fatal) error when a part body
    /// cannot be decoded. The reader yields nothing further after that.
    pub fn next_part(&mut self) -> Result<Option<MimePart>> {
        if let Some((headers, content_type, body)) = self.single.take() {
            return self.leaf(headers, content_type, &body).map(Some);
        }

        while !self.stopped {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };

            match frame.next_entity() {
                Step::Entity(entity) => {
                    if let Some(part) = self.entity(&entity)? {
                        return Ok(Some(part));
                    }
                }
                Step::Unterminated(entity) => {
                    let boundary = frame.boundary.clone();
                    self.warn(Error::UnterminatedMultipart { boundary });
                    // The trailing entity is still decoded, nothing after it
                    self.truncated = true;
                    self.frames.clear();
                    if let Some(part) = self.entity(&entity)? {
                        return Ok(Some(part));
                    }
                }
                Step::NoDelimiter => {
                    self.warn(Error::MissingBoundary);
                    self.stop();
                }
                Step::End => {
                    self.frames.pop();
                }
            }
        }
        Ok(None)
    }

    /// Decodes one entity found between delimiters. Returns `None` when the
    /// entity was a nested multipart, now on the stack.
    fn entity(&mut self, entity: &Bytes) -> Result<Option<MimePart>> {
        let (head, body_start) = split_entity(entity);
        let (headers, skipped) = Headers::from_bytes(head);
        for error in skipped {
            self.warn(error);
        }
        let content_type = self.content_type(&headers);
        let body = entity.slice(body_start..);

        if content_type.is_multipart() {
            self.enter(headers, content_type, body);
            Ok(None)
        } else {
            self.leaf(headers, content_type, &body).map(Some)
        }
    }

    /// Pushes a multipart frame, or queues a single-part body.
    fn enter(&mut self, headers: Headers, content_type: ContentType, body: Bytes) {
        if !content_type.is_multipart() {
            self.single = Some((headers, content_type, body));
            return;
        }
        let Some(boundary) = content_type.boundary() else {
            self.warn(Error::MissingBoundary);
            self.stop();
            return;
        };
        if self.frames.len() >= MAX_DEPTH {
            self.warn(Error::TooDeep(MAX_DEPTH));
            self.stop();
            return;
        }
        self.frames.push(Frame::new(boundary, body));
    }

    fn leaf(
        &mut self,
        headers: Headers,
        content_type: ContentType,
        body: &[u8],
    ) -> Result<MimePart> {
        let transfer_encoding = headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        let decoded = match transfer_encoding.decode(body) {
            Ok(decoded) => Bytes::from(decoded),
            Err(error) => {
                self.stopped = true;
                self.frames.clear();
                return Err(error);
            }
        };

        let text = if content_type.is_text() {
            let label = content_type.charset().unwrap_or("us-ascii");
            let text = charset::decode(&decoded, label);
            if text.is_none() {
                self.warn(Error::UnknownCharset(label.to_string()));
            }
            text
        } else {
            None
        };

        let header = PartHeader {
            disposition: headers
                .get("content-disposition")
                .map(ContentDisposition::parse),
            content_type,
            transfer_encoding,
            headers,
        };
        self.yielded += 1;
        Ok(MimePart::classify(header, PartBody::new(decoded, text)))
    }

    fn content_type(&mut self, headers: &Headers) -> ContentType {
        match headers.get("content-type").map(ContentType::parse) {
            Some(Ok(content_type)) => content_type,
            Some(Err(error)) => {
                self.warn(error);
                ContentType::default()
            }
            None => ContentType::default(),
        }
    }

    /// Ends decomposition after a structural problem.
    fn stop(&mut self) {
        self.truncated = true;
        self.stopped = true;
        self.frames.clear();
    }

    fn warn(&mut self, error: Error) {
        tracing::debug!(%error, part = self.yielded, "recoverable MIME error");
        self.warnings.push(error);
    }
}

impl Iterator for Reader {
    type Item = Result<MimePart>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_part().transpose()
    }
}

/// An open multipart entity.
#[derive(Debug)]
struct Frame {
    boundary: String,
    body: Bytes,
    pos: usize,
    started: bool,
    closed: bool,
}

/// What a frame found next.
enum Step {
    /// Content between two delimiters.
    Entity(Bytes),
    /// Content after the last delimiter, with no close delimiter.
    Unterminated(Bytes),
    /// The body holds no delimiter at all.
    NoDelimiter,
    /// The close delimiter was reached.
    End,
}

/// A delimiter line inside a multipart body.
struct Delimiter {
    /// End of the preceding entity, before the line break that belongs to
    /// the delimiter.
    content_end: usize,
    /// Start of the line after the delimiter.
    next: usize,
    close: bool,
}

impl Frame {
    fn new(boundary: &str, body: Bytes) -> Self {
        Self {
            boundary: boundary.to_string(),
            body,
            pos: 0,
            started: false,
            closed: false,
        }
    }

    fn next_entity(&mut self) -> Step {
        if self.closed {
            return Step::End;
        }
        if !self.started {
            // Skip the preamble
            let Some(first) = find_delimiter(&self.body, 0, &self.boundary) else {
                return Step::NoDelimiter;
            };
            self.started = true;
            if first.close {
                self.closed = true;
                return Step::End;
            }
            self.pos = first.next;
        }

        let start = self.pos;
        match find_delimiter(&self.body, start, &self.boundary) {
            Some(delimiter) => {
                let entity = self.body.slice(start..delimiter.content_end.max(start));
                if delimiter.close {
                    self.closed = true;
                } else {
                    self.pos = delimiter.next;
                }
                Step::Entity(entity)
            }
            None => {
                self.closed = true;
                Step::Unterminated(self.body.slice(start..))
            }
        }
    }
}

/// Finds the next `--boundary` line starting at or after `from`, which must
/// be the start of a line.
fn find_delimiter(body: &[u8], from: usize, boundary: &str) -> Option<Delimiter> {
    let mut at = from;
    while at <= body.len() {
        let line = &body[at..];
        if let Some(rest) = line
            .strip_prefix(b"--")
            .and_then(|rest| rest.strip_prefix(boundary.as_bytes()))
        {
            let close = rest.starts_with(b"--");
            let tail = if close { &rest[2..] } else { rest };
            let line_end = tail.iter().position(|&b| b == b'\n');
            let padding = &tail[..line_end.unwrap_or(tail.len())];
            // Only transport padding may follow the boundary
            if padding.iter().all(u8::is_ascii_whitespace) {
                let next = line_end.map_or(body.len(), |end| {
                    at + (line.len() - tail.len()) + end + 1
                });
                return Some(Delimiter {
                    content_end: line_break_before(body, at),
                    next,
                    close,
                });
            }
        }

        let newline = line.iter().position(|&b| b == b'\n')?;
        at += newline + 1;
    }
    None
}

fn line_break_before(body: &[u8], at: usize) -> usize {
    if at >= 2 && &body[at - 2..at] == b"\r\n" {
        at - 2
    } else if at >= 1 && body[at - 1] == b'\n' {
        at - 1
    } else {
        at
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
    use crate::error::Tier;

    fn parts(reader: &mut Reader) -> Vec<MimePart> {
        let mut parts = Vec::new();
        while let Some(part) = reader.next_part().unwrap() {
            parts.push(part);
        }
        parts
    }

    mod delimiter_tests {
        use super::*;

        #[test]
        fn test_find_delimiter() {
            let body = b"preamble\r\n--b1\r\nA\r\n--b1--\r\n";
            let first = find_delimiter(body, 0, "b1").unwrap();
            assert!(!first.close);
            assert_eq!(first.content_end, 8);
            assert_eq!(&body[first.next..first.next + 1], b"A");

            let second = find_delimiter(body, first.next, "b1").unwrap();
            assert!(second.close);
            assert_eq!(&body[first.next..second.content_end], b"A");
        }

        #[test]
        fn test_longer_boundary_is_not_a_match() {
            let body = b"--b1x\n--b1\n";
            let found = find_delimiter(body, 0, "b1").unwrap();
            assert_eq!(found.content_end, 5);
        }

        #[test]
        fn test_delimiter_must_start_a_line() {
            assert!(find_delimiter(b"text --b1\n", 0, "b1").is_none());
        }
    }

    mod reader_tests {
        use super::*;

        #[test]
        fn test_single_part() {
            let mut reader = open(
                &b"Subject: hi\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nh\xc3\xa9\r\n"[..],
            )
            .unwrap();
            assert_eq!(reader.header().subject.as_deref(), Some("hi"));
            let parts = parts(&mut reader);
            assert_eq!(parts.len(), 1);
            assert_eq!(parts[0].body().text(), Some("hé\r\n"));
            assert!(reader.warnings().is_empty());
        }

        #[test]
        fn test_default_content_type() {
            let mut reader = open(&b"Subject: x\n\nplain body"[..]).unwrap();
            let part = reader.next_part().unwrap().unwrap();
            assert_eq!(part.content_type().mime_type(), "text/plain");
            assert_eq!(part.body().text(), Some("plain body"));
            assert!(reader.next_part().unwrap().is_none());
        }

        #[test]
        fn test_nested_multipart_is_flattened() {
            let raw = concat!(
                "Content-Type: multipart/mixed; boundary=outer\r\n",
                "\r\n",
                "--outer\r\n",
                "Content-Type: multipart/alternative; boundary=inner\r\n",
                "\r\n",
                "--inner\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "plain\r\n",
                "--inner\r\n",
                "Content-Type: text/html\r\n",
                "\r\n",
                "<p>html</p>\r\n",
                "--inner--\r\n",
                "--outer\r\n",
                "Content-Type: application/pdf; name=a.pdf\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "JVBERi0=\r\n",
                "--outer--\r\n",
                "epilogue\r\n",
            );
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            let parts = parts(&mut reader);
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[0].body().text(), Some("plain"));
            assert_eq!(parts[1].content_type().sub_type, "html");
            assert_eq!(parts[2].filename(), Some("a.pdf"));
            assert_eq!(parts[2].body().bytes().as_ref(), b"%PDF-");
            assert!(!reader.is_truncated());
        }

        #[test]
        fn test_quoted_printable_body() {
            let raw = "Content-Type: text/plain; charset=iso-8859-1\n\
                       Content-Transfer-Encoding: quoted-printable\n\ncaf=E9 =\nau lait";
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            let part = reader.next_part().unwrap().unwrap();
            assert_eq!(part.body().text(), Some("café au lait"));
        }

        #[test]
        fn test_unknown_charset_keeps_raw_bytes() {
            let raw = concat!(
                "Content-Type: multipart/mixed; boundary=b\n\n",
                "--b\nContent-Type: text/plain; charset=x-martian\n\nzork\n",
                "--b\nContent-Type: text/plain\n\nok\n",
                "--b--\n",
            );
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            let parts = parts(&mut reader);
            assert_eq!(parts.len(), 2);
            assert!(parts[0].body().text().is_none());
            assert_eq!(parts[0].body().bytes().as_ref(), b"zork");
            assert_eq!(parts[1].body().text(), Some("ok"));
            assert_eq!(reader.warnings().len(), 1);
            assert_eq!(reader.warnings()[0].tier(), Tier::Charset);
            assert!(!reader.is_truncated());
        }

        #[test]
        fn test_unterminated_multipart_keeps_earlier_parts() {
            let raw = concat!(
                "Content-Type: multipart/mixed; boundary=b\n\n",
                "--b\n\nfirst\n",
                "--b\n\nsecond, cut off",
            );
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            let parts = parts(&mut reader);
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].body().text(), Some("first"));
            assert_eq!(parts[1].body().text(), Some("second, cut off"));
            assert!(reader.is_truncated());
            assert!(matches!(
                reader.warnings()[0],
                Error::UnterminatedMultipart { .. }
            ));
        }

        #[test]
        fn test_malformed_part_header_line_is_skipped() {
            let raw = concat!(
                "Content-Type: multipart/mixed; boundary=b\n\n",
                "--b\n\nfirst\n",
                "--b\nthis line is not a header\nContent-Type: text/plain\n\nsecond\n",
                "--b\n\nthird\n",
                "--b--\n",
            );
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            let parts = parts(&mut reader);
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[1].body().text(), Some("second"));
            assert!(!reader.is_truncated());
            assert!(matches!(reader.warnings(), [Error::InvalidHeader(_)]));
            assert_eq!(reader.warnings()[0].tier(), Tier::Structure);
        }

        #[test]
        fn test_missing_boundary_parameter() {
            let mut reader = open(&b"Content-Type: multipart/mixed\n\nbody"[..]).unwrap();
            assert!(reader.next_part().unwrap().is_none());
            assert!(matches!(reader.warnings(), [Error::MissingBoundary]));
        }

        #[test]
        fn test_no_delimiter_in_body() {
            let mut reader =
                open(&b"Content-Type: multipart/mixed; boundary=zz\n\nnothing here"[..]).unwrap();
            assert!(reader.next_part().unwrap().is_none());
            assert!(reader.is_truncated());
        }

        #[test]
        fn test_bad_base64_is_fatal() {
            let raw = concat!(
                "Content-Type: multipart/mixed; boundary=b\n\n",
                "--b\nContent-Transfer-Encoding: base64\n\n*** not base64 ***\n",
                "--b\n\nlater\n",
                "--b--\n",
            );
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            let error = reader.next_part().unwrap_err();
            assert_eq!(error.tier(), Tier::Fatal);
            assert!(reader.next_part().unwrap().is_none());
        }

        #[test]
        fn test_open_errors() {
            assert!(matches!(open(Vec::<u8>::new()), Err(Error::Empty)));
        }

        #[test]
        fn test_malformed_outer_header_line_is_skipped() {
            let raw = "Subject: hi\ngarbage without colon\nFrom: ann@example.com\n\nbody";
            let mut reader = open(raw.as_bytes().to_vec()).unwrap();
            assert_eq!(reader.header().subject.as_deref(), Some("hi"));
            assert_eq!(reader.header().from.len(), 1);
            assert!(matches!(reader.warnings(), [Error::InvalidHeader(_)]));
            assert_eq!(reader.warnings()[0].tier(), Tier::Structure);
            assert!(!reader.is_truncated());
            let part = reader.next_part().unwrap().unwrap();
            assert_eq!(part.body().text(), Some("body"));
        }

        #[test]
        fn test_iterator() {
            let raw = "Content-Type: multipart/mixed; boundary=b\n\n--b\n\none\n--b\n\ntwo\n--b--\n";
            let reader = open(raw.as_bytes().to_vec()).unwrap();
            let parts: Vec<_> = reader.collect::<Result<_>>().unwrap();
            assert_eq!(parts.len(), 2);
        }

        #[test]
        fn test_depth_limit() {
            fn nest(level: usize) -> String {
                if level > MAX_DEPTH {
                    return "Content-Type: text/plain\n\nleaf".to_string();
                }
                format!(
                    "Content-Type: multipart/mixed; boundary=l{level}\n\n--l{level}\n{}\n--l{level}--",
                    nest(level + 1)
                )
            }

            let mut reader = open(nest(0).into_bytes()).unwrap();
            assert!(reader.next_part().unwrap().is_none());
            assert!(reader
                .warnings()
                .iter()
                .any(|w| matches!(w, Error::TooDeep(_))));
        }
    }
}
