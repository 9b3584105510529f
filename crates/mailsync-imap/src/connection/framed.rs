//! Framed I/O for the IMAP protocol.
//!
//! IMAP responses are CRLF-terminated lines that may embed literals
//! (`{n}\r\n` followed by exactly `n` bytes). A frame is one complete
//! response, literals included.
//!
//! All partial input lives in the read buffer, so [`FramedStream::read_response`]
//! is cancellation safe: dropping the future (for instance when an IDLE wait
//! times out) loses no bytes, and the next call resumes where it left off.

#![allow(clippy::missing_errors_doc)]

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::Tag;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length outside literals.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Maximum literal size.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Framed connection for the IMAP protocol.
pub struct FramedStream<S> {
    stream: S,
    read_buf: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Bytes> {
        loop {
            if let Some(len) = frame_len(&self.read_buf)? {
                return Ok(self.read_buf.split_to(len).freeze());
            }

            self.read_buf.reserve(DEFAULT_BUFFER_SIZE);
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::Closed);
            }
        }
    }

    /// Writes a command (or a continuation reply) and flushes.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Returns true if bytes are buffered that no frame has consumed yet.
    #[must_use]
    pub fn has_buffered(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Gets a reference to the underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Buffered bytes are discarded; check [`has_buffered`](Self::has_buffered)
    /// first when that matters.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Returns the length of the first complete frame in `buf`, if any.
///
/// A bare LF is accepted as a line terminator.
fn frame_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut start = 0;
    loop {
        let Some(lf) = buf[start..].iter().position(|&b| b == b'\n') else {
            if buf.len() - start > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            return Ok(None);
        };
        let line_end = start + lf;
        let after_line = line_end + 1;

        let line = &buf[start..line_end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        match parse_literal_length(line) {
            Some(len) if len > MAX_LITERAL_SIZE => {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            Some(len) => {
                let literal_end = after_line + len;
                if buf.len() < literal_end {
                    return Ok(None);
                }
                start = literal_end;
            }
            None => return Ok(Some(after_line)),
        }
    }
}

/// Parses a literal announcement at the end of a line (`{123}` or `{123+}`).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Returns true if `response` is the tagged completion for `tag`.
#[must_use]
pub fn is_tagged(response: &[u8], tag: &Tag) -> bool {
    let tag = tag.as_str().as_bytes();
    response.starts_with(tag) && response.get(tag.len()) == Some(&b' ')
}

/// Collects responses until the tagged completion of one command.
#[derive(Debug)]
pub struct ResponseAccumulator {
    tag: Tag,
    responses: Vec<Bytes>,
}

impl ResponseAccumulator {
    /// Creates an accumulator for the given tag.
    #[must_use]
    pub const fn new(tag: Tag) -> Self {
        Self {
            tag,
            responses: Vec::new(),
        }
    }

    /// Reads responses until the tagged completion; it is the last element.
    pub async fn read_until_tagged<S>(&mut self, framed: &mut FramedStream<S>) -> Result<Vec<Bytes>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            let done = is_tagged(&response, &self.tag);
            self.responses.push(response);
            if done {
                break;
            }
        }

        Ok(std::mem::take(&mut self.responses))
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
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio_test::io::Builder;

    use super::*;

    mod frame_tests {
        use super::*;

        #[test]
        fn test_incomplete_line() {
            assert_eq!(frame_len(b"* OK hel").unwrap(), None);
        }

        #[test]
        fn test_simple_line() {
            assert_eq!(frame_len(b"* OK\r\n* 1 EXISTS\r\n").unwrap(), Some(6));
        }

        #[test]
        fn test_literal_spans_lines() {
            let buf = b"* 1 FETCH (BODY[] {5}\r\na\r\nbc)\r\nrest";
            assert_eq!(frame_len(buf).unwrap(), Some(buf.len() - 4));
        }

        #[test]
        fn test_literal_incomplete() {
            assert_eq!(frame_len(b"* 1 FETCH (BODY[] {10}\r\nabc").unwrap(), None);
        }

        #[test]
        fn test_non_sync_literal() {
            assert_eq!(parse_literal_length(b"A1 LOGIN {4+}"), Some(4));
            assert_eq!(parse_literal_length(b"* OK {x}"), None);
            assert_eq!(parse_literal_length(b"* OK {}"), None);
            assert_eq!(parse_literal_length(b"* OK done"), None);
        }

        #[test]
        fn test_literal_too_large() {
            let line = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
            assert!(frame_len(line.as_bytes()).is_err());
        }

        #[test]
        fn test_bare_lf() {
            assert_eq!(frame_len(b"* OK\n").unwrap(), Some(5));
        }

        #[test]
        fn test_is_tagged() {
            let tag = Tag::new("A0001");
            assert!(is_tagged(b"A0001 OK done\r\n", &tag));
            assert!(!is_tagged(b"A00010 OK done\r\n", &tag));
            assert!(!is_tagged(b"* OK\r\n", &tag));
        }
    }

    mod stream_tests {
        use super::*;

        #[tokio::test]
        async fn test_reads_across_chunks() {
            let mock = Builder::new()
                .read(b"* 1 FETCH (BODY[] {11}\r\nhello")
                .read(b" world)\r\n* 2 EXISTS\r\n")
                .build();
            let mut framed = FramedStream::new(mock);

            let first = framed.read_response().await.unwrap();
            assert_eq!(&first[..], b"* 1 FETCH (BODY[] {11}\r\nhello world)\r\n");
            let second = framed.read_response().await.unwrap();
            assert_eq!(&second[..], b"* 2 EXISTS\r\n");
        }

        #[tokio::test]
        async fn test_eof_is_closed() {
            let mock = Builder::new().read(b"* OK partial").build();
            let mut framed = FramedStream::new(mock);
            assert!(matches!(framed.read_response().await, Err(Error::Closed)));
        }

        #[tokio::test]
        async fn test_accumulator_stops_at_tag() {
            let mock = Builder::new()
                .read(b"* CAPABILITY IMAP4rev1\r\nA1 OK done\r\n* 3 EXISTS\r\n")
                .build();
            let mut framed = FramedStream::new(mock);

            let responses = ResponseAccumulator::new(Tag::new("A1"))
                .read_until_tagged(&mut framed)
                .await
                .unwrap();
            assert_eq!(responses.len(), 2);
            assert!(framed.has_buffered());
        }

        #[tokio::test]
        async fn test_cancelled_read_keeps_partial_data() {
            let (client, mut server) = tokio::io::duplex(64);
            let mut framed = FramedStream::new(client);

            server.write_all(b"* 4 EXI").await.unwrap();
            let timed_out =
                tokio::time::timeout(Duration::from_millis(20), framed.read_response()).await;
            assert!(timed_out.is_err());

            server.write_all(b"STS\r\n").await.unwrap();
            let frame = framed.read_response().await.unwrap();
            assert_eq!(&frame[..], b"* 4 EXISTS\r\n");
        }
    }
}
