//! MIME header handling.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::address::{Address, parse_address_list};
use crate::charset;
use crate::encoding::decode_rfc2047;
use crate::error::Error;

/// Collection of email headers.
///
/// Names are case-insensitive; values are kept as they appeared, with
/// folded lines joined by a single space.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gets the first value with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Returns true if no header was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Parses headers from raw text.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation
    /// ```
    ///
    /// Parsing stops at the first empty line. A leading mbox `From ` line
    /// is skipped. A line that is neither a field nor a continuation is
    /// dropped and returned as an [`Error::InvalidHeader`]; the fields
    /// around it are kept.
    #[must_use]
    pub fn parse(text: &str) -> (Self, Vec<Error>) {
        let mut headers = Self::new();
        let mut skipped = Vec::new();
        let mut current: Option<(String, String)> = None;

        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                break;
            }
            if index == 0 && line.starts_with("From ") {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                match current.as_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => skipped.push(Error::InvalidHeader(line.to_string())),
                }
                continue;
            }

            let Some((name, value)) = line
                .split_once(':')
                .filter(|(name, _)| is_field_name(name.trim_end()))
            else {
                skipped.push(Error::InvalidHeader(line.to_string()));
                continue;
            };

            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim());
            }
            current = Some((name.trim_end().to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim());
        }

        (headers, skipped)
    }

    /// Parses a raw header block.
    ///
    /// UTF-8 is taken as is. Any other 8-bit bytes are read as
    /// windows-1252, the charset unlabelled legacy headers are usually in.
    #[must_use]
    pub fn from_bytes(head: &[u8]) -> (Self, Vec<Error>) {
        Self::parse(&charset::decode_unlabelled(head))
    }
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted_headers: Vec<_> = self.headers.iter().collect();
        sorted_headers.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (name, values) in sorted_headers {
            for value in values {
                writeln!(f, "{name}: {value}")?;
            }
        }

        Ok(())
    }
}

/// Splits an entity into its header block and body.
///
/// Returns the header bytes and the offset where the body starts. An entity
/// without a blank line is all header.
pub(crate) fn split_entity(data: &[u8]) -> (&[u8], usize) {
    if data.starts_with(b"\r\n") {
        return (&[], 2);
    }
    if data.starts_with(b"\n") {
        return (&[], 1);
    }

    let mut from = 0;
    while let Some(offset) = data[from..].iter().position(|&b| b == b'\n') {
        let newline = from + offset;
        let next = &data[newline + 1..];
        if next.starts_with(b"\r\n") {
            return (&data[..=newline], newline + 3);
        }
        if next.starts_with(b"\n") {
            return (&data[..=newline], newline + 2);
        }
        from = newline + 1;
    }
    (data, data.len())
}

/// The standard RFC 5322 fields of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageHeader {
    /// Origination date, if present and parseable.
    pub date: Option<DateTime<FixedOffset>>,
    /// Decoded subject.
    pub subject: Option<String>,
    /// `From` addresses.
    pub from: Vec<Address>,
    /// `To` addresses.
    pub to: Vec<Address>,
    /// `Cc` addresses.
    pub cc: Vec<Address>,
    /// `Message-ID` without angle brackets.
    pub message_id: Option<String>,
    /// `In-Reply-To` without angle brackets.
    pub in_reply_to: Option<String>,
    /// `References`, oldest first.
    pub references: Vec<String>,
}

impl MessageHeader {
    /// Extracts the standard fields from parsed headers.
    #[must_use]
    pub fn from_headers(headers: &Headers) -> Self {
        let addresses = |name: &str| {
            headers
                .get_all(name)
                .into_iter()
                .flat_map(parse_address_list)
                .collect::<Vec<_>>()
        };

        Self {
            date: headers.get("date").and_then(parse_date),
            subject: headers.get_decoded("subject"),
            from: addresses("from"),
            to: addresses("to"),
            cc: addresses("cc"),
            message_id: headers
                .get("message-id")
                .and_then(|v| msg_ids(v).into_iter().next()),
            in_reply_to: headers
                .get("in-reply-to")
                .and_then(|v| msg_ids(v).into_iter().next()),
            references: headers.get("references").map(msg_ids).unwrap_or_default(),
        }
    }
}

/// Parses an RFC 5322 date, tolerating a trailing zone comment.
fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value).ok().or_else(|| {
        let without_comment = value.split_once(" (").map_or(value, |(date, _)| date);
        DateTime::parse_from_rfc2822(without_comment.trim()).ok()
    })
}

/// Collects `<id>` tokens; a value without brackets counts as one id.
fn msg_ids(value: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = value;
    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let id = rest[open + 1..open + close].trim();
        if !id.is_empty() {
            ids.push(id.to_string());
        }
        rest = &rest[open + close + 1..];
    }
    if ids.is_empty() && !value.trim().is_empty() {
        ids.push(value.trim().to_string());
    }
    ids
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

    mod headers_tests {
        use super::*;

        #[test]
        fn test_headers_add_get() {
            let mut headers = Headers::new();
            headers.add("Content-Type", "text/plain");
            assert_eq!(headers.get("Content-Type"), Some("text/plain"));
            assert_eq!(headers.get("content-type"), Some("text/plain"));
        }

        #[test]
        fn test_headers_parse() {
            let text = concat!(
                "From: sender@example.com\r\n",
                "To: recipient@example.com\r\n",
                "Subject: Test Message\r\n",
                "Content-Type: text/plain;\r\n",
                " charset=utf-8\r\n",
                "\r\n",
                "Body: not a header\r\n"
            );

            let (headers, skipped) = Headers::parse(text);
            assert!(skipped.is_empty());
            assert_eq!(headers.get("From"), Some("sender@example.com"));
            assert_eq!(headers.get("Subject"), Some("Test Message"));
            assert_eq!(
                headers.get("Content-Type"),
                Some("text/plain; charset=utf-8")
            );
            assert!(headers.get("Body").is_none());
        }

        #[test]
        fn test_headers_parse_repeated() {
            let (headers, _) = Headers::parse("Received: a\nReceived: b\n");
            assert_eq!(headers.get_all("received"), vec!["a", "b"]);
        }

        #[test]
        fn test_headers_skip_mbox_line() {
            let (headers, skipped) =
                Headers::parse("From ann@example.com Mon Jan 1 00:00:00 2024\nSubject: hi\n");
            assert!(skipped.is_empty());
            assert_eq!(headers.get("subject"), Some("hi"));
        }

        #[test]
        fn test_headers_skip_garbage() {
            let (headers, skipped) = Headers::parse(concat!(
                "Subject: ok\n",
                "this is not a header\n",
                "Bad Name: x\n",
                "To: bob@example.com\n",
            ));
            assert_eq!(headers.get("subject"), Some("ok"));
            assert_eq!(headers.get("to"), Some("bob@example.com"));
            assert!(headers.get("bad name").is_none());
            assert_eq!(skipped.len(), 2);
            assert!(matches!(&skipped[0], Error::InvalidHeader(line) if line == "this is not a header"));
            assert_eq!(skipped[0].tier(), crate::Tier::Structure);
        }

        #[test]
        fn test_headers_leading_continuation() {
            let (headers, skipped) = Headers::parse(" stray\nSubject: hi\n");
            assert_eq!(headers.get("subject"), Some("hi"));
            assert_eq!(skipped.len(), 1);
        }

        #[test]
        fn test_headers_from_latin1_bytes() {
            let (headers, _) = Headers::from_bytes(b"Subject: caf\xe9\r\nFrom: a@b.c\r\n");
            assert_eq!(headers.get("subject"), Some("café"));
            assert_eq!(headers.get("from"), Some("a@b.c"));
        }

        #[test]
        fn test_headers_from_utf8_bytes() {
            let (headers, _) = Headers::from_bytes("Subject: café\r\n".as_bytes());
            assert_eq!(headers.get("subject"), Some("café"));
        }

        #[test]
        fn test_headers_display() {
            let mut headers = Headers::new();
            headers.add("To", "recipient@example.com");
            headers.add("From", "sender@example.com");
            assert_eq!(
                headers.to_string(),
                "from: sender@example.com\nto: recipient@example.com\n"
            );
        }
    }

    mod split_tests {
        use super::*;

        #[test]
        fn test_split_crlf() {
            let data = b"A: 1\r\nB: 2\r\n\r\nbody";
            let (head, body) = split_entity(data);
            assert_eq!(head, b"A: 1\r\nB: 2\r\n");
            assert_eq!(&data[body..], b"body");
        }

        #[test]
        fn test_split_lf_and_empty_header() {
            let data = b"A: 1\n\nbody";
            let (head, body) = split_entity(data);
            assert_eq!(head, b"A: 1\n");
            assert_eq!(&data[body..], b"body");

            let (head, body) = split_entity(b"\r\nonly body");
            assert!(head.is_empty());
            assert_eq!(body, 2);
        }

        #[test]
        fn test_split_header_only() {
            let data = b"A: 1\r\n";
            let (head, body) = split_entity(data);
            assert_eq!(head, data);
            assert_eq!(body, data.len());
        }
    }

    mod message_header_tests {
        use super::*;

        #[test]
        fn test_standard_fields() {
            let headers = Headers::parse(concat!(
                "Date: Tue, 1 Oct 2024 10:00:00 +0200 (CEST)\r\n",
                "From: Ann <ann@example.com>\r\n",
                "To: bob@example.com, \"Carol\" <carol@example.com>\r\n",
                "Subject: =?utf-8?Q?R=C3=A9sum=C3=A9?=\r\n",
                "Message-ID: <abc@example.com>\r\n",
                "In-Reply-To: <parent@example.com>\r\n",
                "References: <root@example.com>\r\n <parent@example.com>\r\n",
            ))
            .0;

            let header = MessageHeader::from_headers(&headers);
            assert_eq!(header.date.unwrap().to_rfc3339(), "2024-10-01T10:00:00+02:00");
            assert_eq!(header.subject.as_deref(), Some("Résumé"));
            assert_eq!(header.from, vec![Address::new("ann@example.com").with_name("Ann")]);
            assert_eq!(header.to.len(), 2);
            assert_eq!(header.message_id.as_deref(), Some("abc@example.com"));
            assert_eq!(header.in_reply_to.as_deref(), Some("parent@example.com"));
            assert_eq!(header.references, vec!["root@example.com", "parent@example.com"]);
        }

        #[test]
        fn test_missing_fields() {
            let header = MessageHeader::from_headers(&Headers::new());
            assert_eq!(header, MessageHeader::default());
        }

        #[test]
        fn test_bad_date_is_absent() {
            let (headers, _) = Headers::parse("Date: yesterday-ish\n");
            assert!(MessageHeader::from_headers(&headers).date.is_none());
        }
    }
}
