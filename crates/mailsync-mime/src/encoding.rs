//! Transfer and header decoding.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words. Decoders
//! are lenient: mail in the wild routinely breaks line-length and padding
//! rules, so only input that cannot be interpreted at all is an error.

use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::charset;
use crate::error::Result;

/// Base64 engine that accepts missing padding and trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    ///
    /// Unknown tokens (`x-uuencode` and friends) are passed through as 7bit.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Removes this transfer encoding from `body`.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 body contains characters outside the
    /// alphabet.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => Ok(decode_quoted_printable(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Decodes Base64 data, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// An `=` that does not start a soft line break or a hex escape is kept
/// literally.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break, possibly with trailing whitespace before it
        let mut j = i + 1;
        while j < data.len() && (data[j] == b' ' || data[j] == b'\t') {
            j += 1;
        }
        if data.get(j..j + 2) == Some(b"\r\n") {
            i = j + 2;
            continue;
        }
        if data.get(j) == Some(&b'\n') {
            i = j + 1;
            continue;
        }

        match (
            data.get(i + 1).and_then(|b| hex_value(*b)),
            data.get(i + 2).and_then(|b| hex_value(*b)),
        ) {
            (Some(high), Some(low)) => {
                result.push((high << 4) | low);
                i += 3;
            }
            _ => {
                result.push(b'=');
                i += 1;
            }
        }
    }

    result
}

pub(crate) const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decodes RFC 2047 encoded words in a header value.
///
/// Format: `=?charset?encoding?encoded-text?=`
///
/// Whitespace between two adjacent encoded words is dropped. A word with an
/// unknown charset or a broken payload is left as it appeared.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut after_word = false;

    while !rest.is_empty() {
        if let Some((decoded, consumed)) = rest.strip_prefix("=?").and_then(encoded_word) {
            // Only whitespace separated this word from the previous one
            if !after_word {
                result.push_str(&pending_space);
            }
            pending_space.clear();
            result.push_str(&decoded);
            rest = &rest[consumed + 2..];
            after_word = true;
            continue;
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        if ch.is_whitespace() {
            pending_space.push(ch);
        } else {
            result.push_str(&pending_space);
            pending_space.clear();
            result.push(ch);
            after_word = false;
        }
        rest = &rest[ch.len_utf8()..];
    }

    result.push_str(&pending_space);
    result
}

/// Decodes one encoded word after its `=?` prefix; returns the text and
/// the number of bytes consumed.
fn encoded_word(s: &str) -> Option<(String, usize)> {
    let (label, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let payload = &rest[..end];
    if label.is_empty()
        || label.contains(char::is_whitespace)
        || payload.contains(char::is_whitespace)
    {
        return None;
    }
    let consumed = label.len() + encoding.len() + end + 4;

    // RFC 2231 adds an optional language: `utf-8*en`
    let charset = label.split('*').next().unwrap_or(label);
    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => {
            let spaced = payload.replace('_', " ");
            decode_quoted_printable(spaced.as_bytes())
        }
        _ => return None,
    };
    Some((charset::decode(&bytes, charset)?, consumed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_missing_padding() {
        assert_eq!(decode_base64(b"SGk").unwrap(), b"Hi");
    }

    #[test]
    fn test_base64_garbage() {
        assert!(decode_base64(b"not*base64!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!"), b"Hello, World!");
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello= \nWorld"), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_stray_equals() {
        assert_eq!(decode_quoted_printable(b"a=b =ZZ"), b"a=b =ZZ");
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse(" Base64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }

    #[test]
    fn test_rfc2047_plain_text_untouched() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
        assert_eq!(decode_rfc2047("a =? b"), "a =? b");
    }

    #[test]
    fn test_rfc2047_base64() {
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_rfc2047_q() {
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn test_rfc2047_mixed_with_text() {
        assert_eq!(
            decode_rfc2047("Re: =?iso-8859-1?Q?caf=E9?= menu"),
            "Re: café menu"
        );
    }

    #[test]
    fn test_rfc2047_adjacent_words_join() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?ab?=  \r\n =?utf-8?Q?cd?="),
            "abcd"
        );
    }

    #[test]
    fn test_rfc2047_unknown_charset_kept() {
        assert_eq!(decode_rfc2047("=?x-bogus?Q?abc?="), "=?x-bogus?Q?abc?=");
    }

    #[test]
    fn test_rfc2047_language_suffix() {
        assert_eq!(decode_rfc2047("=?utf-8*en?Q?hi?="), "hi");
    }
}
