//! Wire encoding of command arguments.

use chrono::NaiveDate;

use super::types::{FetchAttribute, SearchKey};
use crate::types::Flag;
use crate::{Error, Result};

/// An encoded command.
///
/// Strings that are not ASCII go out as synchronizing literals. The server
/// must answer each `{n}` with a continuation before the literal data is
/// sent, so the command is kept as segments split after every `{n}\r\n`.
#[derive(Debug, Default)]
pub struct Wire {
    buf: Vec<u8>,
    splits: Vec<usize>,
}

impl Wire {
    pub(crate) fn push(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn literal(&mut self, data: &[u8]) {
        self.extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
        self.splits.push(self.buf.len());
        self.extend_from_slice(data);
    }

    /// Returns true if the command contains a literal.
    #[must_use]
    pub fn has_literals(&self) -> bool {
        !self.splits.is_empty()
    }

    /// Segments to write, waiting for a continuation between each.
    #[must_use]
    pub fn into_segments(self) -> Vec<Vec<u8>> {
        let mut segments = Vec::with_capacity(self.splits.len() + 1);
        let mut rest = self.buf;
        for split in self.splits.iter().rev() {
            segments.push(rest.split_off(*split));
        }
        segments.push(rest);
        segments.reverse();
        segments
    }

    /// The whole command as one buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Writes an atom when possible, a quoted string or a literal otherwise.
pub fn write_astring(wire: &mut Wire, s: &str) -> Result<()> {
    check_encodable(s)?;
    if !s.is_ascii() {
        wire.literal(s.as_bytes());
    } else if s.is_empty() || s.bytes().any(needs_quoting) {
        write_quoted(wire, s);
    } else {
        wire.extend_from_slice(s.as_bytes());
    }
    Ok(())
}

/// Writes a quoted string, or a literal when `s` is not ASCII.
pub fn write_string(wire: &mut Wire, s: &str) -> Result<()> {
    check_encodable(s)?;
    if s.is_ascii() {
        write_quoted(wire, s);
    } else {
        wire.literal(s.as_bytes());
    }
    Ok(())
}

/// CR, LF and NUL fit neither a quoted string nor a literal.
fn check_encodable(s: &str) -> Result<()> {
    if s.bytes().any(|b| matches!(b, b'\0' | b'\r' | b'\n')) {
        return Err(Error::InvalidArgument(
            "string contains CR, LF or NUL".to_string(),
        ));
    }
    Ok(())
}

fn write_quoted(wire: &mut Wire, s: &str) {
    wire.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            wire.push(b'\\');
        }
        wire.push(b);
    }
    wire.push(b'"');
}

const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b >= 0x7F
}

/// IMAP `date` form, e.g. `1-Feb-2024`.
pub fn write_date(wire: &mut Wire, date: NaiveDate) {
    wire.extend_from_slice(date.format("%-d-%b-%Y").to_string().as_bytes());
}

/// Writes a parenthesized flag list.
pub fn write_flag_list(wire: &mut Wire, flags: &[Flag]) {
    wire.push(b'(');
    for (i, flag) in flags.iter().enumerate() {
        if i > 0 {
            wire.push(b' ');
        }
        wire.extend_from_slice(flag.as_str().as_bytes());
    }
    wire.push(b')');
}

/// Writes FETCH items, parenthesized when there is more than one.
pub fn write_fetch_attributes(wire: &mut Wire, attrs: &[FetchAttribute]) {
    if let [single] = attrs {
        write_fetch_attribute(wire, single);
        return;
    }
    wire.push(b'(');
    for (i, attr) in attrs.iter().enumerate() {
        if i > 0 {
            wire.push(b' ');
        }
        write_fetch_attribute(wire, attr);
    }
    wire.push(b')');
}

fn write_fetch_attribute(wire: &mut Wire, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Flags => wire.extend_from_slice(b"FLAGS"),
        FetchAttribute::InternalDate => wire.extend_from_slice(b"INTERNALDATE"),
        FetchAttribute::Rfc822Size => wire.extend_from_slice(b"RFC822.SIZE"),
        FetchAttribute::Envelope => wire.extend_from_slice(b"ENVELOPE"),
        FetchAttribute::Uid => wire.extend_from_slice(b"UID"),
        FetchAttribute::BodySection {
            section,
            peek,
            partial,
        } => {
            let prefix: &[u8] = if *peek { b"BODY.PEEK[" } else { b"BODY[" };
            wire.extend_from_slice(prefix);
            if let Some(section) = section {
                wire.extend_from_slice(section.as_bytes());
            }
            wire.push(b']');
            if let Some((origin, len)) = partial {
                wire.extend_from_slice(format!("<{origin}.{len}>").as_bytes());
            }
        }
    }
}

/// Writes a search key. A top-level empty conjunction becomes `ALL`.
pub fn write_search_key(wire: &mut Wire, key: &SearchKey) -> Result<()> {
    match key {
        SearchKey::All => wire.extend_from_slice(b"ALL"),
        SearchKey::Seen => wire.extend_from_slice(b"SEEN"),
        SearchKey::Unseen => wire.extend_from_slice(b"UNSEEN"),
        SearchKey::Flagged => wire.extend_from_slice(b"FLAGGED"),
        SearchKey::Unflagged => wire.extend_from_slice(b"UNFLAGGED"),
        SearchKey::Answered => wire.extend_from_slice(b"ANSWERED"),
        SearchKey::Deleted => wire.extend_from_slice(b"DELETED"),
        SearchKey::Undeleted => wire.extend_from_slice(b"UNDELETED"),
        SearchKey::Draft => wire.extend_from_slice(b"DRAFT"),
        SearchKey::Recent => wire.extend_from_slice(b"RECENT"),
        SearchKey::Old => wire.extend_from_slice(b"OLD"),
        SearchKey::New => wire.extend_from_slice(b"NEW"),
        SearchKey::Keyword(flag) => keyed_atom(wire, "KEYWORD", flag)?,
        SearchKey::Unkeyword(flag) => keyed_atom(wire, "UNKEYWORD", flag)?,
        SearchKey::Header(field, value) => {
            wire.extend_from_slice(b"HEADER ");
            write_astring(wire, field)?;
            wire.push(b' ');
            write_string(wire, value)?;
        }
        SearchKey::Subject(s) => keyed_string(wire, "SUBJECT", s)?,
        SearchKey::From(s) => keyed_string(wire, "FROM", s)?,
        SearchKey::To(s) => keyed_string(wire, "TO", s)?,
        SearchKey::Cc(s) => keyed_string(wire, "CC", s)?,
        SearchKey::Body(s) => keyed_string(wire, "BODY", s)?,
        SearchKey::Text(s) => keyed_string(wire, "TEXT", s)?,
        SearchKey::Since(d) => keyed_date(wire, "SINCE", *d),
        SearchKey::Before(d) => keyed_date(wire, "BEFORE", *d),
        SearchKey::On(d) => keyed_date(wire, "ON", *d),
        SearchKey::SentSince(d) => keyed_date(wire, "SENTSINCE", *d),
        SearchKey::SentBefore(d) => keyed_date(wire, "SENTBEFORE", *d),
        SearchKey::SentOn(d) => keyed_date(wire, "SENTON", *d),
        SearchKey::Larger(n) => wire.extend_from_slice(format!("LARGER {n}").as_bytes()),
        SearchKey::Smaller(n) => wire.extend_from_slice(format!("SMALLER {n}").as_bytes()),
        SearchKey::Uid(set) => {
            wire.extend_from_slice(b"UID ");
            wire.extend_from_slice(set.to_string().as_bytes());
        }
        SearchKey::Sequence(set) => wire.extend_from_slice(set.to_string().as_bytes()),
        SearchKey::And(keys) => write_and(wire, keys)?,
        SearchKey::Or(a, b) => {
            wire.extend_from_slice(b"OR ");
            write_operand(wire, a)?;
            wire.push(b' ');
            write_operand(wire, b)?;
        }
        SearchKey::Not(inner) => {
            wire.extend_from_slice(b"NOT ");
            write_operand(wire, inner)?;
        }
    }
    Ok(())
}

fn write_and(wire: &mut Wire, keys: &[SearchKey]) -> Result<()> {
    if keys.is_empty() {
        wire.extend_from_slice(b"ALL");
        return Ok(());
    }
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            wire.push(b' ');
        }
        write_search_key(wire, key)?;
    }
    Ok(())
}

/// Operands of OR/NOT are single keys, so a conjunction needs parentheses.
fn write_operand(wire: &mut Wire, key: &SearchKey) -> Result<()> {
    match key {
        SearchKey::And(keys) if keys.len() > 1 => {
            wire.push(b'(');
            write_and(wire, keys)?;
            wire.push(b')');
            Ok(())
        }
        _ => write_search_key(wire, key),
    }
}

fn keyed_string(wire: &mut Wire, keyword: &str, value: &str) -> Result<()> {
    wire.extend_from_slice(keyword.as_bytes());
    wire.push(b' ');
    write_string(wire, value)
}

fn keyed_atom(wire: &mut Wire, keyword: &str, value: &str) -> Result<()> {
    wire.extend_from_slice(keyword.as_bytes());
    wire.push(b' ');
    write_astring(wire, value)
}

fn keyed_date(wire: &mut Wire, keyword: &str, date: NaiveDate) {
    wire.extend_from_slice(keyword.as_bytes());
    wire.push(b' ');
    write_date(wire, date);
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

    #[test]
    fn test_ascii_stays_quoted() {
        let mut wire = Wire::default();
        write_string(&mut wire, "a \"b\"").unwrap();
        assert!(!wire.has_literals());
        assert_eq!(wire.into_bytes(), b"\"a \\\"b\\\"\"");
    }

    #[test]
    fn test_non_ascii_becomes_literal() {
        let mut wire = Wire::default();
        wire.extend_from_slice(b"FROM ");
        write_string(&mut wire, "Müller").unwrap();
        wire.extend_from_slice(b" SEEN\r\n");
        let segments = wire.into_segments();
        assert_eq!(
            segments,
            vec![b"FROM {7}\r\n".to_vec(), "Müller SEEN\r\n".as_bytes().to_vec()]
        );
    }

    #[test]
    fn test_line_breaks_are_refused() {
        let mut wire = Wire::default();
        let error = write_string(&mut wire, "a\r\nb").unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
        assert!(write_astring(&mut wire, "nul\0").is_err());
    }

    #[test]
    fn test_segments_without_literals() {
        let mut wire = Wire::default();
        wire.extend_from_slice(b"A1 NOOP\r\n");
        assert_eq!(wire.into_segments(), vec![b"A1 NOOP\r\n".to_vec()]);
    }
}
