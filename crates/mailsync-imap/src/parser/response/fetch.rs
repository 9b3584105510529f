//! FETCH data items.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

use crate::Result;
use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;

use super::helpers::parse_flag_list;
use super::types::{Address, Envelope, FetchItem};

/// Parses the parenthesized item list of a FETCH response.
///
/// Items this client never requests are skipped. An INTERNALDATE the
/// parser cannot read is dropped rather than failing the whole message.
pub fn parse_fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;
    let mut items = Vec::new();

    loop {
        let name = match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => name,
            token => return Err(lexer.error(&format!("unexpected {token:?} in FETCH"))),
        };

        match name.to_ascii_uppercase().as_str() {
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(parse_flag_list(lexer)?));
            }
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.read_number()?;
                let uid = Uid::new(n).ok_or_else(|| lexer.error("UID must not be zero"))?;
                items.push(FetchItem::Uid(uid));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Size(lexer.read_number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                if let Some(date) = lexer.read_nstring()?.as_deref().and_then(parse_internal_date)
                {
                    items.push(FetchItem::InternalDate(date));
                } else {
                    tracing::debug!("dropping unreadable INTERNALDATE");
                }
            }
            "ENVELOPE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Envelope(Box::new(parse_envelope(lexer)?)));
            }
            "MODSEQ" => {
                lexer.expect_space()?;
                lexer.expect(Token::LParen)?;
                let n = lexer.read_number64()?;
                lexer.expect(Token::RParen)?;
                items.push(FetchItem::ModSeq(n));
            }
            "BODY" | "BODY.PEEK" if lexer.peek() == Some(b'[') => {
                let (section, origin) = parse_section_and_origin(lexer)?;
                lexer.expect_space()?;
                let data = match lexer.next_token()? {
                    Token::Literal(d) => Some(Bytes::copy_from_slice(d)),
                    Token::Quoted(s) => Some(Bytes::from(s.into_bytes())),
                    Token::Nil => None,
                    token => {
                        return Err(lexer.error(&format!("expected body data, got {token:?}")));
                    }
                };
                items.push(FetchItem::Body {
                    section,
                    origin,
                    data,
                });
            }
            "RFC822" => {
                lexer.expect_space()?;
                let data = match lexer.next_token()? {
                    Token::Literal(d) => Some(Bytes::copy_from_slice(d)),
                    _ => None,
                };
                items.push(FetchItem::Body {
                    section: None,
                    origin: None,
                    data,
                });
            }
            _ => {
                if lexer.peek() == Some(b'[') {
                    parse_section_and_origin(lexer)?;
                }
                lexer.expect_space()?;
                lexer.skip_value()?;
            }
        }
    }

    Ok(items)
}

/// Reads `[section]` and an optional `<origin>` following BODY.
fn parse_section_and_origin(lexer: &mut Lexer<'_>) -> Result<(Option<String>, Option<u32>)> {
    lexer.expect(Token::LBracket)?;
    let mut section = Vec::new();
    loop {
        match lexer.advance() {
            Some(b']') => break,
            Some(b) => section.push(b),
            None => return Err(lexer.error("unterminated body section")),
        }
    }

    let mut origin = None;
    if lexer.eat(b'<') {
        let mut digits = String::new();
        while let Some(b) = lexer.peek().filter(u8::is_ascii_digit) {
            digits.push(char::from(b));
            lexer.advance();
        }
        if !lexer.eat(b'>') {
            return Err(lexer.error("unterminated partial origin"));
        }
        origin = digits.parse().ok();
    }

    let section = (!section.is_empty()).then(|| String::from_utf8_lossy(&section).into_owned());
    Ok((section, origin))
}

/// Parses `dd-Mon-yyyy hh:mm:ss +zzzz`; the day may be space-padded.
#[must_use]
pub fn parse_internal_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

/// Parses an ENVELOPE structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;
    let date = lexer.read_nstring()?;
    lexer.expect_space()?;
    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;
    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;
    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;
    let message_id = lexer.read_nstring()?;
    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();
            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b' ') => {
                        lexer.advance();
                    }
                    Some(b'(') => addresses.push(parse_address(lexer)?),
                    _ => return Err(lexer.error("malformed address list")),
                }
            }
            Ok(addresses)
        }
        token => Err(lexer.error(&format!("expected address list, got {token:?}"))),
    }
}

fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;
    let name = lexer.read_nstring()?;
    lexer.expect_space()?;
    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;
    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;
    let host = lexer.read_nstring()?;
    lexer.expect(Token::RParen)?;
    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
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
    use chrono::{Datelike, Timelike};

    use super::*;
    use crate::types::Flag;

    fn items(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_items(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn flags_and_uid() {
        let parsed = items(b"(UID 42 FLAGS (\\Seen $Label))");
        assert_eq!(parsed[0], FetchItem::Uid(Uid::new(42).unwrap()));
        let FetchItem::Flags(flags) = &parsed[1] else {
            panic!("expected flags");
        };
        assert!(flags.is_seen());
        assert!(flags.contains(&Flag::Keyword("$Label".into())));
    }

    #[test]
    fn body_literal() {
        let parsed = items(b"(BODY[] {11}\r\nhello world)");
        assert_eq!(
            parsed,
            vec![FetchItem::Body {
                section: None,
                origin: None,
                data: Some(Bytes::from_static(b"hello world")),
            }]
        );
    }

    #[test]
    fn body_nil_is_kept_as_missing() {
        let parsed = items(b"(UID 3 BODY[] NIL)");
        assert!(matches!(parsed[1], FetchItem::Body { data: None, .. }));
    }

    #[test]
    fn section_and_origin() {
        let parsed = items(b"(BODY[HEADER.FIELDS (SUBJECT)]<0> \"Subject: x\")");
        let FetchItem::Body {
            section, origin, ..
        } = &parsed[0]
        else {
            panic!("expected body");
        };
        assert_eq!(section.as_deref(), Some("HEADER.FIELDS (SUBJECT)"));
        assert_eq!(*origin, Some(0));
    }

    #[test]
    fn internal_date_with_padded_day() {
        let parsed = items(b"(INTERNALDATE \" 7-Mar-2024 09:05:01 +0100\")");
        let FetchItem::InternalDate(date) = parsed[0] else {
            panic!("expected date");
        };
        assert_eq!(date.day(), 7);
        assert_eq!(date.hour(), 9);
        assert_eq!(date.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn bad_internal_date_is_dropped() {
        assert!(items(b"(INTERNALDATE \"yesterday\" UID 1)").len() == 1);
    }

    #[test]
    fn envelope() {
        let parsed = items(
            b"(ENVELOPE (\"Mon, 1 Jan 2024 10:00:00 +0000\" \"Hi\" \
              ((\"Ann\" NIL \"ann\" \"example.com\")) NIL NIL \
              ((NIL NIL \"bob\" \"example.org\")) NIL NIL NIL \"<id@x>\"))",
        );
        let FetchItem::Envelope(env) = &parsed[0] else {
            panic!("expected envelope");
        };
        assert_eq!(env.subject.as_deref(), Some("Hi"));
        assert_eq!(env.from[0].email().as_deref(), Some("ann@example.com"));
        assert_eq!(env.to[0].mailbox.as_deref(), Some("bob"));
        assert!(env.cc.is_empty());
        assert_eq!(env.message_id.as_deref(), Some("<id@x>"));
    }

    #[test]
    fn unknown_items_are_skipped() {
        let parsed = items(b"(X-GM-LABELS (\\Inbox \"a b\") BINARY[1] {2}\r\nab UID 9)");
        assert_eq!(parsed, vec![FetchItem::Uid(Uid::new(9).unwrap())]);
    }
}
