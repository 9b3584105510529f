//! Parsers for response codes, flag lists, LIST, SEARCH and STATUS data.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListEntry, MailboxAttribute, ResponseCode, SeqNum, StatusData, Uid,
    UidValidity,
};
use crate::{Error, Result};

fn nonzero<T>(lexer: &Lexer<'_>, value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| lexer.error(&format!("{what} must not be zero")))
}

/// Parses `[CODE args]`. Unknown codes are kept by name and their
/// arguments skipped.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;
    let atom = lexer.read_atom()?;

    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NONEXISTENT" => ResponseCode::NonExistent,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "CLOSED" => ResponseCode::Closed,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidNext(nonzero(lexer, Uid::new(n), "UIDNEXT")?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidValidity(nonzero(lexer, UidValidity::new(n), "UIDVALIDITY")?)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::Unseen(nonzero(lexer, SeqNum::new(n), "UNSEEN")?)
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?.into_iter().collect())
        }
        _ => ResponseCode::Other(atom.to_string()),
    };

    // Skip arguments of unknown codes, e.g. `[COPYUID 1 2 3]`.
    while !matches!(lexer.peek(), Some(b']' | b'\r' | b'\n') | None) {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;
    Ok(code)
}

/// Parses the space-separated atoms after `CAPABILITY`.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.eat(b' ') {
        match lexer.next_token()? {
            Token::Atom(s) => caps.push(Capability::parse(s)),
            Token::Number(n) => caps.push(Capability::Other(n.to_string())),
            _ => break,
        }
    }
    Ok(caps)
}

/// Parses `(flag flag ...)`.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;
    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => {
                flags.insert(Flag::parse(s));
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected {token:?} in flag list"),
                });
            }
        }
    }
    Ok(flags)
}

/// Parses LIST data: `(attrs) "delim" name`.
pub fn parse_list(lexer: &mut Lexer<'_>) -> Result<ListEntry> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            token => {
                return Err(lexer.error(&format!("unexpected {token:?} in LIST attributes")));
            }
        }
    }
    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::Quoted(s) => s.chars().next(),
        token => return Err(lexer.error(&format!("expected delimiter, got {token:?}"))),
    };
    lexer.expect_space()?;
    let name = lexer.read_astring()?;

    Ok(ListEntry {
        attributes,
        delimiter,
        name,
    })
}

/// Parses the numbers after `SEARCH`. Zeros are dropped.
pub fn parse_search(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();
    while lexer.eat(b' ') {
        match lexer.next_token()? {
            Token::Number(n) => {
                if let Ok(n) = u32::try_from(n)
                    && n != 0
                {
                    numbers.push(n);
                }
            }
            // `(MODSEQ n)` trailer from CONDSTORE servers.
            Token::LParen => {
                while !matches!(lexer.next_token()?, Token::RParen | Token::Eof) {}
            }
            Token::Crlf | Token::Eof => break,
            _ => {}
        }
    }
    Ok(numbers)
}

/// Parses STATUS data: `name (ITEM n ...)`.
pub fn parse_status(lexer: &mut Lexer<'_>) -> Result<StatusData> {
    let mailbox = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut data = StatusData {
        mailbox,
        ..StatusData::default()
    };
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                lexer.expect_space()?;
                let value = lexer.read_number64()?;
                let small = u32::try_from(value).ok();
                match name.to_ascii_uppercase().as_str() {
                    "MESSAGES" => data.messages = small,
                    "RECENT" => data.recent = small,
                    "UNSEEN" => data.unseen = small,
                    "UIDNEXT" => data.uid_next = small.and_then(Uid::new),
                    "UIDVALIDITY" => data.uid_validity = small.and_then(UidValidity::new),
                    _ => {}
                }
            }
            token => return Err(lexer.error(&format!("unexpected {token:?} in STATUS"))),
        }
    }
    Ok(data)
}
