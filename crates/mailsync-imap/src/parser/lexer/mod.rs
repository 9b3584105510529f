//! Tokenizer for framed server responses.
//!
//! The input is one complete response as produced by
//! [`FramedStream`](crate::connection::FramedStream): the response line plus
//! any literals it announced, ending in CRLF.

mod token;

pub use token::Token;

use crate::{Error, Result};

/// Byte cursor over one response.
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at the start of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true once all input is consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Next byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Consumes one byte.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Consumes up to `n` bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Consumes the next byte if it equals `byte`.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Reads the next token.
    ///
    /// # Errors
    ///
    /// Returns a parse error on bytes that cannot start a token, an
    /// unterminated quoted string, or a truncated literal.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        let simple = match byte {
            b' ' => Some(Token::Space),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b'*' => Some(Token::Asterisk),
            b'+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = simple {
            self.pos += 1;
            return Ok(token);
        }

        match byte {
            b'\r' if self.peek_at(1) == Some(b'\n') => {
                self.pos += 2;
                Ok(Token::Crlf)
            }
            // Tolerate bare LF from sloppy servers.
            b'\n' => {
                self.pos += 1;
                Ok(Token::Crlf)
            }
            b'"' => self.read_quoted(),
            b'{' => self.read_literal(),
            _ if is_atom_char(byte) => Ok(self.scan_atom()),
            _ => Err(self.error(&format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn read_quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(b'\r' | b'\n') | None => {
                    return Err(self.error("unterminated quoted string"));
                }
                Some(c) => out.push(c),
            }
        }
        // Servers put raw 8-bit text in quoted strings; keep what we can.
        Ok(Token::Quoted(String::from_utf8_lossy(&out).into_owned()))
    }

    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("invalid literal length"))?;
        let len: usize = digits
            .parse()
            .map_err(|_| self.error("invalid literal length"))?;
        // Non-synchronizing marker from LITERAL+ servers.
        self.eat(b'+');
        if !self.eat(b'}') {
            return Err(self.error("expected '}' after literal length"));
        }
        self.eat(b'\r');
        if !self.eat(b'\n') {
            return Err(self.error("expected CRLF after literal length"));
        }
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("literal truncated"))?;
        let data = &self.input[self.pos..end];
        self.pos = end;
        Ok(Token::Literal(data))
    }

    fn scan_atom(&mut self) -> Token<'a> {
        let start = self.pos;
        // `\*` is a complete flag even though `*` is not an atom char.
        if self.peek() == Some(b'\\') && self.peek_at(1) == Some(b'*') {
            self.pos += 2;
        } else {
            while self.peek().is_some_and(is_atom_char) {
                self.pos += 1;
            }
        }
        let bytes = &self.input[start..self.pos];
        // Atom chars are ASCII, so this cannot fail.
        let atom = std::str::from_utf8(bytes).unwrap_or_default();

        if atom.eq_ignore_ascii_case("NIL") {
            Token::Nil
        } else if bytes.iter().all(u8::is_ascii_digit) {
            atom.parse().map_or(Token::Atom(atom), Token::Number)
        } else {
            Token::Atom(atom)
        }
    }

    /// Builds a parse error at the current position.
    #[must_use]
    pub fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes a token of the same kind as `expected`.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the next token is of a different kind.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}, got {token:?}")))
        }
    }

    /// Consumes a single space.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the next token is not a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads an atom, string or literal as text.
    ///
    /// # Errors
    ///
    /// Returns a parse error for any other token.
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::Quoted(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(data).into_owned()),
            token => Err(self.error(&format!("expected string, got {token:?}"))),
        }
    }

    /// Reads `NIL` or a string.
    ///
    /// # Errors
    ///
    /// Returns a parse error for any other token.
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::Quoted(s) => Ok(Some(s)),
            Token::Literal(data) => Ok(Some(String::from_utf8_lossy(data).into_owned())),
            token => Err(self.error(&format!("expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number that fits in 32 bits.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the next token is not a number or is too large.
    pub fn read_number(&mut self) -> Result<u32> {
        let n = self.read_number64()?;
        u32::try_from(n).map_err(|_| self.error("number out of range"))
    }

    /// Reads a 63-bit number such as a mod-sequence.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the next token is not a number.
    pub fn read_number64(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("expected number, got {token:?}"))),
        }
    }

    /// Reads an atom.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the next token is not an atom.
    pub fn read_atom(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("expected atom, got {token:?}"))),
        }
    }

    /// Consumes everything up to CRLF and returns it as text.
    pub fn read_text_line(&mut self) -> String {
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(rest.len());
        self.pos += end;
        self.eat(b'\r');
        self.eat(b'\n');
        String::from_utf8_lossy(&rest[..end]).into_owned()
    }

    /// Skips one complete value: atom, string, literal or balanced list.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the value is truncated.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_token()? {
                Token::LParen | Token::LBracket => depth += 1,
                Token::RParen | Token::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Space if depth > 0 => {}
                Token::Crlf | Token::Eof => {
                    return if depth == 0 {
                        Ok(())
                    } else {
                        Err(self.error("unbalanced list"))
                    };
                }
                _ if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }
}

/// Returns true for bytes allowed inside an atom.
///
/// `\` is accepted so flags such as `\Seen` lex as one atom.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    match b {
        b'(' | b')' | b'{' | b' ' | b'%' | b'*' | b'"' | b']' | b'[' => false,
        0x00..=0x1F | 0x7F..=0xFF => false,
        _ => true,
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

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn untagged_ok() {
        assert_eq!(
            tokens(b"* OK ready\r\n"),
            vec![
                Token::Asterisk,
                Token::Space,
                Token::Atom("OK"),
                Token::Space,
                Token::Atom("ready"),
                Token::Crlf
            ]
        );
    }

    #[test]
    fn flags_including_wildcard() {
        assert_eq!(
            tokens(b"(\\Seen \\*)"),
            vec![
                Token::LParen,
                Token::Atom("\\Seen"),
                Token::Space,
                Token::Atom("\\*"),
                Token::RParen
            ]
        );
    }

    #[test]
    fn read_atom_expects_an_atom() {
        let mut lexer = Lexer::new(b"FLAGS 12");
        assert_eq!(lexer.read_atom().unwrap(), "FLAGS");
        lexer.next_token().unwrap();
        assert!(lexer.read_atom().is_err());
    }

    #[test]
    fn numbers_and_nil() {
        assert_eq!(
            tokens(b"42 nil 18446744073709551615"),
            vec![
                Token::Number(42),
                Token::Space,
                Token::Nil,
                Token::Space,
                Token::Number(u64::MAX)
            ]
        );
    }

    #[test]
    fn quoted_with_escapes() {
        let mut lexer = Lexer::new(br#""a \"b\" \\c""#);
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::Quoted("a \"b\" \\c".to_string())
        );
    }

    #[test]
    fn unterminated_quote_fails() {
        let mut lexer = Lexer::new(b"\"abc\r\n");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn literal_borrows_payload() {
        let mut lexer = Lexer::new(b"{5}\r\nhello)");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"hello"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn truncated_literal_fails() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn body_section_splits_on_brackets() {
        assert_eq!(
            tokens(b"BODY[]"),
            vec![Token::Atom("BODY"), Token::LBracket, Token::RBracket]
        );
    }

    #[test]
    fn skip_nested_value() {
        let mut lexer = Lexer::new(b"(a (b {3}\r\n))))) rest");
        lexer.skip_value().unwrap();
        assert_eq!(lexer.remaining(), b" rest");
    }

    #[test]
    fn text_line() {
        let mut lexer = Lexer::new(b"some [text] here\r\n");
        assert_eq!(lexer.read_text_line(), "some [text] here");
        assert!(lexer.is_eof());
    }
}
