//! Lexer tokens.

/// A token of a server response.
///
/// Literal payloads borrow from the framed response buffer, so a token never
/// outlives the response it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom, including flag atoms such as `\Seen` and `\*`.
    Atom(&'a str),
    /// Quoted string with escapes resolved.
    Quoted(String),
    /// Literal payload (`{n}\r\n` followed by n bytes).
    Literal(&'a [u8]),
    /// All-digit atom.
    Number(u64),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// A single space.
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `NIL`, any case.
    Nil,
    /// `\r\n`
    Crlf,
    /// End of input.
    Eof,
}
