//! Sans-I/O parser for server responses.
//!
//! The parser never touches the network: it receives one framed response
//! (line plus literals) and returns a [`Response`].
//!
//! ```
//! use mailsync_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{
    Address, Envelope, FetchItem, Response, ResponseParser, UntaggedResponse, parse_internal_date,
};
