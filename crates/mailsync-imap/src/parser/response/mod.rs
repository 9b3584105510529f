//! Response parser.

mod fetch;
mod helpers;
mod types;

pub use fetch::parse_internal_date;
pub use types::{Address, Envelope, FetchItem, Response, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_capability_data, parse_flag_list, parse_list, parse_response_code, parse_search,
    parse_status,
};

/// Stateless parser over one framed response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response, literals included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the response does not follow the grammar.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);
        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => {
                lexer.eat(b' ');
                Ok(Response::Continuation {
                    text: lexer.read_text_line(),
                })
            }
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            Token::Number(n) => Self::parse_tagged(&mut lexer, &n.to_string()),
            token => Err(Error::Parse {
                position: 0,
                message: format!("expected '*', '+' or a tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = Self::parse_status_word(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;
        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;
        let untagged = match lexer.next_token()? {
            Token::Atom(keyword) => Self::parse_keyword_data(lexer, keyword)?,
            Token::Number(n) => Self::parse_message_data(lexer, n)?,
            token => return Err(lexer.error(&format!("unexpected {token:?} after '*'"))),
        };
        Ok(Response::Untagged(untagged))
    }

    fn parse_keyword_data(lexer: &mut Lexer<'_>, keyword: &str) -> Result<UntaggedResponse> {
        let upper = keyword.to_ascii_uppercase();
        let data = match upper.as_str() {
            "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                let (code, text) = Self::parse_resp_text(lexer)?;
                match upper.as_str() {
                    "OK" => UntaggedResponse::Ok { code, text },
                    "NO" => UntaggedResponse::No { code, text },
                    "BAD" => UntaggedResponse::Bad { code, text },
                    "PREAUTH" => UntaggedResponse::PreAuth { code, text },
                    _ => UntaggedResponse::Bye { code, text },
                }
            }
            "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
            "FLAGS" => {
                lexer.expect_space()?;
                UntaggedResponse::Flags(parse_flag_list(lexer)?)
            }
            "LIST" | "LSUB" => {
                lexer.expect_space()?;
                UntaggedResponse::List(parse_list(lexer)?)
            }
            "SEARCH" => UntaggedResponse::Search(parse_search(lexer)?),
            "STATUS" => {
                lexer.expect_space()?;
                UntaggedResponse::Status(parse_status(lexer)?)
            }
            _ => UntaggedResponse::Other(upper),
        };
        Ok(data)
    }

    fn parse_message_data(lexer: &mut Lexer<'_>, n: u64) -> Result<UntaggedResponse> {
        let n = u32::try_from(n).map_err(|_| lexer.error("message number out of range"))?;
        lexer.expect_space()?;
        let keyword = lexer.read_atom()?.to_ascii_uppercase();
        let seq = SeqNum::new(n);

        match keyword.as_str() {
            "EXISTS" => Ok(UntaggedResponse::Exists(n)),
            "RECENT" => Ok(UntaggedResponse::Recent(n)),
            "EXPUNGE" => seq
                .map(UntaggedResponse::Expunge)
                .ok_or_else(|| lexer.error("sequence number must not be zero")),
            "FETCH" => {
                let seq = seq.ok_or_else(|| lexer.error("sequence number must not be zero"))?;
                lexer.expect_space()?;
                let items = fetch::parse_fetch_items(lexer)?;
                Ok(UntaggedResponse::Fetch { seq, items })
            }
            _ => Ok(UntaggedResponse::Other(keyword)),
        }
    }

    fn parse_status_word(lexer: &mut Lexer<'_>) -> Result<Status> {
        let word = lexer.read_atom()?;
        match word.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("invalid status {word}"))),
        }
    }

    /// `[SP ["[" code "]" SP] text]`. Some servers omit the text entirely.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        lexer.eat(b' ');
        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };
        lexer.eat(b' ');
        Ok((code, lexer.read_text_line()))
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
    use crate::types::{Capability, Flag, MailboxAttribute, UidValidity};

    fn untagged(input: &[u8]) -> UntaggedResponse {
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(u) => u,
            other => panic!("expected untagged, got {other:?}"),
        }
    }

    mod status_response_tests {
        use super::*;

        #[test]
        fn greeting() {
            let UntaggedResponse::Ok { code, text } = untagged(b"* OK IMAP4rev1 ready\r\n")
            else {
                panic!("expected OK");
            };
            assert!(code.is_none());
            assert_eq!(text, "IMAP4rev1 ready");
        }

        #[test]
        fn tagged_with_code() {
            let response = ResponseParser::parse(b"A0003 OK [READ-ONLY] EXAMINE done\r\n").unwrap();
            assert_eq!(
                response,
                Response::Tagged {
                    tag: Tag::new("A0003"),
                    status: Status::Ok,
                    code: Some(ResponseCode::ReadOnly),
                    text: "EXAMINE done".into(),
                }
            );
        }

        #[test]
        fn tagged_without_text() {
            let response = ResponseParser::parse(b"A1 OK\r\n").unwrap();
            assert!(matches!(
                response,
                Response::Tagged { status: Status::Ok, .. }
            ));
        }

        #[test]
        fn tagged_no() {
            let Response::Tagged { status, code, .. } =
                ResponseParser::parse(b"A2 NO [NONEXISTENT] No such mailbox\r\n").unwrap()
            else {
                panic!("expected tagged");
            };
            assert_eq!(status, Status::No);
            assert_eq!(code, Some(ResponseCode::NonExistent));
        }

        #[test]
        fn uidvalidity_code() {
            let UntaggedResponse::Ok { code, .. } = untagged(b"* OK [UIDVALIDITY 1] UIDs valid\r\n")
            else {
                panic!("expected OK");
            };
            assert_eq!(
                code,
                Some(ResponseCode::UidValidity(UidValidity::new(1).unwrap()))
            );
        }

        #[test]
        fn permanent_flags_with_wildcard() {
            let UntaggedResponse::Ok { code, .. } =
                untagged(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n")
            else {
                panic!("expected OK");
            };
            let Some(ResponseCode::PermanentFlags(flags)) = code else {
                panic!("expected PERMANENTFLAGS");
            };
            assert!(flags.contains(&Flag::MayCreate));
            assert_eq!(flags.len(), 3);
        }

        #[test]
        fn unknown_code_with_arguments() {
            let UntaggedResponse::Ok { code, text } =
                untagged(b"* OK [COPYUID 38505 304,319 3956:3958] Done\r\n")
            else {
                panic!("expected OK");
            };
            assert_eq!(code, Some(ResponseCode::Other("COPYUID".into())));
            assert_eq!(text, "Done");
        }

        #[test]
        fn continuation() {
            let response = ResponseParser::parse(b"+ idling\r\n").unwrap();
            assert_eq!(
                response,
                Response::Continuation {
                    text: "idling".into()
                }
            );
            let bare = ResponseParser::parse(b"+\r\n").unwrap();
            assert_eq!(bare, Response::Continuation { text: String::new() });
        }
    }

    mod data_response_tests {
        use super::*;

        #[test]
        fn capability() {
            let UntaggedResponse::Capability(caps) =
                untagged(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN\r\n")
            else {
                panic!("expected capability");
            };
            assert_eq!(
                caps,
                vec![
                    Capability::Imap4Rev1,
                    Capability::Idle,
                    Capability::Auth("PLAIN".into())
                ]
            );
        }

        #[test]
        fn list() {
            let UntaggedResponse::List(entry) =
                untagged(b"* LIST (\\HasNoChildren \\Sent) \"/\" \"Sent Items\"\r\n")
            else {
                panic!("expected list");
            };
            assert_eq!(entry.name, "Sent Items");
            assert_eq!(entry.delimiter, Some('/'));
            assert!(entry.attributes.contains(&MailboxAttribute::Sent));
        }

        #[test]
        fn list_with_nil_delimiter_and_literal_name() {
            let UntaggedResponse::List(entry) = untagged(b"* LIST () NIL {5}\r\nCaf\xc3\xa9\r\n")
            else {
                panic!("expected list");
            };
            assert_eq!(entry.delimiter, None);
            assert_eq!(entry.name, "Café");
        }

        #[test]
        fn search() {
            assert_eq!(
                untagged(b"* SEARCH 2 3 10\r\n"),
                UntaggedResponse::Search(vec![2, 3, 10])
            );
            assert_eq!(untagged(b"* SEARCH\r\n"), UntaggedResponse::Search(vec![]));
        }

        #[test]
        fn status() {
            let UntaggedResponse::Status(data) =
                untagged(b"* STATUS INBOX (MESSAGES 3 UIDVALIDITY 1 UIDNEXT 4)\r\n")
            else {
                panic!("expected status");
            };
            assert_eq!(data.mailbox, "INBOX");
            assert_eq!(data.messages, Some(3));
            assert_eq!(data.uid_validity.map(UidValidity::get), Some(1));
            assert_eq!(data.unseen, None);
        }

        #[test]
        fn message_counts() {
            assert_eq!(untagged(b"* 23 EXISTS\r\n"), UntaggedResponse::Exists(23));
            assert_eq!(untagged(b"* 0 RECENT\r\n"), UntaggedResponse::Recent(0));
            assert_eq!(
                untagged(b"* 5 EXPUNGE\r\n"),
                UntaggedResponse::Expunge(SeqNum::new(5).unwrap())
            );
        }

        #[test]
        fn expunge_zero_is_error() {
            assert!(ResponseParser::parse(b"* 0 EXPUNGE\r\n").is_err());
        }

        #[test]
        fn fetch_flags() {
            let UntaggedResponse::Fetch { seq, items } =
                untagged(b"* 12 FETCH (FLAGS (\\Seen))\r\n")
            else {
                panic!("expected fetch");
            };
            assert_eq!(seq.get(), 12);
            assert_eq!(items.len(), 1);
        }

        #[test]
        fn unknown_untagged_is_tolerated() {
            assert_eq!(
                untagged(b"* ENABLED CONDSTORE\r\n"),
                UntaggedResponse::Other("ENABLED".into())
            );
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn garbage() {
            assert!(ResponseParser::parse(b"(((\r\n").is_err());
        }

        #[test]
        fn bad_status_word() {
            assert!(ResponseParser::parse(b"A1 MAYBE done\r\n").is_err());
        }
    }
}
