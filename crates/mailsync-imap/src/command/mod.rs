//! Client commands and their wire encoding.

mod serialize;
mod tag;
mod types;

use crate::types::{Flag, SequenceSet, StatusItem, Tag};

pub use serialize::Wire;
pub use tag::TagGenerator;
pub use types::{FetchAttribute, SearchKey, StoreMode};

use crate::Result;
use serialize::{
    write_astring, write_fetch_attributes, write_flag_list, write_search_key, write_string,
};

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPABILITY`
    Capability,
    /// `NOOP`
    Noop,
    /// `LOGOUT`
    Logout,
    /// `STARTTLS`
    StartTls,
    /// `LOGIN <user> <password>`
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `AUTHENTICATE <mechanism> [<initial response>]`
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Base64 initial response, sent inline (SASL-IR).
        initial_response: Option<String>,
    },
    /// `LIST <reference> <pattern>`
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern with `*`/`%` wildcards.
        pattern: String,
    },
    /// `STATUS <mailbox> (<items>)`
    Status {
        /// Mailbox name.
        mailbox: String,
        /// Requested items.
        items: Vec<StatusItem>,
    },
    /// `SELECT <mailbox>`
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// `EXAMINE <mailbox>`: read-only SELECT.
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// `CLOSE`
    Close,
    /// `[UID] SEARCH <key>`
    Search {
        /// Search key.
        key: SearchKey,
        /// Return UIDs instead of sequence numbers.
        uid: bool,
    },
    /// `[UID] FETCH <set> <items>`
    Fetch {
        /// Messages to fetch.
        set: SequenceSet,
        /// Data items.
        items: Vec<FetchAttribute>,
        /// `set` holds UIDs.
        uid: bool,
    },
    /// `[UID] STORE <set> <mode>[.SILENT] (<flags>)`
    Store {
        /// Messages to modify.
        set: SequenceSet,
        /// Combination mode.
        mode: StoreMode,
        /// Flags to apply.
        flags: Vec<Flag>,
        /// Suppress the untagged FETCH echo.
        silent: bool,
        /// `set` holds UIDs.
        uid: bool,
    },
    /// `IDLE`
    Idle,
}

impl Command {
    /// Encodes the command with its tag and trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument)
    /// when a string argument contains CR, LF or NUL.
    pub fn encode(&self, tag: &Tag) -> Result<Wire> {
        let mut buf = Wire::default();
        buf.extend_from_slice(tag.as_str().as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username)?;
                buf.push(b' ');
                write_astring(&mut buf, password)?;
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(response) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is spelled "=".
                    if response.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(response.as_bytes());
                    }
                }
            }
            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_string(&mut buf, reference)?;
                buf.push(b' ');
                write_string(&mut buf, pattern)?;
            }
            Self::Status { mailbox, items } => {
                buf.extend_from_slice(b"STATUS ");
                write_astring(&mut buf, mailbox)?;
                buf.extend_from_slice(b" (");
                let names: Vec<&str> = items.iter().map(|i| i.as_str()).collect();
                buf.extend_from_slice(names.join(" ").as_bytes());
                buf.push(b')');
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox)?;
            }
            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox)?;
            }
            Self::Search { key, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"SEARCH ");
                if !key.is_ascii() {
                    buf.extend_from_slice(b"CHARSET UTF-8 ");
                }
                write_search_key(&mut buf, key)?;
            }
            Self::Fetch { set, items, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_attributes(&mut buf, items);
            }
            Self::Store {
                set,
                mode,
                flags,
                silent,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"STORE ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(mode.keyword().as_bytes());
                if *silent {
                    buf.extend_from_slice(b".SILENT");
                }
                buf.push(b' ');
                write_flag_list(&mut buf, flags);
            }
        }

        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }

    /// Encodes the command into a single buffer, literals inline.
    ///
    /// # Errors
    ///
    /// Same as [`encode`](Self::encode).
    pub fn serialize(&self, tag: &Tag) -> Result<Vec<u8>> {
        self.encode(tag).map(Wire::into_bytes)
    }

    /// Command name for logs. Never includes arguments, so credentials
    /// cannot leak through tracing output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::List { .. } => "LIST",
            Self::Status { .. } => "STATUS",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Close => "CLOSE",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Idle => "IDLE",
        }
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
    use chrono::NaiveDate;

    use super::*;

    fn wire(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize(&Tag::new("A1")).unwrap()).unwrap()
    }

    mod basic_tests {
        use super::*;

        #[test]
        fn simple_commands() {
            assert_eq!(wire(&Command::Noop), "A1 NOOP\r\n");
            assert_eq!(wire(&Command::Idle), "A1 IDLE\r\n");
            assert_eq!(wire(&Command::Logout), "A1 LOGOUT\r\n");
        }

        #[test]
        fn login_quotes_when_needed() {
            let cmd = Command::Login {
                username: "user@example.com".into(),
                password: "pa ss\"word".into(),
            };
            assert_eq!(wire(&cmd), "A1 LOGIN user@example.com \"pa ss\\\"word\"\r\n");
        }

        #[test]
        fn authenticate_with_initial_response() {
            let cmd = Command::Authenticate {
                mechanism: "XOAUTH2".into(),
                initial_response: Some("dXNlcj0=".into()),
            };
            assert_eq!(wire(&cmd), "A1 AUTHENTICATE XOAUTH2 dXNlcj0=\r\n");
        }

        #[test]
        fn list_quotes_both_arguments() {
            let cmd = Command::List {
                reference: String::new(),
                pattern: "*".into(),
            };
            assert_eq!(wire(&cmd), "A1 LIST \"\" \"*\"\r\n");
        }

        #[test]
        fn examine_and_select() {
            let select = Command::Select {
                mailbox: "INBOX".into(),
            };
            let examine = Command::Examine {
                mailbox: "Sent Items".into(),
            };
            assert_eq!(wire(&select), "A1 SELECT INBOX\r\n");
            assert_eq!(wire(&examine), "A1 EXAMINE \"Sent Items\"\r\n");
        }

        #[test]
        fn status_items() {
            let cmd = Command::Status {
                mailbox: "INBOX".into(),
                items: vec![StatusItem::Messages, StatusItem::UidValidity],
            };
            assert_eq!(wire(&cmd), "A1 STATUS INBOX (MESSAGES UIDVALIDITY)\r\n");
        }

        #[test]
        fn non_ascii_password_is_a_literal() {
            let cmd = Command::Login {
                username: "ann".into(),
                password: "pässword".into(),
            };
            let segments = cmd.encode(&Tag::new("A1")).unwrap().into_segments();
            assert_eq!(segments.len(), 2);
            assert_eq!(segments[0], b"A1 LOGIN ann {9}\r\n");
            assert_eq!(segments[1], "pässword\r\n".as_bytes());
        }

        #[test]
        fn name_hides_arguments() {
            let cmd = Command::Login {
                username: "u".into(),
                password: "secret".into(),
            };
            assert_eq!(cmd.name(), "LOGIN");
        }
    }

    mod search_tests {
        use super::*;

        fn date(y: i32, m: u32, d: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(y, m, d).unwrap()
        }

        #[test]
        fn empty_conjunction_is_all() {
            let cmd = Command::Search {
                key: SearchKey::And(vec![]),
                uid: true,
            };
            assert_eq!(wire(&cmd), "A1 UID SEARCH ALL\r\n");
        }

        #[test]
        fn sent_since_date_format() {
            let cmd = Command::Search {
                key: SearchKey::SentSince(date(2024, 2, 1)),
                uid: false,
            };
            assert_eq!(wire(&cmd), "A1 SEARCH SENTSINCE 1-Feb-2024\r\n");
        }

        #[test]
        fn header_value_is_quoted() {
            let cmd = Command::Search {
                key: SearchKey::Header("Message-ID".into(), "<abc@host>".into()),
                uid: true,
            };
            assert_eq!(wire(&cmd), "A1 UID SEARCH HEADER Message-ID \"<abc@host>\"\r\n");
        }

        #[test]
        fn nested_or_and_not() {
            let key = SearchKey::And(vec![
                SearchKey::or(
                    SearchKey::From("a".into()),
                    SearchKey::or(SearchKey::From("b".into()), SearchKey::From("c".into())),
                ),
                SearchKey::negate(SearchKey::And(vec![SearchKey::Seen, SearchKey::Flagged])),
            ]);
            let cmd = Command::Search { key, uid: false };
            assert_eq!(
                wire(&cmd),
                "A1 SEARCH OR FROM \"a\" OR FROM \"b\" FROM \"c\" NOT (SEEN FLAGGED)\r\n"
            );
        }

        #[test]
        fn non_ascii_value_uses_charset_and_literal() {
            let cmd = Command::Search {
                key: SearchKey::And(vec![SearchKey::From("Müller".into()), SearchKey::Unseen]),
                uid: true,
            };
            let segments = cmd.encode(&Tag::new("A1")).unwrap().into_segments();
            assert_eq!(
                segments,
                vec![
                    b"A1 UID SEARCH CHARSET UTF-8 FROM {7}\r\n".to_vec(),
                    "Müller UNSEEN\r\n".as_bytes().to_vec(),
                ]
            );
        }

        #[test]
        fn line_break_in_value_is_an_error() {
            let cmd = Command::Search {
                key: SearchKey::Subject("a\r\nA2 LOGOUT".into()),
                uid: false,
            };
            assert!(matches!(
                cmd.serialize(&Tag::new("A1")),
                Err(crate::Error::InvalidArgument(_))
            ));
        }

        #[test]
        fn recent_keys() {
            let key = SearchKey::And(vec![SearchKey::Recent, SearchKey::negate(SearchKey::Old)]);
            let cmd = Command::Search { key, uid: false };
            assert_eq!(wire(&cmd), "A1 SEARCH RECENT NOT OLD\r\n");
        }
    }

    mod fetch_store_tests {
        use super::*;

        #[test]
        fn uid_fetch_with_peek() {
            let cmd = Command::Fetch {
                set: SequenceSet::from_numbers([2, 3]).unwrap(),
                items: vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Envelope,
                    FetchAttribute::body_peek(),
                ],
                uid: true,
            };
            assert_eq!(wire(&cmd), "A1 UID FETCH 2:3 (UID ENVELOPE BODY.PEEK[])\r\n");
        }

        #[test]
        fn single_item_is_not_parenthesized() {
            let cmd = Command::Fetch {
                set: SequenceSet::All,
                items: vec![FetchAttribute::Flags],
                uid: false,
            };
            assert_eq!(wire(&cmd), "A1 FETCH 1:* FLAGS\r\n");
        }

        #[test]
        fn partial_section() {
            let cmd = Command::Fetch {
                set: SequenceSet::single(1).unwrap(),
                items: vec![FetchAttribute::BodySection {
                    section: Some("HEADER".into()),
                    peek: false,
                    partial: Some((0, 512)),
                }],
                uid: false,
            };
            assert_eq!(wire(&cmd), "A1 FETCH 1 BODY[HEADER]<0.512>\r\n");
        }

        #[test]
        fn silent_flag_store() {
            let cmd = Command::Store {
                set: SequenceSet::single(7).unwrap(),
                mode: StoreMode::Add,
                flags: vec![Flag::Flagged],
                silent: true,
                uid: true,
            };
            assert_eq!(wire(&cmd), "A1 UID STORE 7 +FLAGS.SILENT (\\Flagged)\r\n");
        }
    }
}
