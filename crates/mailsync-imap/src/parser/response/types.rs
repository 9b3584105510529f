//! Parsed response structures.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

use crate::types::{
    Capability, Flags, ListEntry, ResponseCode, SeqNum, Status, StatusData, Tag, Uid,
};

/// One complete server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Completion of a command.
    Tagged {
        /// Tag of the completed command.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Optional bracketed code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Server data.
    Untagged(UntaggedResponse),
    /// `+` continuation request.
    Continuation {
        /// Text after the `+`; base64 challenge during AUTHENTICATE.
        text: String,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// `* OK`
    Ok {
        /// Bracketed code.
        code: Option<ResponseCode>,
        /// Text.
        text: String,
    },
    /// `* NO`
    No {
        /// Bracketed code.
        code: Option<ResponseCode>,
        /// Text.
        text: String,
    },
    /// `* BAD`
    Bad {
        /// Bracketed code.
        code: Option<ResponseCode>,
        /// Text.
        text: String,
    },
    /// `* PREAUTH` greeting.
    PreAuth {
        /// Bracketed code.
        code: Option<ResponseCode>,
        /// Text.
        text: String,
    },
    /// `* BYE`
    Bye {
        /// Bracketed code.
        code: Option<ResponseCode>,
        /// Text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* LIST ...`
    List(ListEntry),
    /// `* FLAGS (...)`
    Flags(Flags),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(SeqNum),
    /// `* n FETCH (...)`
    Fetch {
        /// Sequence number of the message.
        seq: SeqNum,
        /// Data items in server order.
        items: Vec<FetchItem>,
    },
    /// `* SEARCH ...`: sequence numbers or UIDs depending on the command.
    Search(Vec<u32>),
    /// `* STATUS ...`
    Status(StatusData),
    /// Any other untagged data, identified by its keyword.
    Other(String),
}

/// A FETCH data item.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    /// `FLAGS`
    Flags(Flags),
    /// `UID`
    Uid(Uid),
    /// `RFC822.SIZE`
    Rfc822Size(u32),
    /// `INTERNALDATE`
    InternalDate(DateTime<FixedOffset>),
    /// `ENVELOPE`
    Envelope(Box<Envelope>),
    /// `BODY[section]<origin>`. `data` is `None` when the server sent NIL.
    Body {
        /// Section specifier, `None` for the whole message.
        section: Option<String>,
        /// Partial origin.
        origin: Option<u32>,
        /// Literal payload.
        data: Option<Bytes>,
    },
    /// `MODSEQ`
    ModSeq(u64),
}

/// The ENVELOPE structure, fields as sent by the server.
///
/// Text fields are not MIME-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// `Date:` header.
    pub date: Option<String>,
    /// `Subject:` header.
    pub subject: Option<String>,
    /// `From:`
    pub from: Vec<Address>,
    /// `Sender:`
    pub sender: Vec<Address>,
    /// `Reply-To:`
    pub reply_to: Vec<Address>,
    /// `To:`
    pub to: Vec<Address>,
    /// `Cc:`
    pub cc: Vec<Address>,
    /// `Bcc:`
    pub bcc: Vec<Address>,
    /// `In-Reply-To:`
    pub in_reply_to: Option<String>,
    /// `Message-ID:`
    pub message_id: Option<String>,
}

/// An address from an ENVELOPE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route, obsolete.
    pub adl: Option<String>,
    /// Local part. With `host == None` this marks a group boundary.
    pub mailbox: Option<String>,
    /// Domain.
    pub host: Option<String>,
}

impl Address {
    /// `local@domain`, if both halves are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => Some(format!("{mailbox}@{host}")),
            _ => None,
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
    use super::*;

    #[test]
    fn address_email() {
        let addr = Address {
            name: Some("Ann".into()),
            adl: None,
            mailbox: Some("ann".into()),
            host: Some("example.com".into()),
        };
        assert_eq!(addr.email().as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn group_marker_has_no_email() {
        let addr = Address {
            mailbox: Some("undisclosed-recipients".into()),
            ..Address::default()
        };
        assert!(addr.email().is_none());
    }
}
