//! Core IMAP value types.

mod capability;
mod flags;
mod ids;
mod mailbox;
mod response_code;
mod sequence;

pub use capability::{Capabilities, Capability, Status};
pub use flags::{Flag, Flags};
pub use ids::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{ListEntry, MailboxAttribute, MailboxStatus, StatusData, StatusItem};
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;
