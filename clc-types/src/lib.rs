//! Wire format of the SMC (RFC 7609) CLC handshake.
//!
//! Every SMC connection starts life as a plain TCP connection whose peers
//! exchange up to four Connection Layer Control messages before switching to
//! the RDMA (SMC-R) or direct-memory (SMC-D) path: Proposal, Accept, Confirm
//! and Decline. Each message is bracketed by a 4-byte "eyecatcher" marker,
//! carries an 8-byte header with its total length, and closes with a 4-byte
//! trailer repeating an eyecatcher.
//!
//! This crate decodes those messages from raw bytes and renders them as
//! one-line transcripts. It performs no I/O; malformed input is reported
//! through `tracing` and dropped, never propagated as a panic or error to
//! the caller.

mod accept_confirm;
mod decline;
mod dump;
mod eyecatcher;
mod header;
mod message;
mod proposal;

pub use accept_confirm::{
    QpMtu, RmbeSize, SMCD_ACCEPT_CONFIRM_LEN, SMCR_ACCEPT_CONFIRM_LEN, SmcdAcceptConfirm,
    SmcrAcceptConfirm,
};
pub use decline::{DECLINE_LEN, Decline};
pub use dump::hex_dump;
pub use eyecatcher::{
    EYECATCHER_LEN, Eyecatcher, SMCD_EYECATCHER, SMCR_EYECATCHER, SmcVariant, is_eyecatcher,
};
pub use header::{
    HEADER_LEN, Header, HeaderError, MAX_MESSAGE_SIZE, Mac, MsgType, PEER_ID_LEN, Path, PeerId,
    TRAILER_LEN,
};
pub use message::{Body, ClcMessage, MessageKind, dispatch};
pub use proposal::{Ipv6Prefix, PROPOSAL_MIN_LEN, Proposal};
