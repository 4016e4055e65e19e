//! Captured-packet parsing types.

use bytes::Bytes;

use crate::flow::{NetFlow, TransportFlow};

pub mod parser;

/// Link-layer framing of a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Ethernet II, optionally 802.1Q tagged.
    Ethernet,
    /// Linux cooked capture (SLL), as produced by the "any" device.
    LinuxSll,
    /// BSD loopback: a 4-byte host-order address-family word.
    Null,
    /// Raw IP with no link header.
    Raw,
}

/// A parsed TCP packet: flow identity, sequencing state and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpPacket {
    pub net: NetFlow,
    pub transport: TransportFlow,
    pub seq: u32,
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    /// True when the header carried the SMC TCP option.
    pub smc_option: bool,
    pub payload: Bytes,
}

/// Parsing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    TooShort,
    InvalidHeader,
    UnsupportedLinkType,
    UnsupportedEtherType,
    UnsupportedProtocol,
    Fragmented,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::TooShort => write!(f, "packet too short"),
            ParseError::InvalidHeader => write!(f, "invalid header"),
            ParseError::UnsupportedLinkType => write!(f, "unsupported link type"),
            ParseError::UnsupportedEtherType => write!(f, "unsupported ether type"),
            ParseError::UnsupportedProtocol => write!(f, "unsupported protocol"),
            ParseError::Fragmented => write!(f, "fragmented packet"),
        }
    }
}

impl std::error::Error for ParseError {}
