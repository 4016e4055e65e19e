//! CLC Decline message body.

use std::fmt;

use tracing::warn;

use crate::dump::hex_dump;
use crate::header::{HEADER_LEN, Header, PEER_ID_LEN, PeerId, hex_bytes};

/// Total length of a Decline message in bytes.
pub const DECLINE_LEN: u16 = 28;

/// Peer diagnosis codes as used by the Linux SMC implementation.
fn diagnosis_text(code: u32) -> &'static str {
    match code {
        0x0101_0000 => "insufficient memory resources",
        0x0201_0000 => "timeout w4 QP confirm link",
        0x0202_0000 => "timeout w4 QP add link",
        0x0300_0000 => "configuration error",
        0x0301_0000 => "peer did not indicate SMC",
        0x0302_0000 => "IPsec usage",
        0x0303_0000 => "no SMC device found (R or D)",
        0x0303_0001 => "no SMC-D device found",
        0x0303_0002 => "no SMC-R device found",
        0x0303_0003 => "SMC-D dev can't talk to peer",
        0x0304_0000 => "smc modes do not match (R or D)",
        0x0305_0000 => "peer has eyecatcher in RMBE",
        0x0306_0000 => "fastopen sockopt not supported",
        0x0307_0000 => "IP prefix / subnet mismatch",
        0x0308_0000 => "err to get vlan id of ip device",
        0x0309_0000 => "err to reg vlan id on ism dev",
        0x0400_0000 => "synchronization error",
        0x0500_0000 => "peer declined during handshake",
        0x0999_0000 => "internal error",
        0x0999_0001 => "rtoken handling failed",
        0x0999_0002 => "ib ready link failed",
        0x0999_0003 => "reg rmb failed",
        _ => "Unknown",
    }
}

/// Decoded CLC Decline body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decline {
    pub sender_peer_id: PeerId,
    pub peer_diagnosis: u32,
    pub reserved: [u8; 4],
}

impl Decline {
    pub fn decode(header: &Header, buf: &[u8]) -> Option<Decline> {
        let length = header.length as usize;
        if header.length < DECLINE_LEN {
            warn!(
                "error parsing CLC Decline: message too short\n{}",
                hex_dump(&buf[..length])
            );
            return None;
        }

        let mut skip = HEADER_LEN;

        let sender_peer_id = PeerId::from_slice(&buf[skip..]);
        skip += PEER_ID_LEN;

        let mut diag = [0u8; 4];
        diag.copy_from_slice(&buf[skip..skip + 4]);
        let peer_diagnosis = u32::from_be_bytes(diag);
        skip += 4;

        let mut reserved = [0u8; 4];
        reserved.copy_from_slice(&buf[skip..skip + 4]);

        Some(Decline {
            sender_peer_id,
            peer_diagnosis,
            reserved,
        })
    }

    pub(crate) fn render(&self, show_reserved: bool) -> String {
        let diagnosis = format!(
            "{:#x} ({})",
            self.peer_diagnosis,
            diagnosis_text(self.peer_diagnosis)
        );
        if show_reserved {
            format!(
                "Peer ID: {}, Peer Diagnosis: {}, Reserved: {}",
                self.sender_peer_id,
                diagnosis,
                hex_bytes(&self.reserved)
            )
        } else {
            format!(
                "Peer ID: {}, Peer Diagnosis: {}",
                self.sender_peer_id, diagnosis
            )
        }
    }
}

impl fmt::Display for Decline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}
