//! CLC Proposal message body.
//!
//! The Proposal is the only variable-length CLC message: a fixed block
//! (peer ID, RoCE GID and MAC, offset to the IP area), an optional SMC-D
//! info block, then an IPv4 prefix and zero or more 17-byte IPv6 prefix
//! entries. The declared IP-area offset and IPv6 prefix count come off the
//! wire and are re-checked against the total message length before every
//! variable-size read.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::warn;

use crate::dump::hex_dump;
use crate::header::{HEADER_LEN, Header, Mac, PEER_ID_LEN, PeerId, TRAILER_LEN, hex_bytes};

/// Minimum total length of a Proposal message in bytes.
pub const PROPOSAL_MIN_LEN: u16 = 52;

/// Size of one IPv6 prefix entry: a 16-byte prefix plus its length.
const IPV6_PREFIX_LEN: usize = 17;

/// `ip_area_offset` value signalling that an SMC-D info block is present.
const SMCD_INFO_OFFSET: u16 = 40;

const IPV4_LEN: usize = 4;
const IPV6_LEN: usize = 16;
const MAC_LEN: usize = 6;

/// One IPv6 prefix entry from the proposal's prefix array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Prefix {
    pub prefix: Ipv6Addr,
    pub prefix_len: u8,
}

impl fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.prefix_len)
    }
}

/// Decoded CLC Proposal body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub sender_peer_id: PeerId,
    /// GID of the sender's RoCE port, an IPv6 address on the wire.
    pub ib_gid: Ipv6Addr,
    pub ib_mac: Mac,
    /// Offset from here to the IP area; 40 means an SMC-D block follows.
    pub ip_area_offset: u16,
    pub smcd_gid: u64,
    pub reserved: [u8; 32],
    pub prefix: Ipv4Addr,
    pub prefix_len: u8,
    pub reserved2: [u8; 2],
    pub ipv6_prefix_count: u8,
    pub ipv6_prefixes: Vec<Ipv6Prefix>,
}

impl Proposal {
    /// Decodes a Proposal body from a full message buffer.
    ///
    /// Malformations are logged with a hex dump and yield `None`; an IPv6
    /// prefix count that would run past the declared length truncates the
    /// prefix array instead of rejecting the message.
    pub fn decode(header: &Header, buf: &[u8]) -> Option<Proposal> {
        let length = header.length as usize;
        if header.length < PROPOSAL_MIN_LEN {
            warn!(
                "error parsing CLC Proposal: message too short\n{}",
                hex_dump(&buf[..length])
            );
            return None;
        }

        let mut skip = HEADER_LEN;

        let sender_peer_id = PeerId::from_slice(&buf[skip..]);
        skip += PEER_ID_LEN;

        let mut gid = [0u8; IPV6_LEN];
        gid.copy_from_slice(&buf[skip..skip + IPV6_LEN]);
        let ib_gid = Ipv6Addr::from(gid);
        skip += IPV6_LEN;

        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&buf[skip..skip + MAC_LEN]);
        let ib_mac = Mac(mac);
        skip += MAC_LEN;

        let ip_area_offset = u16::from_be_bytes([buf[skip], buf[skip + 1]]);
        skip += 2;

        // Optional SMC-D info block; any other offset skips to the IP area.
        // The IP area (IPv4 prefix + length + reserved + IPv6 count) and the
        // trailer must still fit inside the declared length after the skip.
        let ip_area_len = IPV4_LEN + 1 + 2 + 1 + TRAILER_LEN;
        let mut smcd_gid = 0u64;
        let mut reserved = [0u8; 32];
        if ip_area_offset == SMCD_INFO_OFFSET {
            if length.saturating_sub(skip) < SMCD_INFO_OFFSET as usize + ip_area_len {
                warn!(
                    "error parsing CLC Proposal: IP Area Offset too big\n{}",
                    hex_dump(&buf[..length])
                );
                return None;
            }
            let mut gid = [0u8; 8];
            gid.copy_from_slice(&buf[skip..skip + 8]);
            smcd_gid = u64::from_be_bytes(gid);
            skip += 8;
            reserved.copy_from_slice(&buf[skip..skip + 32]);
            skip += 32;
        } else {
            skip += ip_area_offset as usize;
        }

        if length.saturating_sub(skip) < ip_area_len {
            warn!(
                "error parsing CLC Proposal: IP Area Offset too big\n{}",
                hex_dump(&buf[..length])
            );
            return None;
        }

        let mut v4 = [0u8; IPV4_LEN];
        v4.copy_from_slice(&buf[skip..skip + IPV4_LEN]);
        let prefix = Ipv4Addr::from(v4);
        skip += IPV4_LEN;

        let prefix_len = buf[skip];
        skip += 1;

        let mut reserved2 = [0u8; 2];
        reserved2.copy_from_slice(&buf[skip..skip + 2]);
        skip += 2;

        let ipv6_prefix_count = buf[skip];

        // The count is advisory; stop early rather than read past the
        // declared message length.
        let mut ipv6_prefixes = Vec::new();
        for _ in 0..ipv6_prefix_count {
            // step over the count byte or the previous prefix length
            skip += 1;

            if length.saturating_sub(skip) < IPV6_PREFIX_LEN + TRAILER_LEN {
                warn!(
                    "error parsing CLC Proposal: IPv6 prefix count too big\n{}",
                    hex_dump(&buf[..length])
                );
                break;
            }

            let mut v6 = [0u8; IPV6_LEN];
            v6.copy_from_slice(&buf[skip..skip + IPV6_LEN]);
            skip += IPV6_LEN;

            ipv6_prefixes.push(Ipv6Prefix {
                prefix: Ipv6Addr::from(v6),
                prefix_len: buf[skip],
            });
        }

        Some(Proposal {
            sender_peer_id,
            ib_gid,
            ib_mac,
            ip_area_offset,
            smcd_gid,
            reserved,
            prefix,
            prefix_len,
            reserved2,
            ipv6_prefix_count,
            ipv6_prefixes,
        })
    }

    pub(crate) fn render(&self, show_reserved: bool) -> String {
        let mut prefixes = String::new();
        for prefix in &self.ipv6_prefixes {
            prefixes.push_str(&format!(", IPv6 Prefix: {prefix}"));
        }

        if show_reserved {
            format!(
                "Peer ID: {}, SMC-R GID: {}, RoCE MAC: {}, IP Area Offset: {}, \
                 SMC-D GID: {}, Reserved: {}, IPv4 Prefix: {}/{}, Reserved: {}, \
                 IPv6 Prefix Count: {}{}",
                self.sender_peer_id,
                self.ib_gid,
                self.ib_mac,
                self.ip_area_offset,
                self.smcd_gid,
                hex_bytes(&self.reserved),
                self.prefix,
                self.prefix_len,
                hex_bytes(&self.reserved2),
                self.ipv6_prefix_count,
                prefixes
            )
        } else {
            format!(
                "Peer ID: {}, SMC-R GID: {}, RoCE MAC: {}, IP Area Offset: {}, \
                 SMC-D GID: {}, IPv4 Prefix: {}/{}, IPv6 Prefix Count: {}{}",
                self.sender_peer_id,
                self.ib_gid,
                self.ib_mac,
                self.ip_area_offset,
                self.smcd_gid,
                self.prefix,
                self.prefix_len,
                self.ipv6_prefix_count,
                prefixes
            )
        }
    }
}
