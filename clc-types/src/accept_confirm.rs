//! CLC Accept and Confirm message bodies.
//!
//! Accept and Confirm share one layout per SMC flavor: the SMC-R shape
//! carries the RDMA queue-pair parameters and RMB location, the SMC-D shape
//! the ISM GID, DMB token and link id. Which shape applies is chosen by the
//! header's path bits, not by the message type.

use std::fmt;
use std::net::Ipv6Addr;

use tracing::warn;

use crate::dump::hex_dump;
use crate::header::{HEADER_LEN, Header, Mac, PEER_ID_LEN, PeerId, hex_bytes};

/// Total length of an SMC-R Accept/Confirm message in bytes.
pub const SMCR_ACCEPT_CONFIRM_LEN: u16 = 68;

/// Total length of an SMC-D Accept/Confirm message in bytes.
pub const SMCD_ACCEPT_CONFIRM_LEN: u16 = 48;

/// Compressed RMBE/DMBE buffer size: the wire nibble `n` means `1 << (n + 14)` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmbeSize(pub u8);

impl fmt::Display for RmbeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, 1u32 << (self.0 + 14))
    }
}

/// Compressed QP MTU nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpMtu(pub u8);

impl fmt::Display for QpMtu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mtu = match self.0 {
            1 => "256",
            2 => "512",
            3 => "1024",
            4 => "2048",
            5 => "4096",
            _ => "reserved",
        };
        write!(f, "{} ({})", self.0, mtu)
    }
}

/// Decoded SMC-R Accept/Confirm body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmcrAcceptConfirm {
    pub sender_peer_id: PeerId,
    pub ib_gid: Ipv6Addr,
    pub ib_mac: Mac,
    /// QP number, 3 bytes on the wire.
    pub qpn: u32,
    pub rmb_rkey: u32,
    /// Index of the RMBE within the RMB.
    pub rmbe_idx: u8,
    /// Unique connection id.
    pub rmbe_alert_token: u32,
    pub rmbe_size: RmbeSize,
    pub qp_mtu: QpMtu,
    pub reserved: u8,
    /// RMB virtual address.
    pub rmb_dma_addr: u64,
    pub reserved2: u8,
    /// Packet sequence number, 3 bytes on the wire.
    pub psn: u32,
}

impl SmcrAcceptConfirm {
    pub fn decode(header: &Header, buf: &[u8]) -> Option<SmcrAcceptConfirm> {
        let length = header.length as usize;
        if header.length < SMCR_ACCEPT_CONFIRM_LEN {
            warn!(
                "error parsing CLC {}: message too short\n{}",
                header.typ,
                hex_dump(&buf[..length])
            );
            return None;
        }

        let mut skip = HEADER_LEN;

        let sender_peer_id = PeerId::from_slice(&buf[skip..]);
        skip += PEER_ID_LEN;

        let mut gid = [0u8; 16];
        gid.copy_from_slice(&buf[skip..skip + 16]);
        let ib_gid = Ipv6Addr::from(gid);
        skip += 16;

        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[skip..skip + 6]);
        let ib_mac = Mac(mac);
        skip += 6;

        let qpn = u32::from_be_bytes([0, buf[skip], buf[skip + 1], buf[skip + 2]]);
        skip += 3;

        let mut rkey = [0u8; 4];
        rkey.copy_from_slice(&buf[skip..skip + 4]);
        let rmb_rkey = u32::from_be_bytes(rkey);
        skip += 4;

        let rmbe_idx = buf[skip];
        skip += 1;

        let mut token = [0u8; 4];
        token.copy_from_slice(&buf[skip..skip + 4]);
        let rmbe_alert_token = u32::from_be_bytes(token);
        skip += 4;

        // 1 byte bitfield: rmbe size (4 bits), qp mtu (4 bits)
        let rmbe_size = RmbeSize((buf[skip] & 0b1111_0000) >> 4);
        let qp_mtu = QpMtu(buf[skip] & 0b0000_1111);
        skip += 1;

        let reserved = buf[skip];
        skip += 1;

        let mut dma = [0u8; 8];
        dma.copy_from_slice(&buf[skip..skip + 8]);
        let rmb_dma_addr = u64::from_be_bytes(dma);
        skip += 8;

        let reserved2 = buf[skip];
        skip += 1;

        let psn = u32::from_be_bytes([0, buf[skip], buf[skip + 1], buf[skip + 2]]);

        Some(SmcrAcceptConfirm {
            sender_peer_id,
            ib_gid,
            ib_mac,
            qpn,
            rmb_rkey,
            rmbe_idx,
            rmbe_alert_token,
            rmbe_size,
            qp_mtu,
            reserved,
            rmb_dma_addr,
            reserved2,
            psn,
        })
    }

    pub(crate) fn render(&self, show_reserved: bool) -> String {
        if show_reserved {
            format!(
                "Peer ID: {}, SMC-R GID: {}, RoCE MAC: {}, QP Number: {}, RMB RKey: {}, \
                 RMBE Index: {}, RMBE Alert Token: {}, RMBE Size: {}, QP MTU: {}, \
                 Reserved: {:#x}, RMB Virtual Address: {:#x}, Reserved: {:#x}, \
                 Packet Sequence Number: {}",
                self.sender_peer_id,
                self.ib_gid,
                self.ib_mac,
                self.qpn,
                self.rmb_rkey,
                self.rmbe_idx,
                self.rmbe_alert_token,
                self.rmbe_size,
                self.qp_mtu,
                self.reserved,
                self.rmb_dma_addr,
                self.reserved2,
                self.psn
            )
        } else {
            format!(
                "Peer ID: {}, SMC-R GID: {}, RoCE MAC: {}, QP Number: {}, RMB RKey: {}, \
                 RMBE Index: {}, RMBE Alert Token: {}, RMBE Size: {}, QP MTU: {}, \
                 RMB Virtual Address: {:#x}, Packet Sequence Number: {}",
                self.sender_peer_id,
                self.ib_gid,
                self.ib_mac,
                self.qpn,
                self.rmb_rkey,
                self.rmbe_idx,
                self.rmbe_alert_token,
                self.rmbe_size,
                self.qp_mtu,
                self.rmb_dma_addr,
                self.psn
            )
        }
    }
}

/// Decoded SMC-D Accept/Confirm body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmcdAcceptConfirm {
    /// ISM GID of the sender.
    pub smcd_gid: u64,
    /// DMB token.
    pub smcd_token: u64,
    pub dmbe_idx: u8,
    pub dmbe_size: RmbeSize,
    /// Low nibble of the size bitfield.
    pub reserved: u8,
    pub reserved2: [u8; 2],
    pub link_id: u32,
    pub reserved3: [u8; 12],
}

impl SmcdAcceptConfirm {
    pub fn decode(header: &Header, buf: &[u8]) -> Option<SmcdAcceptConfirm> {
        let length = header.length as usize;
        if header.length < SMCD_ACCEPT_CONFIRM_LEN {
            warn!(
                "error parsing CLC {}: message too short\n{}",
                header.typ,
                hex_dump(&buf[..length])
            );
            return None;
        }

        let mut skip = HEADER_LEN;

        let mut gid = [0u8; 8];
        gid.copy_from_slice(&buf[skip..skip + 8]);
        let smcd_gid = u64::from_be_bytes(gid);
        skip += 8;

        let mut token = [0u8; 8];
        token.copy_from_slice(&buf[skip..skip + 8]);
        let smcd_token = u64::from_be_bytes(token);
        skip += 8;

        let dmbe_idx = buf[skip];
        skip += 1;

        // 1 byte bitfield: dmbe size (4 bits), reserved (4 bits)
        let dmbe_size = RmbeSize((buf[skip] & 0b1111_0000) >> 4);
        let reserved = buf[skip] & 0b0000_1111;
        skip += 1;

        let mut reserved2 = [0u8; 2];
        reserved2.copy_from_slice(&buf[skip..skip + 2]);
        skip += 2;

        let mut link = [0u8; 4];
        link.copy_from_slice(&buf[skip..skip + 4]);
        let link_id = u32::from_be_bytes(link);
        skip += 4;

        let mut reserved3 = [0u8; 12];
        reserved3.copy_from_slice(&buf[skip..skip + 12]);

        Some(SmcdAcceptConfirm {
            smcd_gid,
            smcd_token,
            dmbe_idx,
            dmbe_size,
            reserved,
            reserved2,
            link_id,
            reserved3,
        })
    }

    pub(crate) fn render(&self, show_reserved: bool) -> String {
        if show_reserved {
            format!(
                "SMC-D GID: {}, SMC-D Token: {}, DMBE Index: {}, DMBE Size: {}, \
                 Reserved: {:#x}, Reserved: {}, Link ID: {}, Reserved: {}",
                self.smcd_gid,
                self.smcd_token,
                self.dmbe_idx,
                self.dmbe_size,
                self.reserved,
                hex_bytes(&self.reserved2),
                self.link_id,
                hex_bytes(&self.reserved3)
            )
        } else {
            format!(
                "SMC-D GID: {}, SMC-D Token: {}, DMBE Index: {}, DMBE Size: {}, Link ID: {}",
                self.smcd_gid, self.smcd_token, self.dmbe_idx, self.dmbe_size, self.link_id
            )
        }
    }
}
