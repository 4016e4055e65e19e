//! Link/IP/TCP parser for captured packet data.
//!
//! The parser walks from the link layer down to TCP, extracts the flow
//! 5-tuple, sequencing flags and payload, and checks the TCP options for
//! the SMC opt-in marker. Anything that is not well-formed TCP over
//! IPv4/IPv6 is rejected with a [`ParseError`] and silently skipped by the
//! caller.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use clc_types::SMCR_EYECATCHER;

use crate::flow::{NetFlow, TransportFlow};
use crate::packet::{LinkKind, ParseError, TcpPacket};

const ETH_LEN: usize = 14;
const SLL_LEN: usize = 16;
const NULL_LEN: usize = 4;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

const IPPROTO_TCP: u8 = 6;

const TCP_FLAG_FIN: u8 = 0x01;
const TCP_FLAG_SYN: u8 = 0x02;
const TCP_FLAG_RST: u8 = 0x04;
const TCP_FLAG_ACK: u8 = 0x10;

/// TCP option kind of the experimental SMC marker.
const TCPOPT_SMC: u8 = 254;
/// Total length of the SMC option: kind, length, 4-byte eyecatcher.
const TCPOPT_SMC_LEN: u8 = 6;

/// Parses one captured packet down to TCP.
pub fn parse_packet(link: LinkKind, data: &[u8]) -> Result<TcpPacket, ParseError> {
    let mut offset = 0;

    let ether_type = match link {
        LinkKind::Ethernet => parse_ethernet(data, &mut offset)?,
        LinkKind::LinuxSll => parse_sll(data, &mut offset)?,
        LinkKind::Null => parse_null(data, &mut offset)?,
        LinkKind::Raw => match data.first() {
            Some(b) if b >> 4 == 4 => ETHERTYPE_IPV4,
            Some(b) if b >> 4 == 6 => ETHERTYPE_IPV6,
            _ => return Err(ParseError::InvalidHeader),
        },
    };

    let (src, dst, end) = match ether_type {
        ETHERTYPE_IPV4 => parse_ipv4(data, &mut offset)?,
        ETHERTYPE_IPV6 => parse_ipv6(data, &mut offset)?,
        _ => return Err(ParseError::UnsupportedEtherType),
    };

    parse_tcp(data, offset, end, src, dst)
}

fn parse_ethernet(data: &[u8], offset: &mut usize) -> Result<u16, ParseError> {
    if data.len() < ETH_LEN {
        return Err(ParseError::TooShort);
    }
    let mut ether_type = u16::from_be_bytes([data[12], data[13]]);
    *offset = ETH_LEN;

    // step over up to two VLAN tags
    for _ in 0..2 {
        if ether_type != ETHERTYPE_VLAN && ether_type != ETHERTYPE_QINQ {
            break;
        }
        if data.len() < *offset + 4 {
            return Err(ParseError::TooShort);
        }
        ether_type = u16::from_be_bytes([data[*offset + 2], data[*offset + 3]]);
        *offset += 4;
    }
    Ok(ether_type)
}

fn parse_sll(data: &[u8], offset: &mut usize) -> Result<u16, ParseError> {
    if data.len() < SLL_LEN {
        return Err(ParseError::TooShort);
    }
    *offset = SLL_LEN;
    Ok(u16::from_be_bytes([data[14], data[15]]))
}

fn parse_null(data: &[u8], offset: &mut usize) -> Result<u16, ParseError> {
    if data.len() < NULL_LEN {
        return Err(ParseError::TooShort);
    }
    *offset = NULL_LEN;
    // the address family word is in host byte order; 2 is AF_INET everywhere,
    // AF_INET6 differs per BSD so accept the usual values
    match u32::from_ne_bytes([data[0], data[1], data[2], data[3]]) {
        2 => Ok(ETHERTYPE_IPV4),
        24 | 28 | 30 => Ok(ETHERTYPE_IPV6),
        _ => Err(ParseError::UnsupportedEtherType),
    }
}

fn parse_ipv4(data: &[u8], offset: &mut usize) -> Result<(IpAddr, IpAddr, usize), ParseError> {
    let start = *offset;
    if data.len() < start + 20 {
        return Err(ParseError::TooShort);
    }
    if data[start] >> 4 != 4 {
        return Err(ParseError::InvalidHeader);
    }
    let ihl = ((data[start] & 0x0F) as usize) * 4;
    if ihl < 20 || data.len() < start + ihl {
        return Err(ParseError::InvalidHeader);
    }

    // more-fragments set or a fragment offset: reassembly is out of scope
    let frag = u16::from_be_bytes([data[start + 6], data[start + 7]]);
    if frag & 0x3FFF != 0 {
        return Err(ParseError::Fragmented);
    }

    if data[start + 9] != IPPROTO_TCP {
        return Err(ParseError::UnsupportedProtocol);
    }

    // the IP total length trims link-layer padding off the payload
    let total_len = u16::from_be_bytes([data[start + 2], data[start + 3]]) as usize;
    if total_len < ihl || data.len() < start + total_len {
        return Err(ParseError::InvalidHeader);
    }

    let src = IpAddr::V4(Ipv4Addr::new(
        data[start + 12],
        data[start + 13],
        data[start + 14],
        data[start + 15],
    ));
    let dst = IpAddr::V4(Ipv4Addr::new(
        data[start + 16],
        data[start + 17],
        data[start + 18],
        data[start + 19],
    ));

    *offset = start + ihl;
    Ok((src, dst, start + total_len))
}

fn parse_ipv6(data: &[u8], offset: &mut usize) -> Result<(IpAddr, IpAddr, usize), ParseError> {
    let start = *offset;
    if data.len() < start + 40 {
        return Err(ParseError::TooShort);
    }
    if data[start] >> 4 != 6 {
        return Err(ParseError::InvalidHeader);
    }

    // extension headers are not walked; a handshake capture has none
    if data[start + 6] != IPPROTO_TCP {
        return Err(ParseError::UnsupportedProtocol);
    }

    let payload_len = u16::from_be_bytes([data[start + 4], data[start + 5]]) as usize;
    if data.len() < start + 40 + payload_len {
        return Err(ParseError::InvalidHeader);
    }

    let mut src = [0u8; 16];
    src.copy_from_slice(&data[start + 8..start + 24]);
    let mut dst = [0u8; 16];
    dst.copy_from_slice(&data[start + 24..start + 40]);

    *offset = start + 40;
    Ok((
        IpAddr::V6(Ipv6Addr::from(src)),
        IpAddr::V6(Ipv6Addr::from(dst)),
        start + 40 + payload_len,
    ))
}

fn parse_tcp(
    data: &[u8],
    start: usize,
    end: usize,
    src: IpAddr,
    dst: IpAddr,
) -> Result<TcpPacket, ParseError> {
    if end < start + 20 || data.len() < start + 20 {
        return Err(ParseError::TooShort);
    }

    let hdr_len = ((data[start + 12] >> 4) as usize) * 4;
    if hdr_len < 20 || end < start + hdr_len {
        return Err(ParseError::InvalidHeader);
    }

    let flags = data[start + 13];
    let options = &data[start + 20..start + hdr_len];

    Ok(TcpPacket {
        net: NetFlow { src, dst },
        transport: TransportFlow {
            src: u16::from_be_bytes([data[start], data[start + 1]]),
            dst: u16::from_be_bytes([data[start + 2], data[start + 3]]),
        },
        seq: u32::from_be_bytes([
            data[start + 4],
            data[start + 5],
            data[start + 6],
            data[start + 7],
        ]),
        syn: flags & TCP_FLAG_SYN != 0,
        ack: flags & TCP_FLAG_ACK != 0,
        fin: flags & TCP_FLAG_FIN != 0,
        rst: flags & TCP_FLAG_RST != 0,
        smc_option: has_smc_option(options),
        payload: Bytes::copy_from_slice(&data[start + hdr_len..end]),
    })
}

/// Walks the TCP options region looking for the SMC opt-in marker:
/// kind 254, length 6, data equal to the SMC-R eyecatcher.
fn has_smc_option(options: &[u8]) -> bool {
    let mut i = 0;
    while i < options.len() {
        match options[i] {
            0 => return false, // end of option list
            1 => i += 1,       // no-op
            kind => {
                if i + 1 >= options.len() {
                    return false;
                }
                let len = options[i + 1] as usize;
                if len < 2 || i + len > options.len() {
                    return false;
                }
                if kind == TCPOPT_SMC
                    && len == TCPOPT_SMC_LEN as usize
                    && options[i + 2..i + len] == SMCR_EYECATCHER
                {
                    return true;
                }
                i += len;
            }
        }
    }
    false
}
