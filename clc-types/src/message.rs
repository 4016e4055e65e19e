//! CLC message dispatch and assembly.
//!
//! A header preview selects one of six message shapes by `(type, path)`;
//! the full buffer is then decoded into a [`ClcMessage`] that owns its
//! header, body variant, trailer and raw bytes.

use std::fmt;

use tracing::warn;

use crate::accept_confirm::{SmcdAcceptConfirm, SmcrAcceptConfirm};
use crate::decline::Decline;
use crate::dump::hex_dump;
use crate::eyecatcher::Eyecatcher;
use crate::header::{Header, MsgType, Path};
use crate::proposal::Proposal;

/// The message shape a header preview dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Proposal,
    AcceptSmcR,
    AcceptSmcD,
    ConfirmSmcR,
    ConfirmSmcD,
    Decline,
    /// Accept/Confirm on a path without a defined body; only the header
    /// and trailer are rendered.
    Bare,
}

/// Maps a decoded header to the variant decoder responsible for it.
///
/// This is the single place that knows the `(type, path)` table. An
/// unrecognized message type returns `None`, which ends framing for the
/// direction (there is no way to resynchronize without a trusted length).
pub fn dispatch(header: &Header) -> Option<MessageKind> {
    match header.typ {
        MsgType::PROPOSAL => Some(MessageKind::Proposal),
        MsgType::ACCEPT => Some(match header.path {
            Path::SmcR => MessageKind::AcceptSmcR,
            Path::SmcD => MessageKind::AcceptSmcD,
            _ => MessageKind::Bare,
        }),
        MsgType::CONFIRM => Some(match header.path {
            Path::SmcR => MessageKind::ConfirmSmcR,
            Path::SmcD => MessageKind::ConfirmSmcD,
            _ => MessageKind::Bare,
        }),
        MsgType::DECLINE => Some(MessageKind::Decline),
        _ => None,
    }
}

/// Type-dependent message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Proposal(Proposal),
    SmcR(SmcrAcceptConfirm),
    SmcD(SmcdAcceptConfirm),
    Decline(Decline),
    /// No body: Accept/Confirm on an undefined or combined path.
    None,
}

/// A fully decoded CLC message, owning the raw bytes it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClcMessage {
    pub header: Header,
    pub body: Body,
    pub trailer: Eyecatcher,
    raw: Vec<u8>,
}

impl ClcMessage {
    /// Decodes a complete message from a buffer of at least
    /// `header.length` bytes.
    ///
    /// Returns `None` when the trailer is missing or the body fails
    /// validation; both are logged with a hex dump by the layer that
    /// detected them.
    pub fn parse(header: Header, kind: MessageKind, buf: &[u8]) -> Option<ClcMessage> {
        let length = header.length as usize;

        let Some(trailer) = header.check_trailer(buf) else {
            warn!(
                "error parsing CLC message: invalid trailer\n{}",
                hex_dump(&buf[..length.min(buf.len())])
            );
            return None;
        };

        let body = match kind {
            MessageKind::Proposal => Body::Proposal(Proposal::decode(&header, buf)?),
            MessageKind::AcceptSmcR | MessageKind::ConfirmSmcR => {
                Body::SmcR(SmcrAcceptConfirm::decode(&header, buf)?)
            }
            MessageKind::AcceptSmcD | MessageKind::ConfirmSmcD => {
                Body::SmcD(SmcdAcceptConfirm::decode(&header, buf)?)
            }
            MessageKind::Decline => Body::Decline(Decline::decode(&header, buf)?),
            MessageKind::Bare => Body::None,
        };

        Some(ClcMessage {
            header,
            body,
            trailer,
            raw: buf[..length].to_vec(),
        })
    }

    /// Renders the message as one transcript line (without the flow prefix).
    pub fn to_line(&self, show_reserved: bool) -> String {
        let body = match &self.body {
            Body::Proposal(p) => p.render(show_reserved),
            Body::SmcR(ac) => ac.render(show_reserved),
            Body::SmcD(ac) => ac.render(show_reserved),
            Body::Decline(d) => d.render(show_reserved),
            Body::None => "n/a".to_string(),
        };
        format!(
            "{}, {}, Trailer: {}",
            self.header.render(show_reserved),
            body,
            self.trailer
        )
    }

    /// The raw bytes this message was decoded from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Hex dump of the raw message bytes.
    pub fn dump(&self) -> String {
        hex_dump(&self.raw)
    }
}

impl fmt::Display for ClcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eyecatcher::{SMCD_EYECATCHER, SMCR_EYECATCHER, SmcVariant};

    fn decode_hex(s: &str) -> Vec<u8> {
        let clean: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        (0..clean.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).unwrap())
            .collect()
    }

    fn parse(buf: &[u8]) -> Option<ClcMessage> {
        let header = Header::decode(buf).unwrap();
        let kind = dispatch(&header)?;
        ClcMessage::parse(header, kind, buf)
    }

    #[test]
    fn dispatch_table() {
        let mut buf = decode_hex("e2d4c3d901003410");
        let proposal = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&proposal), Some(MessageKind::Proposal));

        buf[4] = 0x02; // accept, path SMC-R
        let accept = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&accept), Some(MessageKind::AcceptSmcR));

        buf[7] = 0x11; // path SMC-D
        let accept_d = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&accept_d), Some(MessageKind::AcceptSmcD));

        buf[4] = 0x03; // confirm
        let confirm_d = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&confirm_d), Some(MessageKind::ConfirmSmcD));

        buf[7] = 0x13; // path SMC-R + SMC-D: no defined body
        let confirm_b = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&confirm_b), Some(MessageKind::Bare));

        buf[7] = 0x12; // undefined path value 2
        let confirm_u = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&confirm_u), Some(MessageKind::Bare));

        buf[4] = 0x04;
        let decline = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&decline), Some(MessageKind::Decline));

        buf[4] = 0x05;
        let unknown = Header::decode(&buf).unwrap();
        assert_eq!(dispatch(&unknown), None);
    }

    #[test]
    fn decline_transcript_line() {
        let buf = decode_hex("e2d4c3d904001c10 2525252525252500 03030000 00000000 e2d4c3d9");
        let msg = parse(&buf).unwrap();
        assert_eq!(
            msg.to_line(false),
            "Decline: Eyecatcher: SMC-R, Type: 4 (Decline), Length: 28, Version: 1, \
             Out of Sync: 0, Path: SMC-R, Peer ID: 9509@25:25:25:25:25:00, \
             Peer Diagnosis: 0x3030000 (no SMC device found (R or D)), Trailer: SMC-R"
        );
    }

    #[test]
    fn smcr_accept_transcript_line() {
        let buf = decode_hex(
            "e2d4c3d902004418 b1a098039babcdef \
             fe800000000000009a039bfffeabcdef \
             98039babcdef0000 e40000157d010000 \
             0005230000000000 f0a600000072f5fe e2d4c3d9",
        );
        let msg = parse(&buf).unwrap();
        assert_eq!(
            msg.to_line(false),
            "Accept: Eyecatcher: SMC-R, Type: 2 (Accept), Length: 68, Version: 1, \
             First Contact: 1, Path: SMC-R, Peer ID: 45472@98:03:9b:ab:cd:ef, \
             SMC-R GID: fe80::9a03:9bff:feab:cdef, RoCE MAC: 98:03:9b:ab:cd:ef, \
             QP Number: 228, RMB RKey: 5501, RMBE Index: 1, RMBE Alert Token: 5, \
             RMBE Size: 2 (65536), QP MTU: 3 (1024), RMB Virtual Address: 0xf0a60000, \
             Packet Sequence Number: 7534078, Trailer: SMC-R"
        );
    }

    #[test]
    fn smcd_accept_transcript_line() {
        let buf = decode_hex(
            "e2d4c3c402003011 0123456789abcdef 0123456789abcdef \
             ff100000ffffffff 000000000000000000000000 e2d4c3c4",
        );
        let msg = parse(&buf).unwrap();
        let line = msg.to_line(false);
        assert!(line.starts_with("Accept: Eyecatcher: SMC-D"));
        assert!(line.contains(
            "SMC-D GID: 81985529216486895, SMC-D Token: 81985529216486895, \
             DMBE Index: 255, DMBE Size: 1 (32768), Link ID: 4294967295"
        ));
        assert!(line.ends_with("Trailer: SMC-D"));
    }

    #[test]
    fn invalid_trailer_drops_message() {
        let buf = decode_hex("e2d4c3d904001c10 2525252525252500 03030000 00000000 00000000");
        assert!(parse(&buf).is_none());
    }

    #[test]
    fn bare_body_still_prints_header() {
        // accept with path SMC-R + SMC-D: header-only message
        let mut buf = decode_hex("e2d4c3d902001c13 2525252525252500 03030000 00000000 e2d4c3d9");
        let msg = parse(&buf).unwrap();
        assert_eq!(msg.body, Body::None);
        assert!(msg.to_line(false).contains("Path: SMC-R + SMC-D, n/a,"));

        // undefined path value 2 behaves the same
        buf[7] = 0x12;
        let msg = parse(&buf).unwrap();
        assert_eq!(msg.body, Body::None);
        assert!(msg.to_line(false).contains("Path: unknown, n/a,"));
    }

    #[test]
    fn accepted_messages_have_valid_trailers() {
        let smcr = decode_hex("e2d4c3d904001c10 2525252525252500 03030000 00000000 e2d4c3d9");
        let msg = parse(&smcr).unwrap();
        assert_eq!(msg.trailer.kind(), SmcVariant::SmcR);
        assert_eq!(msg.trailer.0, SMCR_EYECATCHER);

        // for accept/confirm the trailer flavor matches the path
        let smcd = decode_hex(
            "e2d4c3c402003011 0123456789abcdef 0123456789abcdef \
             ff100000ffffffff 000000000000000000000000 e2d4c3c4",
        );
        let msg = parse(&smcd).unwrap();
        assert_eq!(msg.header.path, Path::SmcD);
        assert_eq!(msg.trailer.0, SMCD_EYECATCHER);
    }

    #[test]
    fn raw_bytes_are_preserved() {
        let buf = decode_hex("e2d4c3d904001c10 2525252525252500 03030000 00000000 e2d4c3d9");
        let msg = parse(&buf).unwrap();
        assert_eq!(msg.raw(), &buf[..]);
        assert!(msg.dump().starts_with("00000000  e2 d4 c3 d9"));
    }

    #[test]
    fn decode_is_idempotent() {
        let buf = decode_hex(
            "e2d4c3d902004418 b1a098039babcdef \
             fe800000000000009a039bfffeabcdef \
             98039babcdef0000 e40000157d010000 \
             0005230000000000 f0a600000072f5fe e2d4c3d9",
        );
        assert_eq!(parse(&buf), parse(&buf));
    }
}
