//! Control message framing.
//!
//! A [`ControlMessage`] is a tagged variant over the V2 and V3 header
//! layouts: fields the RFCs
//! share (Ns, Nr, AVPs, message type) get a common accessor on
//! [`ControlMessage`] itself; V2-only (tunnel/session id) or V3-only
//! (control connection id) fields live on the matching variant struct.

mod builder;
mod validate;

pub use builder::*;
pub use validate::validate;

use byteorder::{BigEndian, ByteOrder};

use crate::avp::{Avp, AttributeType, MessageTypeCode};
use crate::error::CodecError;
use crate::ids::{ControlConnId, ProtocolVersion};

const COMMON_HEADER_LEN: usize = 4;
const V2_HEADER_LEN: usize = 12;
const V3_HEADER_LEN: usize = 12;

/// Flags/version byte pair shared by every control message on the wire:
/// `T=1, L=1, S=1` (type=control, length present, sequence present) plus
/// the version nibble, e.g. `C8 02` for V2 or `C8 03` for V3.
const FLAGS_BYTE0: u8 = 0xC8;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct V2Message {
    pub tunnel_id: u16,
    pub session_id: u16,
    pub ns: u16,
    pub nr: u16,
    pub avps: Vec<Avp>,
    pub message_type: MessageTypeCode,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct V3Message {
    pub control_conn_id: ControlConnId,
    pub ns: u16,
    pub nr: u16,
    pub avps: Vec<Avp>,
    pub message_type: MessageTypeCode,
}

/// A single parsed or to-be-sent L2TP control message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ControlMessage {
    V2(V2Message),
    V3(V3Message),
}

impl ControlMessage {
    pub fn version(&self) -> ProtocolVersion {
        match self {
            ControlMessage::V2(_) => ProtocolVersion::V2,
            ControlMessage::V3(_) => ProtocolVersion::V3,
        }
    }

    pub fn ns(&self) -> u16 {
        match self {
            ControlMessage::V2(m) => m.ns,
            ControlMessage::V3(m) => m.ns,
        }
    }

    pub fn nr(&self) -> u16 {
        match self {
            ControlMessage::V2(m) => m.nr,
            ControlMessage::V3(m) => m.nr,
        }
    }

    /// Used by the reliable transport to stamp Ns/Nr just before
    /// transmission.
    pub fn set_ns_nr(&mut self, ns: u16, nr: u16) {
        match self {
            ControlMessage::V2(m) => {
                m.ns = ns;
                m.nr = nr;
            }
            ControlMessage::V3(m) => {
                m.ns = ns;
                m.nr = nr;
            }
        }
    }

    pub fn avps(&self) -> &[Avp] {
        match self {
            ControlMessage::V2(m) => &m.avps,
            ControlMessage::V3(m) => &m.avps,
        }
    }

    pub fn message_type(&self) -> MessageTypeCode {
        match self {
            ControlMessage::V2(m) => m.message_type,
            ControlMessage::V3(m) => m.message_type,
        }
    }

    pub fn is_ack_only(&self) -> bool {
        self.avps().is_empty() || self.message_type() == MessageTypeCode::Ack
    }

    pub fn as_v2(&self) -> Option<&V2Message> {
        match self {
            ControlMessage::V2(m) => Some(m),
            ControlMessage::V3(_) => None,
        }
    }

    pub fn as_v3(&self) -> Option<&V3Message> {
        match self {
            ControlMessage::V3(m) => Some(m),
            ControlMessage::V2(_) => None,
        }
    }

    /// Whether this message's local id field(s) match the given tunnel.
    pub fn matches_tunnel(&self, local: ControlConnId) -> bool {
        match self {
            ControlMessage::V2(m) => m.tunnel_id == local.as_v2_u16(),
            ControlMessage::V3(m) => m.control_conn_id == local,
        }
    }

    /// `Parse a datagram payload → sequence of ControlMessages`. A
    /// datagram may carry more than one message back-to-back;
    /// each is bounds-checked against the length its own header declares.
    pub fn parse_datagram(mut buf: &[u8]) -> Result<Vec<ControlMessage>, CodecError> {
        let mut out = Vec::new();
        while !buf.is_empty() {
            let (msg, consumed) = ControlMessage::parse_one(buf)?;
            out.push(msg);
            buf = &buf[consumed..];
        }
        Ok(out)
    }

    fn parse_one(buf: &[u8]) -> Result<(ControlMessage, usize), CodecError> {
        if buf.len() < COMMON_HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: COMMON_HEADER_LEN,
                remaining: buf.len(),
            });
        }
        let version_nibble = buf[1] & 0x0F;
        let version = ProtocolVersion::from_wire_nibble(version_nibble)
            .ok_or(CodecError::UnknownProtocolVersion(version_nibble))?;
        let length = BigEndian::read_u16(&buf[2..4]) as usize;
        let min_len = if version.is_v2() { V2_HEADER_LEN } else { V3_HEADER_LEN };
        if length < min_len {
            return Err(CodecError::Truncated {
                needed: min_len,
                remaining: length,
            });
        }
        if buf.len() < length {
            return Err(CodecError::MessageLengthOverrun {
                declared: length,
                available: buf.len(),
            });
        }
        let body = &buf[..length];
        let msg = if version.is_v2() {
            let tunnel_id = BigEndian::read_u16(&body[4..6]);
            let session_id = BigEndian::read_u16(&body[6..8]);
            let ns = BigEndian::read_u16(&body[8..10]);
            let nr = BigEndian::read_u16(&body[10..12]);
            let avp_buf = &body[V2_HEADER_LEN..];
            let (avps, message_type) = if avp_buf.is_empty() {
                (Vec::new(), MessageTypeCode::Ack)
            } else {
                let avps = Avp::parse_all(avp_buf)?;
                let message_type = first_avp_message_type(&avps)?;
                (avps, message_type)
            };
            ControlMessage::V2(V2Message {
                tunnel_id,
                session_id,
                ns,
                nr,
                avps,
                message_type,
            })
        } else {
            let control_conn_id = ControlConnId(BigEndian::read_u32(&body[4..8]));
            let ns = BigEndian::read_u16(&body[8..10]);
            let nr = BigEndian::read_u16(&body[10..12]);
            let avp_buf = &body[V3_HEADER_LEN..];
            let avps = Avp::parse_all(avp_buf)?;
            let message_type = first_avp_message_type(&avps)?;
            ControlMessage::V3(V3Message {
                control_conn_id,
                ns,
                nr,
                avps,
                message_type,
            })
        };
        Ok((msg, length))
    }

    /// `Encode ControlMessage → bytes`. Inverse of [`parse_datagram`],
    /// byte-for-byte including sequence numbers and flag bits.
    pub fn encode(&self) -> Vec<u8> {
        let mut avp_bytes = Vec::new();
        for avp in self.avps() {
            avp_bytes.extend(avp.encode());
        }
        let header_len = if self.as_v2().is_some() { V2_HEADER_LEN } else { V3_HEADER_LEN };
        let length = (header_len + avp_bytes.len()) as u16;
        let mut out = Vec::with_capacity(length as usize);
        out.push(FLAGS_BYTE0);
        out.push(self.version().wire_nibble());
        out.extend_from_slice(&length.to_be_bytes());
        match self {
            ControlMessage::V2(m) => {
                out.extend_from_slice(&m.tunnel_id.to_be_bytes());
                out.extend_from_slice(&m.session_id.to_be_bytes());
                out.extend_from_slice(&m.ns.to_be_bytes());
                out.extend_from_slice(&m.nr.to_be_bytes());
            }
            ControlMessage::V3(m) => {
                out.extend_from_slice(&m.control_conn_id.0.to_be_bytes());
                out.extend_from_slice(&m.ns.to_be_bytes());
                out.extend_from_slice(&m.nr.to_be_bytes());
            }
        }
        out.extend(avp_bytes);
        out
    }
}

fn first_avp_message_type(avps: &[Avp]) -> Result<MessageTypeCode, CodecError> {
    let first = avps.first().ok_or(CodecError::NoAvps)?;
    if first.attribute_type != AttributeType::MessageType {
        return Err(CodecError::MissingMessageTypeAvp);
    }
    first.decode_message_type()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlb_parses_as_synthetic_ack() {
        let bytes = [
            0xC8, 0x02, 0x00, 0x0C, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01,
        ];
        let msgs = ControlMessage::parse_datagram(&bytes).unwrap();
        assert_eq!(msgs.len(), 1);
        let m = msgs[0].as_v2().unwrap();
        assert_eq!(m.tunnel_id, 1);
        assert_eq!(m.session_id, 0);
        assert_eq!(m.ns, 1);
        assert_eq!(m.nr, 1);
        assert!(m.avps.is_empty());
        assert_eq!(msgs[0].message_type(), MessageTypeCode::Ack);
    }

    #[test]
    fn hello_round_trips() {
        let bytes = [
            0xC8, 0x02, 0x00, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x80, 0x08,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x06,
        ];
        let msgs = ControlMessage::parse_datagram(&bytes).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message_type(), MessageTypeCode::Hello);
        assert_eq!(msgs[0].encode(), bytes);
    }

    #[test]
    fn multiple_messages_in_one_datagram() {
        let hello = [
            0xC8, 0x02, 0x00, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x80, 0x08,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x06,
        ];
        let zlb = [
            0xC8, 0x02, 0x00, 0x0C, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01,
        ];
        let mut buf = hello.to_vec();
        buf.extend_from_slice(&zlb);
        let msgs = ControlMessage::parse_datagram(&buf).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].message_type(), MessageTypeCode::Hello);
        assert_eq!(msgs[1].message_type(), MessageTypeCode::Ack);
    }

    #[test]
    fn rejects_missing_message_type_avp() {
        // A well-formed AVP sequence whose first AVP isn't Message-Type.
        let mut bytes = vec![0xC8, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01];
        let avp = Avp::string(AttributeType::HostName, false, "x").encode();
        bytes.extend(&avp);
        let total_len = bytes.len() as u16;
        bytes[2..4].copy_from_slice(&total_len.to_be_bytes());
        assert!(matches!(
            ControlMessage::parse_datagram(&bytes),
            Err(CodecError::MissingMessageTypeAvp)
        ));
    }

    #[test]
    fn rejects_overrun_length() {
        let bytes = [0xC8, 0x02, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            ControlMessage::parse_datagram(&bytes),
            Err(CodecError::MessageLengthOverrun { .. })
        ));
    }
}
