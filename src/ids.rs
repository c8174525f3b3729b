//! Identifiers and small closed enumerations shared across the codec, the
//! transport, and the FSMs.

use std::fmt;

/// Which revision of the control protocol a tunnel speaks. Dictates header
/// layout, AVP semantics, and legal encapsulation.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ProtocolVersion {
    V2,
    V3,
    /// Negotiated down to V2 after a peer rejected our V3 SCCRQ.
    V3Fallback,
}

impl ProtocolVersion {
    /// The version nibble carried in the low bits of the first flags byte.
    pub fn wire_nibble(self) -> u8 {
        match self {
            ProtocolVersion::V2 | ProtocolVersion::V3Fallback => 2,
            ProtocolVersion::V3 => 3,
        }
    }

    pub fn from_wire_nibble(nibble: u8) -> Option<ProtocolVersion> {
        match nibble {
            2 => Some(ProtocolVersion::V2),
            3 => Some(ProtocolVersion::V3),
            _ => None,
        }
    }

    pub fn is_v2(self) -> bool {
        matches!(self, ProtocolVersion::V2 | ProtocolVersion::V3Fallback)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V2 => write!(f, "L2TPv2"),
            ProtocolVersion::V3 => write!(f, "L2TPv3"),
            ProtocolVersion::V3Fallback => write!(f, "L2TPv3(fallback-to-v2)"),
        }
    }
}

/// The datagram envelope a tunnel is carried in. IP encapsulation
/// (protocol 115, no UDP header) is only legal for L2TPv3.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum EncapType {
    Udp,
    Ip,
}

/// A 32-bit control connection identifier. For V2 only the low 16 bits
/// are valid; 0 is reserved and never a valid id for an established
/// tunnel.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct ControlConnId(pub u32);

impl ControlConnId {
    pub const ZERO: ControlConnId = ControlConnId(0);

    pub fn is_reserved(self) -> bool {
        self.0 == 0
    }

    /// V2 wire value: low 16 bits only.
    pub fn as_v2_u16(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for ControlConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u16> for ControlConnId {
    fn from(v: u16) -> Self {
        ControlConnId(v as u32)
    }
}

impl From<u32> for ControlConnId {
    fn from(v: u32) -> Self {
        ControlConnId(v)
    }
}

/// A 32-bit session identifier with the same V2 16-bit restriction as
/// [`ControlConnId`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl SessionId {
    pub const ZERO: SessionId = SessionId(0);

    pub fn is_reserved(self) -> bool {
        self.0 == 0
    }

    pub fn as_v2_u16(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u16> for SessionId {
    fn from(v: u16) -> Self {
        SessionId(v as u32)
    }
}

impl From<u32> for SessionId {
    fn from(v: u32) -> Self {
        SessionId(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_wire_nibble() {
        assert_eq!(ProtocolVersion::V2.wire_nibble(), 2);
        assert_eq!(ProtocolVersion::V3Fallback.wire_nibble(), 2);
        assert_eq!(ProtocolVersion::V3.wire_nibble(), 3);
    }

    #[test]
    fn control_conn_id_v2_truncates() {
        let id = ControlConnId(0x1_5F2B);
        assert_eq!(id.as_v2_u16(), 0x5F2B);
    }
}
