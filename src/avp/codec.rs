//! AVP framing: the 6-byte header, bounds-checked payload, and the typed
//! constructors/decoders built on top of it.

use byteorder::{BigEndian, ByteOrder};

use crate::error::CodecError;

use super::table::describe;
use super::types::{AttributeType, MessageTypeCode, PayloadSemantic};

const HEADER_LEN: usize = 6;
const MANDATORY_BIT: u16 = 0x8000;
const HIDDEN_BIT: u16 = 0x4000;
const LENGTH_MASK: u16 = 0x03FF;

/// One decoded attribute-value pair.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Avp {
    pub vendor_id: u16,
    pub attribute_type: AttributeType,
    pub mandatory: bool,
    pub hidden: bool,
    pub payload: Vec<u8>,
}

/// The sub-structure of a Result Code AVP: a mandatory result code plus an
/// optional protocol error code and an optional human-readable message.
/// StopCCN and CDN each interpret `result_code` against their own
/// enumeration ([`super::StopCcnResult`] / [`super::CdnResult`]).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ResultCodeAvp {
    pub result_code: u16,
    pub error_code: Option<u16>,
    pub message: Option<String>,
}

impl Avp {
    /// `Parse buffer → sequence of AVPs`.
    ///
    /// Unknown AVPs with no descriptor and the mandatory bit set reject the
    /// whole sequence; unknown non-mandatory AVPs are dropped silently. An
    /// empty result (after dropping) is [`CodecError::NoAvps`].
    pub fn parse_all(mut buf: &[u8]) -> Result<Vec<Avp>, CodecError> {
        let mut out = Vec::new();
        while !buf.is_empty() {
            let (avp, consumed) = Avp::parse_one(buf)?;
            buf = &buf[consumed..];
            match describe(avp.vendor_id, avp.attribute_type_code()) {
                Some(_) => out.push(avp),
                None if avp.mandatory => {
                    return Err(CodecError::UnknownMandatoryAvp {
                        vendor_id: avp.vendor_id,
                        attribute_type: avp.attribute_type_code(),
                    })
                }
                None => { /* non-mandatory unknown AVP: silently skipped */ }
            }
        }
        if out.is_empty() {
            return Err(CodecError::NoAvps);
        }
        Ok(out)
    }

    /// Parses exactly one AVP from the front of `buf`, returning it and the
    /// number of bytes consumed (header + payload, no trailing padding —
    /// unlike pcap-ng blocks, L2TP AVPs are not 32-bit aligned).
    fn parse_one(buf: &[u8]) -> Result<(Avp, usize), CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                remaining: buf.len(),
            });
        }
        let flags_len = BigEndian::read_u16(&buf[0..2]);
        let length = flags_len & LENGTH_MASK;
        if length < 6 || length > 1023 {
            return Err(CodecError::BadAvpLength(length));
        }
        let length = length as usize;
        if buf.len() < length {
            return Err(CodecError::Truncated {
                needed: length,
                remaining: buf.len(),
            });
        }
        let vendor_id = BigEndian::read_u16(&buf[2..4]);
        let attribute_type = BigEndian::read_u16(&buf[4..6]);
        let payload = buf[HEADER_LEN..length].to_vec();
        Ok((
            Avp {
                vendor_id,
                attribute_type: AttributeType::from_wire(vendor_id, attribute_type),
                mandatory: flags_len & MANDATORY_BIT != 0,
                hidden: flags_len & HIDDEN_BIT != 0,
                payload,
            },
            length,
        ))
    }

    fn attribute_type_code(&self) -> u16 {
        match self.attribute_type {
            AttributeType::Unknown(_, code) => code,
            known => wire_code_of(known),
        }
    }

    /// `Encode AVP → bytes`: 6-byte header (mandatory/hidden
    /// flags + 10-bit length covering header and payload) followed by the
    /// payload bytes, verbatim — including the hidden bit, which this
    /// implementation never obscures or de-obscures.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        let length = (HEADER_LEN + self.payload.len()) as u16;
        let mut flags_len = length & LENGTH_MASK;
        if self.mandatory {
            flags_len |= MANDATORY_BIT;
        }
        if self.hidden {
            flags_len |= HIDDEN_BIT;
        }
        out.extend_from_slice(&flags_len.to_be_bytes());
        out.extend_from_slice(&self.vendor_id.to_be_bytes());
        out.extend_from_slice(&wire_code_of(self.attribute_type).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// `Find-by-type` helper over an AVP sequence.
    pub fn find(avps: &[Avp], attribute_type: AttributeType) -> Option<&Avp> {
        avps.iter().find(|a| a.attribute_type == attribute_type)
    }

    fn expect_semantic(&self, expected: PayloadSemantic) -> Result<(), CodecError> {
        let actual = describe(self.vendor_id, self.attribute_type_code());
        if actual != Some(expected) {
            return Err(CodecError::WrongDataType(self.attribute_type));
        }
        Ok(())
    }

    pub fn decode_u16(&self) -> Result<u16, CodecError> {
        self.expect_semantic(PayloadSemantic::U16)?;
        if self.payload.len() != 2 {
            return Err(CodecError::WrongDataType(self.attribute_type));
        }
        Ok(BigEndian::read_u16(&self.payload))
    }

    pub fn decode_u32(&self) -> Result<u32, CodecError> {
        self.expect_semantic(PayloadSemantic::U32)?;
        if self.payload.len() != 4 {
            return Err(CodecError::WrongDataType(self.attribute_type));
        }
        Ok(BigEndian::read_u32(&self.payload))
    }

    pub fn decode_u64(&self) -> Result<u64, CodecError> {
        self.expect_semantic(PayloadSemantic::U64)?;
        if self.payload.len() != 8 {
            return Err(CodecError::WrongDataType(self.attribute_type));
        }
        Ok(BigEndian::read_u64(&self.payload))
    }

    pub fn decode_string(&self) -> Result<String, CodecError> {
        self.expect_semantic(PayloadSemantic::String)?;
        Ok(String::from_utf8_lossy(&self.payload).into_owned())
    }

    pub fn decode_bytes(&self) -> Result<&[u8], CodecError> {
        self.expect_semantic(PayloadSemantic::Bytes)?;
        Ok(&self.payload)
    }

    pub fn decode_message_type(&self) -> Result<MessageTypeCode, CodecError> {
        self.expect_semantic(PayloadSemantic::MessageId)?;
        if self.payload.len() != 2 {
            return Err(CodecError::WrongDataType(self.attribute_type));
        }
        Ok(MessageTypeCode::from_wire(BigEndian::read_u16(
            &self.payload,
        )))
    }

    pub fn decode_result_code(&self) -> Result<ResultCodeAvp, CodecError> {
        self.expect_semantic(PayloadSemantic::ResultCode)?;
        if self.payload.len() < 2 {
            return Err(CodecError::WrongDataType(self.attribute_type));
        }
        let result_code = BigEndian::read_u16(&self.payload[0..2]);
        let error_code = if self.payload.len() >= 4 {
            Some(BigEndian::read_u16(&self.payload[2..4]))
        } else {
            None
        };
        let message = if self.payload.len() > 4 {
            Some(String::from_utf8_lossy(&self.payload[4..]).into_owned())
        } else {
            None
        };
        Ok(ResultCodeAvp {
            result_code,
            error_code,
            message,
        })
    }

    // -- typed constructors -------------------------------------------------

    pub fn message_type(mt: MessageTypeCode) -> Avp {
        Avp::new_fixed(
            AttributeType::MessageType,
            true,
            mt.wire_code().to_be_bytes().to_vec(),
        )
    }

    pub fn u16(ty: AttributeType, mandatory: bool, v: u16) -> Avp {
        Avp::new_fixed(ty, mandatory, v.to_be_bytes().to_vec())
    }

    pub fn u32(ty: AttributeType, mandatory: bool, v: u32) -> Avp {
        Avp::new_fixed(ty, mandatory, v.to_be_bytes().to_vec())
    }

    pub fn u64(ty: AttributeType, mandatory: bool, v: u64) -> Avp {
        Avp::new_fixed(ty, mandatory, v.to_be_bytes().to_vec())
    }

    /// Builds a Result Code AVP, writing only the fields present in `rc`.
    /// An error message with no error code can't be positioned on the
    /// wire, so it is simply not written in that case.
    pub fn result_code(rc: &ResultCodeAvp) -> Avp {
        let mut payload = rc.result_code.to_be_bytes().to_vec();
        if let Some(ec) = rc.error_code {
            payload.extend_from_slice(&ec.to_be_bytes());
            if let Some(msg) = &rc.message {
                payload.extend_from_slice(msg.as_bytes());
            }
        }
        Avp::new_fixed(AttributeType::ResultCode, true, payload)
    }

    pub fn string(ty: AttributeType, mandatory: bool, s: &str) -> Avp {
        Avp::new_fixed(ty, mandatory, s.as_bytes().to_vec())
    }

    pub fn bytes(ty: AttributeType, mandatory: bool, b: &[u8]) -> Avp {
        Avp::new_fixed(ty, mandatory, b.to_vec())
    }

    pub fn empty(ty: AttributeType, mandatory: bool) -> Avp {
        Avp::new_fixed(ty, mandatory, Vec::new())
    }

    fn new_fixed(ty: AttributeType, mandatory: bool, payload: Vec<u8>) -> Avp {
        Avp {
            vendor_id: 0,
            attribute_type: ty,
            mandatory,
            hidden: false,
            payload,
        }
    }
}

/// Inverse of [`AttributeType::from_wire`] for vendor-0 attributes.
fn wire_code_of(ty: AttributeType) -> u16 {
    use AttributeType::*;
    match ty {
        MessageType => 0,
        ResultCode => 1,
        ProtocolVersion => 2,
        FramingCapabilities => 3,
        BearerCapabilities => 4,
        TieBreaker => 5,
        FirmwareRevision => 6,
        HostName => 7,
        VendorName => 8,
        AssignedTunnelId => 9,
        ReceiveWindowSize => 10,
        Challenge => 11,
        Q931CauseCode => 12,
        ChallengeResponse => 13,
        AssignedSessionId => 14,
        CallSerialNumber => 15,
        MinimumBps => 16,
        MaximumBps => 17,
        BearerType => 18,
        FramingType => 19,
        CalledNumber => 21,
        CallingNumber => 22,
        SubAddress => 23,
        TxConnectSpeed => 24,
        PhysicalChannelId => 25,
        InitialReceivedLcpConfreq => 26,
        LastSentLcpConfreq => 27,
        LastReceivedLcpConfreq => 28,
        ProxyAuthenType => 29,
        ProxyAuthenName => 30,
        ProxyAuthenChallenge => 31,
        ProxyAuthenId => 32,
        ProxyAuthenResponse => 33,
        CallErrors => 34,
        Accm => 35,
        RandomVector => 36,
        PrivateGroupId => 37,
        RxConnectSpeed => 38,
        SequencingRequired => 39,
        AssignedControlConnId => 42,
        PseudowireCapList => 62,
        LocalSessionId => 63,
        RemoteSessionId => 64,
        AssignedCookie => 65,
        RemoteEndId => 66,
        PseudowireType => 68,
        CircuitStatus => 71,
        PreferredLanguage => 72,
        DataSequencing => 73,
        CallId => 74,
        EthernetTaggedVlan => 75,
        Unknown(_, code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trip() {
        let avp = Avp::message_type(MessageTypeCode::Sccrq);
        let bytes = avp.encode();
        assert_eq!(bytes, vec![0x80, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let (decoded, consumed) = Avp::parse_one(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.decode_message_type().unwrap(), MessageTypeCode::Sccrq);
    }

    #[test]
    fn rejects_bad_length() {
        let bytes = [0x00, 0x03, 0, 0, 0, 0];
        assert!(matches!(
            Avp::parse_one(&bytes),
            Err(CodecError::BadAvpLength(3))
        ));
    }

    #[test]
    fn unknown_mandatory_avp_rejects_whole_sequence() {
        let unknown = Avp::u16(AttributeType::Unknown(0, 9999), true, 7);
        let bytes = unknown.encode();
        assert!(matches!(
            Avp::parse_all(&bytes),
            Err(CodecError::UnknownMandatoryAvp { .. })
        ));
    }

    #[test]
    fn unknown_nonmandatory_avp_is_skipped() {
        let mt = Avp::message_type(MessageTypeCode::Hello).encode();
        let unknown = Avp::u16(AttributeType::Unknown(0, 9999), false, 7);
        let mut bytes = mt;
        bytes.extend(unknown.encode());
        let parsed = Avp::parse_all(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].decode_message_type().unwrap(), MessageTypeCode::Hello);
    }

    #[test]
    fn zero_avps_is_an_error() {
        assert!(matches!(Avp::parse_all(&[]), Err(CodecError::NoAvps)));
    }

    #[test]
    fn result_code_with_all_fields_round_trips() {
        use super::super::types::StopCcnResult;
        let rc = ResultCodeAvp {
            result_code: StopCcnResult::Clear.wire_code(),
            error_code: Some(0),
            message: Some("bye".to_string()),
        };
        let avp = Avp::result_code(&rc);
        let decoded = avp.decode_result_code().unwrap();
        assert_eq!(decoded, rc);
    }

    #[test]
    fn result_code_with_only_code() {
        let rc = ResultCodeAvp {
            result_code: 1,
            error_code: None,
            message: None,
        };
        let avp = Avp::result_code(&rc);
        assert_eq!(avp.payload.len(), 2);
        assert_eq!(avp.decode_result_code().unwrap(), rc);
    }

    #[test]
    fn find_by_type() {
        let avps = vec![
            Avp::message_type(MessageTypeCode::Sccrq),
            Avp::string(AttributeType::HostName, false, "openv3"),
        ];
        let found = Avp::find(&avps, AttributeType::HostName).unwrap();
        assert_eq!(found.decode_string().unwrap(), "openv3");
        assert!(Avp::find(&avps, AttributeType::VendorName).is_none());
    }
}
