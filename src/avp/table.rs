//! The per-(vendor, type) descriptor table the AVP parser consults to learn
//! an attribute's expected payload shape.
//!
//! A `None` return means "no descriptor": the caller falls back to the
//! wire-carried mandatory bit to decide whether the missing descriptor is
//! fatal.

use super::types::{AttributeType, PayloadSemantic};

pub fn describe(vendor_id: u16, attribute_type: u16) -> Option<PayloadSemantic> {
    if vendor_id != 0 {
        return None;
    }
    use AttributeType::*;
    use PayloadSemantic as P;
    let ty = AttributeType::from_wire(vendor_id, attribute_type);
    let semantic = match ty {
        MessageType => P::MessageId,
        ResultCode => P::ResultCode,
        ProtocolVersion => P::U16,
        FramingCapabilities => P::U32,
        BearerCapabilities => P::U32,
        TieBreaker => P::U64,
        FirmwareRevision => P::U16,
        HostName => P::String,
        VendorName => P::String,
        AssignedTunnelId => P::U16,
        ReceiveWindowSize => P::U16,
        Challenge => P::Bytes,
        Q931CauseCode => P::Bytes,
        ChallengeResponse => P::Bytes,
        AssignedSessionId => P::U16,
        CallSerialNumber => P::U32,
        MinimumBps => P::U32,
        MaximumBps => P::U32,
        BearerType => P::U32,
        FramingType => P::U32,
        CalledNumber => P::String,
        CallingNumber => P::String,
        SubAddress => P::String,
        TxConnectSpeed => P::U32,
        PhysicalChannelId => P::U32,
        InitialReceivedLcpConfreq => P::Bytes,
        LastSentLcpConfreq => P::Bytes,
        LastReceivedLcpConfreq => P::Bytes,
        ProxyAuthenType => P::U16,
        ProxyAuthenName => P::String,
        ProxyAuthenChallenge => P::Bytes,
        ProxyAuthenId => P::U16,
        ProxyAuthenResponse => P::Bytes,
        CallErrors => P::Bytes,
        Accm => P::Bytes,
        RandomVector => P::Bytes,
        PrivateGroupId => P::String,
        RxConnectSpeed => P::U32,
        SequencingRequired => P::Empty,
        AssignedControlConnId => P::U32,
        PseudowireCapList => P::Bytes,
        LocalSessionId => P::U32,
        RemoteSessionId => P::U32,
        AssignedCookie => P::Bytes,
        RemoteEndId => P::Bytes,
        PseudowireType => P::U16,
        CircuitStatus => P::U16,
        PreferredLanguage => P::String,
        DataSequencing => P::U16,
        CallId => P::U32,
        EthernetTaggedVlan => P::U16,
        Unknown(..) => return None,
    };
    Some(semantic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_is_message_id() {
        assert_eq!(describe(0, 0), Some(PayloadSemantic::MessageId));
    }

    #[test]
    fn unknown_vendor_has_no_descriptor() {
        assert_eq!(describe(9, 0), None);
    }

    #[test]
    fn unknown_attribute_has_no_descriptor() {
        assert_eq!(describe(0, 9999), None);
    }
}
