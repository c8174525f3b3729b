//! The closed enumerations attribute-value pairs are built from: attribute
//! type codes, the semantic payload types they decode to, message type
//! codes, and the StopCCN/CDN result-code and protocol error-code tables.

use std::fmt;

/// IETF-registered AVP attribute types (vendor id 0), RFC 2661 §4.4/6.1 and
/// RFC 3931 §5.4, covering attribute codes 0-75. `Unknown` carries through
/// any vendor-0 code this table doesn't name, and
/// any nonzero vendor id is always `Unknown` (vendor-specific AVPs are
/// opaque to this implementation).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum AttributeType {
    MessageType,
    ResultCode,
    ProtocolVersion,
    FramingCapabilities,
    BearerCapabilities,
    TieBreaker,
    FirmwareRevision,
    HostName,
    VendorName,
    AssignedTunnelId,
    ReceiveWindowSize,
    Challenge,
    Q931CauseCode,
    ChallengeResponse,
    AssignedSessionId,
    CallSerialNumber,
    MinimumBps,
    MaximumBps,
    BearerType,
    FramingType,
    CalledNumber,
    CallingNumber,
    SubAddress,
    TxConnectSpeed,
    PhysicalChannelId,
    InitialReceivedLcpConfreq,
    LastSentLcpConfreq,
    LastReceivedLcpConfreq,
    ProxyAuthenType,
    ProxyAuthenName,
    ProxyAuthenChallenge,
    ProxyAuthenId,
    ProxyAuthenResponse,
    CallErrors,
    Accm,
    RandomVector,
    PrivateGroupId,
    RxConnectSpeed,
    SequencingRequired,
    AssignedControlConnId,
    PseudowireCapList,
    LocalSessionId,
    RemoteSessionId,
    AssignedCookie,
    RemoteEndId,
    PseudowireType,
    CircuitStatus,
    PreferredLanguage,
    DataSequencing,
    CallId,
    EthernetTaggedVlan,
    Unknown(u16, u16),
}

impl AttributeType {
    pub fn from_wire(vendor_id: u16, attribute_type: u16) -> AttributeType {
        if vendor_id != 0 {
            return AttributeType::Unknown(vendor_id, attribute_type);
        }
        use AttributeType::*;
        match attribute_type {
            0 => MessageType,
            1 => ResultCode,
            2 => ProtocolVersion,
            3 => FramingCapabilities,
            4 => BearerCapabilities,
            5 => TieBreaker,
            6 => FirmwareRevision,
            7 => HostName,
            8 => VendorName,
            9 => AssignedTunnelId,
            10 => ReceiveWindowSize,
            11 => Challenge,
            12 => Q931CauseCode,
            13 => ChallengeResponse,
            14 => AssignedSessionId,
            15 => CallSerialNumber,
            16 => MinimumBps,
            17 => MaximumBps,
            18 => BearerType,
            19 => FramingType,
            21 => CalledNumber,
            22 => CallingNumber,
            23 => SubAddress,
            24 => TxConnectSpeed,
            25 => PhysicalChannelId,
            26 => InitialReceivedLcpConfreq,
            27 => LastSentLcpConfreq,
            28 => LastReceivedLcpConfreq,
            29 => ProxyAuthenType,
            30 => ProxyAuthenName,
            31 => ProxyAuthenChallenge,
            32 => ProxyAuthenId,
            33 => ProxyAuthenResponse,
            34 => CallErrors,
            35 => Accm,
            36 => RandomVector,
            37 => PrivateGroupId,
            38 => RxConnectSpeed,
            39 => SequencingRequired,
            // RFC 3931 renumbers/adds attributes on top of the RFC 2661 set;
            // the two specs never collide because v3-only sessions don't
            // carry the v2-only AVPs above 39 and vice versa.
            42 => AssignedControlConnId,
            62 => PseudowireCapList,
            63 => LocalSessionId,
            64 => RemoteSessionId,
            65 => AssignedCookie,
            66 => RemoteEndId,
            68 => PseudowireType,
            71 => CircuitStatus,
            72 => PreferredLanguage,
            73 => DataSequencing,
            74 => CallId,
            75 => EthernetTaggedVlan,
            n => Unknown(0, n),
        }
    }

    /// `true` if this AVP is mandatory by default per its RFC-defined
    /// semantics, when the sender hasn't overridden the bit explicitly.
    /// Used only as a fallback when building outgoing AVPs; the mandatory
    /// bit carried on the wire is always authoritative for received AVPs.
    pub fn mandatory_by_default(self) -> bool {
        use AttributeType::*;
        matches!(
            self,
            MessageType
                | ProtocolVersion
                | AssignedTunnelId
                | AssignedSessionId
                | AssignedControlConnId
                | CallSerialNumber
                | PseudowireType
                | LocalSessionId
                | RemoteSessionId
        )
    }
}

/// The semantic shape of an AVP's payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PayloadSemantic {
    Empty,
    U16,
    U32,
    U64,
    String,
    Bytes,
    ResultCode,
    MessageId,
}

/// Message type identifiers carried in the Message-Type AVP.
/// L2TPv2 and L2TPv3 share a single numbering space for the handshake,
/// session, and teardown messages this crate implements.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum MessageTypeCode {
    Illegal,
    Sccrq,
    Sccrp,
    Scccn,
    StopCcn,
    Hello,
    Ocrq,
    Ocrp,
    Occn,
    Icrq,
    Icrp,
    Iccn,
    Cdn,
    Wen,
    Sli,
    Ack,
    Unknown(u16),
}

impl MessageTypeCode {
    pub fn from_wire(code: u16) -> MessageTypeCode {
        use MessageTypeCode::*;
        match code {
            0 => Illegal,
            1 => Sccrq,
            2 => Sccrp,
            3 => Scccn,
            4 => StopCcn,
            6 => Hello,
            7 => Ocrq,
            8 => Ocrp,
            9 => Occn,
            10 => Icrq,
            11 => Icrp,
            12 => Iccn,
            14 => Cdn,
            15 => Wen,
            16 => Sli,
            20 => Ack,
            n => Unknown(n),
        }
    }

    pub fn wire_code(self) -> u16 {
        use MessageTypeCode::*;
        match self {
            Illegal => 0,
            Sccrq => 1,
            Sccrp => 2,
            Scccn => 3,
            StopCcn => 4,
            Hello => 6,
            Ocrq => 7,
            Ocrp => 8,
            Occn => 9,
            Icrq => 10,
            Icrp => 11,
            Iccn => 12,
            Cdn => 14,
            Wen => 15,
            Sli => 16,
            Ack => 20,
            Unknown(n) => n,
        }
    }

    /// Whether this message kind is scoped to a session rather than the
    /// tunnel as a whole.
    pub fn is_session_scoped(self) -> bool {
        matches!(
            self,
            MessageTypeCode::Icrq
                | MessageTypeCode::Icrp
                | MessageTypeCode::Iccn
                | MessageTypeCode::Cdn
                | MessageTypeCode::Ocrq
                | MessageTypeCode::Ocrp
                | MessageTypeCode::Occn
        )
    }
}

/// Result codes a StopCCN may carry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopCcnResult {
    Reserved,
    Clear,
    GeneralError,
    AlreadyExists,
    NotAuthorized,
    UnsupportedVersion,
    ShuttingDown,
    FsmError,
    Other(u16),
}

impl StopCcnResult {
    pub fn wire_code(self) -> u16 {
        use StopCcnResult::*;
        match self {
            Reserved => 0,
            Clear => 1,
            GeneralError => 2,
            AlreadyExists => 3,
            NotAuthorized => 4,
            UnsupportedVersion => 5,
            ShuttingDown => 6,
            FsmError => 7,
            Other(n) => n,
        }
    }

    pub fn from_wire(code: u16) -> StopCcnResult {
        use StopCcnResult::*;
        match code {
            0 => Reserved,
            1 => Clear,
            2 => GeneralError,
            3 => AlreadyExists,
            4 => NotAuthorized,
            5 => UnsupportedVersion,
            6 => ShuttingDown,
            7 => FsmError,
            n => Other(n),
        }
    }
}

impl fmt::Display for StopCcnResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StopCcnResult::*;
        let s = match self {
            Reserved => "reserved",
            Clear => "general request to clear the tunnel",
            GeneralError => "general error",
            AlreadyExists => "control channel already exists",
            NotAuthorized => "requester not authorized",
            UnsupportedVersion => "protocol version not supported",
            ShuttingDown => "shutting down",
            FsmError => "finite state machine error",
            Other(_) => "unrecognized result code",
        };
        write!(f, "{s}")
    }
}

/// Result codes a CDN may carry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CdnResult {
    Reserved,
    LostCarrier,
    GeneralError,
    AdminDisconnect,
    NoResources,
    NotAvailable,
    InvalidDestination,
    NoAnswer,
    Busy,
    NoDialtone,
    Timeout,
    BadTransport,
    Other(u16),
}

impl CdnResult {
    pub fn wire_code(self) -> u16 {
        use CdnResult::*;
        match self {
            Reserved => 0,
            LostCarrier => 1,
            GeneralError => 2,
            AdminDisconnect => 3,
            NoResources => 4,
            NotAvailable => 5,
            InvalidDestination => 6,
            NoAnswer => 7,
            Busy => 8,
            NoDialtone => 9,
            Timeout => 10,
            BadTransport => 11,
            Other(n) => n,
        }
    }

    pub fn from_wire(code: u16) -> CdnResult {
        use CdnResult::*;
        match code {
            0 => Reserved,
            1 => LostCarrier,
            2 => GeneralError,
            3 => AdminDisconnect,
            4 => NoResources,
            5 => NotAvailable,
            6 => InvalidDestination,
            7 => NoAnswer,
            8 => Busy,
            9 => NoDialtone,
            10 => Timeout,
            11 => BadTransport,
            n => Other(n),
        }
    }
}

impl fmt::Display for CdnResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CdnResult::*;
        let s = match self {
            Reserved => "reserved",
            LostCarrier => "lost carrier",
            GeneralError => "general error",
            AdminDisconnect => "administrative disconnect",
            NoResources => "no resources available",
            NotAvailable => "not available",
            InvalidDestination => "invalid destination",
            NoAnswer => "call failed to be established within timeout",
            Busy => "call connected but physically disconnected",
            NoDialtone => "call connected but no dialtone detected",
            Timeout => "call connected but timed out",
            BadTransport => "call connected but wrong transport type",
            Other(_) => "unrecognized result code",
        };
        write!(f, "{s}")
    }
}

/// Protocol-level error codes carried alongside a result code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorCode {
    NoError,
    NoControlConnection,
    BadLength,
    BadValue,
    NoResource,
    InvalidSessionId,
    VendorSpecific,
    TryAnother,
    MbitShutdown,
    Other(u16),
}

impl ErrorCode {
    pub fn wire_code(self) -> u16 {
        use ErrorCode::*;
        match self {
            NoError => 0,
            NoControlConnection => 1,
            BadLength => 2,
            BadValue => 3,
            NoResource => 4,
            InvalidSessionId => 5,
            VendorSpecific => 6,
            TryAnother => 7,
            MbitShutdown => 8,
            Other(n) => n,
        }
    }

    pub fn from_wire(code: u16) -> ErrorCode {
        use ErrorCode::*;
        match code {
            0 => NoError,
            1 => NoControlConnection,
            2 => BadLength,
            3 => BadValue,
            4 => NoResource,
            5 => InvalidSessionId,
            6 => VendorSpecific,
            7 => TryAnother,
            8 => MbitShutdown,
            n => Other(n),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ErrorCode::*;
        let s = match self {
            NoError => "no general error",
            NoControlConnection => "no control connection exists for this LAC-LNS pair",
            BadLength => "length is wrong",
            BadValue => "one of the field values was out of range",
            NoResource => "insufficient resources to process this operation",
            InvalidSessionId => "the session id is invalid for this tunnel",
            VendorSpecific => "a vendor-specific error occurred",
            TryAnother => "try another LNS",
            MbitShutdown => "mandatory AVP not recognized",
            Other(_) => "unrecognized error code",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips() {
        for code in [1u16, 2, 3, 4, 6, 7, 8, 9, 10, 11, 12, 14, 15, 16, 20] {
            let mt = MessageTypeCode::from_wire(code);
            assert_eq!(mt.wire_code(), code);
        }
    }

    #[test]
    fn unknown_vendor_is_opaque() {
        assert_eq!(
            AttributeType::from_wire(9, 0),
            AttributeType::Unknown(9, 0)
        );
    }

    #[test]
    fn session_scoped_messages() {
        assert!(MessageTypeCode::Icrq.is_session_scoped());
        assert!(MessageTypeCode::Cdn.is_session_scoped());
        assert!(!MessageTypeCode::Sccrq.is_session_scoped());
        assert!(!MessageTypeCode::Hello.is_session_scoped());
    }
}
