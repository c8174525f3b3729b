//! Error kinds for every fallible surface of the crate.
//!
//! Each concern gets its own `thiserror`-derived enum, mirroring how the
//! rest of this codebase keeps one error type per module rather than a
//! single do-everything enum. [`Error`] wraps all of them for call sites
//! that can fail for more than one reason.

use std::io;
use std::net::SocketAddr;

use thiserror::Error as ThisError;

use crate::avp::{AttributeType, ErrorCode, MessageTypeCode};

/// A malformed wire value: bad framing, an unparseable AVP, a missing
/// Message-Type AVP. Recoverable for unknown non-mandatory AVPs; fatal to
/// the enclosing parse otherwise.
#[derive(Debug, Clone, ThisError)]
pub enum CodecError {
    #[error("AVP header length {0} out of range [6, 1023]")]
    BadAvpLength(u16),
    #[error("buffer has {remaining} bytes left, need {needed}")]
    Truncated { needed: usize, remaining: usize },
    #[error("message carried zero AVPs and is not a V2 zero-length-body ack")]
    NoAvps,
    #[error("AVP (vendor {vendor_id}, type {attribute_type}) has mandatory bit set but is unknown to this implementation")]
    UnknownMandatoryAvp { vendor_id: u16, attribute_type: u16 },
    #[error("AVP type {0:?} decoded as the wrong payload type")]
    WrongDataType(AttributeType),
    #[error("first AVP in message is not Message-Type")]
    MissingMessageTypeAvp,
    #[error("unrecognized protocol version nibble {0:#x}")]
    UnknownProtocolVersion(u8),
    #[error("message declares length {declared} but datagram only has {available} bytes remaining")]
    MessageLengthOverrun { declared: usize, available: usize },
}

/// A message is well-formed but violates the per-message-type shape rules
/// (missing required AVP, illegal zero/non-zero id field).
#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("message type {message_type:?} is missing required AVP {attribute_type:?}")]
    MissingRequiredAvp {
        message_type: MessageTypeCode,
        attribute_type: AttributeType,
    },
    #[error("message type {message_type:?} requires a nonzero {field}")]
    IllegalZeroField {
        message_type: MessageTypeCode,
        field: &'static str,
    },
    #[error("message type {message_type:?} requires a zero {field}")]
    IllegalNonzeroField {
        message_type: MessageTypeCode,
        field: &'static str,
    },
}

impl ValidationError {
    /// The protocol-level error code this validation failure maps to, used
    /// to build the StopCCN/CDN that reports it.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ValidationError::MissingRequiredAvp { .. } => ErrorCode::BadValue,
            ValidationError::IllegalZeroField { .. } => ErrorCode::BadValue,
            ValidationError::IllegalNonzeroField { .. } => ErrorCode::BadValue,
        }
    }
}

/// The reliable transport has failed outright: retransmission
/// exhausted or the underlying socket errored. Fatal to the owning tunnel.
#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("retransmission of Ns={ns} exhausted after {retries} attempts")]
    RetriesExhausted { ns: u16, retries: u32 },
    #[error("control-plane socket I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("transport closed while a send was pending")]
    Closed,
    #[error("peer at {0} sent a message with Nr outside the valid window")]
    MalformedSequence(SocketAddr),
}

/// The FSM received an event for which the current state has no
/// transition. Always fatal: the owning tunnel or session tears down.
#[derive(Debug, ThisError)]
pub enum FsmError {
    #[error("tunnel '{tunnel}' in state {state} has no transition for {event}")]
    UnhandledTunnelEvent { tunnel: String, state: &'static str, event: &'static str },
    #[error("session '{session}' in state {state} has no transition for {event}")]
    UnhandledSessionEvent { session: String, state: &'static str, event: &'static str },
}

/// Rejected at tunnel/session creation time; no state changes are made.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("tunnel id {0:#x} does not fit in 16 bits, required for L2TPv2")]
    TunnelIdOverflowsV2(u32),
    #[error("session id {0:#x} does not fit in 16 bits, required for L2TPv2")]
    SessionIdOverflowsV2(u32),
    #[error("tunnel or session id 0 is reserved and cannot be assigned")]
    ZeroId,
    #[error("a tunnel named '{0}' already exists in this context")]
    DuplicateTunnelName(String),
    #[error("a session named '{0}' already exists under this tunnel")]
    DuplicateSessionName(String),
    #[error("local tunnel id {0:#x} is already in use in this context")]
    DuplicateTunnelId(u32),
    #[error("local session id {0:#x} is already in use under this tunnel")]
    DuplicateSessionId(u32),
    #[error("IP encapsulation is only valid for L2TPv3")]
    IpEncapRequiresV3,
    #[error("dynamic L2TPv3 tunnels are not supported; use Static or Quiescent mode for V3")]
    V3DynamicUnsupported,
    #[error("host_name must not be empty")]
    EmptyHostName,
    #[error("rejection sampling could not find a free {0} id after {1} attempts")]
    IdAllocationExhausted(&'static str, u32),
    #[error("a dynamic tunnel requires a configured peer address")]
    MissingPeerAddress,
}

/// The union of every error kind the crate surfaces across module
/// boundaries.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Fsm(#[from] FsmError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
