//! `Build`: typed constructors for each outgoing message kind,
//! assembling the header and mandatory AVPs from tunnel/session
//! configuration. Ns/Nr are always written as zero here; the reliable
//! transport stamps real values just before transmission via
//! [`super::ControlMessage::set_ns_nr`].

use crate::avp::{Avp, AttributeType, CdnResult, ErrorCode, MessageTypeCode, ResultCodeAvp, StopCcnResult};
use crate::config::TunnelConfig;
use crate::ids::{ControlConnId, ProtocolVersion, SessionId};

use super::{ControlMessage, V2Message, V3Message};

fn wrap(version: ProtocolVersion, tid: ControlConnId, sid: SessionId, message_type: MessageTypeCode, mut avps: Vec<Avp>) -> ControlMessage {
    avps.insert(0, Avp::message_type(message_type));
    if version.is_v2() {
        ControlMessage::V2(V2Message {
            tunnel_id: tid.as_v2_u16(),
            session_id: sid.as_v2_u16(),
            ns: 0,
            nr: 0,
            avps,
            message_type,
        })
    } else {
        ControlMessage::V3(V3Message {
            control_conn_id: tid,
            ns: 0,
            nr: 0,
            avps,
            message_type,
        })
    }
}

/// SCCRQ: `local_tid` is our own id (zero if not yet assigned is never
/// legal, so callers always pass the real local tunnel id; the peer's id
/// is omitted since it isn't known yet at this point).
pub fn sccrq(cfg: &TunnelConfig, local_tid: ControlConnId) -> ControlMessage {
    let avps = vec![
        Avp::u16(AttributeType::ProtocolVersion, true, version_avp(cfg.version)),
        Avp::string(AttributeType::HostName, true, &cfg.host_name),
        Avp::u32(AttributeType::FramingCapabilities, true, cfg.framing_caps.to_bits()),
        id_avp(cfg.version, AttributeType::AssignedTunnelId, local_tid),
    ];
    wrap(cfg.version, local_tid, SessionId::ZERO, MessageTypeCode::Sccrq, avps)
}

pub fn sccrp(cfg: &TunnelConfig, local_tid: ControlConnId, peer_tid: ControlConnId) -> ControlMessage {
    let avps = vec![
        Avp::u16(AttributeType::ProtocolVersion, true, version_avp(cfg.version)),
        Avp::string(AttributeType::HostName, true, &cfg.host_name),
        Avp::u32(AttributeType::FramingCapabilities, true, cfg.framing_caps.to_bits()),
        id_avp(cfg.version, AttributeType::AssignedTunnelId, local_tid),
    ];
    wrap(cfg.version, peer_tid, SessionId::ZERO, MessageTypeCode::Sccrp, avps)
}

pub fn scccn(cfg: &TunnelConfig, peer_tid: ControlConnId) -> ControlMessage {
    wrap(cfg.version, peer_tid, SessionId::ZERO, MessageTypeCode::Scccn, Vec::new())
}

/// StopCCN. `error` carries the optional protocol error code/message that
/// accompanies the mandatory result code.
pub fn stop_ccn(
    cfg: &TunnelConfig,
    local_tid: ControlConnId,
    peer_tid: ControlConnId,
    result: StopCcnResult,
    error: Option<(ErrorCode, String)>,
) -> ControlMessage {
    let rc = ResultCodeAvp {
        result_code: result.wire_code(),
        error_code: error.as_ref().map(|(ec, _)| ec.wire_code()),
        message: error.map(|(_, msg)| msg),
    };
    let avps = vec![
        id_avp(cfg.version, AttributeType::AssignedTunnelId, local_tid),
        Avp::result_code(&rc),
    ];
    wrap(cfg.version, peer_tid, SessionId::ZERO, MessageTypeCode::StopCcn, avps)
}

pub fn hello(cfg: &TunnelConfig, peer_tid: ControlConnId) -> ControlMessage {
    wrap(cfg.version, peer_tid, SessionId::ZERO, MessageTypeCode::Hello, Vec::new())
}

/// Session-scoped builders take the tunnel's `version` directly rather
/// than a whole `&TunnelConfig`: none of the AVPs below depend on any
/// other tunnel-level setting, and this lets [`crate::session`] build
/// messages without holding a reference to its parent tunnel's config.
pub fn icrq(version: ProtocolVersion, peer_tid: ControlConnId, local_sid: SessionId, call_serial: u32) -> ControlMessage {
    let avps = vec![
        id_avp(version, AttributeType::AssignedSessionId, sid_as_tid(local_sid)),
        Avp::u32(AttributeType::CallSerialNumber, true, call_serial),
    ];
    wrap(version, peer_tid, SessionId::ZERO, MessageTypeCode::Icrq, avps)
}

pub fn icrp(version: ProtocolVersion, peer_tid: ControlConnId, peer_sid: SessionId, local_sid: SessionId) -> ControlMessage {
    let avps = vec![id_avp(version, AttributeType::AssignedSessionId, sid_as_tid(local_sid))];
    wrap(version, peer_tid, peer_sid, MessageTypeCode::Icrp, avps)
}

pub fn iccn(
    version: ProtocolVersion,
    peer_tid: ControlConnId,
    peer_sid: SessionId,
    tx_connect_speed: u32,
    framing_type: u32,
) -> ControlMessage {
    let avps = vec![
        Avp::u32(AttributeType::TxConnectSpeed, true, tx_connect_speed),
        Avp::u32(AttributeType::FramingType, true, framing_type),
    ];
    wrap(version, peer_tid, peer_sid, MessageTypeCode::Iccn, avps)
}

pub fn cdn(
    version: ProtocolVersion,
    peer_tid: ControlConnId,
    peer_sid: SessionId,
    result: CdnResult,
    error: Option<(ErrorCode, String)>,
) -> ControlMessage {
    let rc = ResultCodeAvp {
        result_code: result.wire_code(),
        error_code: error.as_ref().map(|(ec, _)| ec.wire_code()),
        message: error.map(|(_, msg)| msg),
    };
    let avps = vec![Avp::result_code(&rc)];
    wrap(version, peer_tid, peer_sid, MessageTypeCode::Cdn, avps)
}

fn version_avp(version: ProtocolVersion) -> u16 {
    match version {
        ProtocolVersion::V2 | ProtocolVersion::V3Fallback => 0x0100,
        ProtocolVersion::V3 => 0x0300,
    }
}

/// Writes an id field as a 16-bit AVP for V2 or a 32-bit AVP for V3.
fn id_avp(version: ProtocolVersion, ty: AttributeType, id: ControlConnId) -> Avp {
    if version.is_v2() {
        Avp::u16(ty, true, id.as_v2_u16())
    } else {
        Avp::u32(ty, true, id.0)
    }
}

fn sid_as_tid(sid: SessionId) -> ControlConnId {
    ControlConnId(sid.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FramingCaps, TunnelMode};
    use crate::ids::EncapType;
    use std::time::Duration;

    fn v2_cfg() -> TunnelConfig {
        TunnelConfig {
            name: "t0".into(),
            local: "127.0.0.1:1701".parse().unwrap(),
            peer: None,
            encap: EncapType::Udp,
            version: ProtocolVersion::V2,
            mode: TunnelMode::Dynamic,
            tid: 1,
            ptid: None,
            window_size: 4,
            hello_timeout: Duration::from_secs(60),
            retry_timeout: Duration::from_secs(1),
            max_retries: 3,
            ack_timeout: Duration::from_millis(100),
            host_name: "openv3".into(),
            framing_caps: FramingCaps::BOTH,
            stopccn_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn sccrq_build_matches_wire_bytes() {
        let mut cfg = v2_cfg();
        cfg.host_name = "openv3".into();
        cfg.framing_caps = FramingCaps::BOTH;
        cfg.tid = 0x5f2b;
        let msg = sccrq(&cfg, ControlConnId(0x5f2b));
        let bytes = msg.encode();
        assert_eq!(&bytes[0..2], &[0xC8, 0x02]);
        assert_eq!(&bytes[4..6], &[0x5F, 0x2B]); // tunnel-id
        assert_eq!(&bytes[6..12], &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]); // session-id, Ns, Nr
        assert_eq!(&bytes[12..20], &[0x80, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn sccrq_carries_mandatory_avps() {
        let cfg = v2_cfg();
        let msg = sccrq(&cfg, ControlConnId(1));
        assert_eq!(msg.message_type(), MessageTypeCode::Sccrq);
        assert_eq!(msg.avps().len(), 5);
        let host = Avp::find(msg.avps(), AttributeType::HostName).unwrap();
        assert_eq!(host.decode_string().unwrap(), "openv3");
    }

    #[test]
    fn stop_ccn_carries_result_code() {
        let cfg = v2_cfg();
        let msg = stop_ccn(
            &cfg,
            ControlConnId(1),
            ControlConnId(7),
            StopCcnResult::Clear,
            None,
        );
        assert_eq!(msg.message_type(), MessageTypeCode::StopCcn);
        let rc = Avp::find(msg.avps(), AttributeType::ResultCode)
            .unwrap()
            .decode_result_code()
            .unwrap();
        assert_eq!(rc.result_code, StopCcnResult::Clear.wire_code());
        assert_eq!(msg.as_v2().unwrap().tunnel_id, 7);
    }

    #[test]
    fn v3_uses_32_bit_id_avps() {
        let mut cfg = v2_cfg();
        cfg.version = ProtocolVersion::V3;
        let msg = sccrq(&cfg, ControlConnId(0x1_0000));
        let avp = Avp::find(msg.avps(), AttributeType::AssignedTunnelId).unwrap();
        assert_eq!(avp.decode_u32().unwrap(), 0x1_0000);
    }
}
