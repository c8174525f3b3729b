//! Per-message-type shape validation.
//!
//! A missing required AVP or an illegal zero/nonzero id field fails
//! validation; the caller (the tunnel FSM) maps the resulting
//! [`ValidationError`] to a StopCCN result/error code and tears the tunnel
//! down.

use crate::avp::{Avp, AttributeType, MessageTypeCode};
use crate::error::ValidationError;

use super::ControlMessage;

fn required_avps(mt: MessageTypeCode) -> &'static [AttributeType] {
    use AttributeType::*;
    use MessageTypeCode::*;
    match mt {
        Sccrq => &[ProtocolVersion, HostName, FramingCapabilities, AssignedTunnelId],
        Sccrp => &[ProtocolVersion, HostName, FramingCapabilities, AssignedTunnelId],
        Scccn => &[],
        StopCcn => &[AssignedTunnelId, ResultCode],
        Hello => &[],
        Icrq => &[AssignedSessionId, CallSerialNumber],
        Icrp => &[AssignedSessionId],
        Iccn => &[TxConnectSpeed, FramingType],
        Cdn => &[ResultCode],
        Ocrq | Ocrp | Occn => &[],
        Wen | Sli | Ack | Illegal | Unknown(_) => &[],
    }
}

/// `Validate`: checks the required-AVP table, then a small set
/// of id-field rules for the two message kinds that are always sent before
/// the corresponding id is known to the sender (SCCRQ's tunnel id, ICRQ's
/// session id). Every other message kind is reached only once the FSM
/// already knows both ids, so no further zero/nonzero table is needed.
pub fn validate(msg: &ControlMessage) -> Result<(), ValidationError> {
    let mt = msg.message_type();
    for &required in required_avps(mt) {
        if Avp::find(msg.avps(), required).is_none() {
            return Err(ValidationError::MissingRequiredAvp {
                message_type: mt,
                attribute_type: required,
            });
        }
    }
    if let ControlMessage::V2(m) = msg {
        if mt == MessageTypeCode::Icrq && m.session_id != 0 {
            return Err(ValidationError::IllegalNonzeroField {
                message_type: mt,
                field: "session_id",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::Avp;

    #[test]
    fn sccrq_missing_host_name_fails() {
        let msg = ControlMessage::V2(super::super::V2Message {
            tunnel_id: 0,
            session_id: 0,
            ns: 0,
            nr: 0,
            avps: vec![
                Avp::message_type(MessageTypeCode::Sccrq),
                Avp::u16(AttributeType::ProtocolVersion, true, 0x0100),
                Avp::u32(AttributeType::FramingCapabilities, true, 3),
                Avp::u16(AttributeType::AssignedTunnelId, true, 5),
            ],
            message_type: MessageTypeCode::Sccrq,
        });
        assert!(matches!(
            validate(&msg),
            Err(ValidationError::MissingRequiredAvp { .. })
        ));
    }

    #[test]
    fn hello_has_no_required_avps() {
        let msg = ControlMessage::V2(super::super::V2Message {
            tunnel_id: 1,
            session_id: 0,
            ns: 0,
            nr: 0,
            avps: vec![Avp::message_type(MessageTypeCode::Hello)],
            message_type: MessageTypeCode::Hello,
        });
        assert!(validate(&msg).is_ok());
    }
}
