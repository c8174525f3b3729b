//! Pure tunnel FSM transition logic , kept free of I/O and
//! threading so the state table itself is directly testable.

use crate::avp::MessageTypeCode;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TunnelState {
    Idle,
    WaitCtlReply,
    Established,
    /// StopCCN sent or received; draining in-flight transport traffic for
    /// `stopccn_timeout` before closing.
    StopccnPending,
    Dead,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Inbound {
    Sccrq,
    Sccrp,
    Scccn,
    StopCcn,
    Hello,
    SessionScoped,
    Other,
}

impl Inbound {
    pub fn classify(mt: MessageTypeCode) -> Inbound {
        match mt {
            MessageTypeCode::Sccrq => Inbound::Sccrq,
            MessageTypeCode::Sccrp => Inbound::Sccrp,
            MessageTypeCode::Scccn => Inbound::Scccn,
            MessageTypeCode::StopCcn => Inbound::StopCcn,
            MessageTypeCode::Hello => Inbound::Hello,
            mt if mt.is_session_scoped() => Inbound::SessionScoped,
            _ => Inbound::Other,
        }
    }
}

/// What the tunnel actor should do for an inbound message, decided purely
/// from `(state, event)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Action {
    /// No FSM action beyond transport-level processing (Hello, or any
    /// event this table doesn't name for the current state).
    None,
    /// Learn the peer tunnel ID, connect the socket, send SCCCN, install
    /// the data plane, emit `TunnelUp`, notify linked sessions.
    CompleteHandshake,
    /// Peer sent StopCCN first: enter the drain without replying.
    DrainOnPeerStopCcn,
    /// Send our own StopCCN (general error) and enter the drain.
    SendStopCcn,
    /// Forward to the session keyed by the message's local session ID.
    ForwardToSession,
}

pub fn on_inbound(state: TunnelState, event: Inbound) -> Action {
    use Action::*;
    use Inbound::*;
    use TunnelState::*;
    match (state, event) {
        (_, Hello) => None,
        (WaitCtlReply, Sccrp) => CompleteHandshake,
        (WaitCtlReply, StopCcn) => DrainOnPeerStopCcn,
        (WaitCtlReply, Sccrq) | (WaitCtlReply, Scccn) => SendStopCcn,
        (Established, StopCcn) => DrainOnPeerStopCcn,
        (Established, SessionScoped) => ForwardToSession,
        (Established, Sccrq) | (Established, Sccrp) | (Established, Scccn) => SendStopCcn,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sccrp_in_wait_ctl_reply_completes_handshake() {
        assert_eq!(
            on_inbound(TunnelState::WaitCtlReply, Inbound::Sccrp),
            Action::CompleteHandshake
        );
    }

    #[test]
    fn stopccn_from_established_drains() {
        assert_eq!(
            on_inbound(TunnelState::Established, Inbound::StopCcn),
            Action::DrainOnPeerStopCcn
        );
    }

    #[test]
    fn established_session_scoped_message_forwards() {
        assert_eq!(
            on_inbound(TunnelState::Established, Inbound::SessionScoped),
            Action::ForwardToSession
        );
    }

    #[test]
    fn hello_is_always_a_no_op() {
        for s in [
            TunnelState::Idle,
            TunnelState::WaitCtlReply,
            TunnelState::Established,
            TunnelState::Dead,
        ] {
            assert_eq!(on_inbound(s, Inbound::Hello), Action::None);
        }
    }

    #[test]
    fn unexpected_sccrq_in_established_triggers_stopccn() {
        assert_eq!(
            on_inbound(TunnelState::Established, Inbound::Sccrq),
            Action::SendStopCcn
        );
    }
}
