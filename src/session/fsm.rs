//! Pure session FSM transition logic.

use crate::avp::MessageTypeCode;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    WaitTunnel,
    WaitReply,
    Established,
    Dead,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Inbound {
    Icrq,
    Icrp,
    Iccn,
    Cdn,
    Other,
}

impl Inbound {
    pub fn classify(mt: MessageTypeCode) -> Inbound {
        match mt {
            MessageTypeCode::Icrq => Inbound::Icrq,
            MessageTypeCode::Icrp => Inbound::Icrp,
            MessageTypeCode::Iccn => Inbound::Iccn,
            MessageTypeCode::Cdn => Inbound::Cdn,
            _ => Inbound::Other,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Action {
    /// No transition for this (state, event) pair.
    None,
    /// Learn peer session ID, send ICCN, install session dataplane, query
    /// the interface name, emit `SessionUp`.
    CompleteEstablish,
    /// Tear the session down without sending anything (peer already knows).
    Close,
    /// Send CDN with a result code, then tear down.
    SendCdnAndClose,
}

pub fn on_inbound(state: SessionState, event: Inbound) -> Action {
    use Action::*;
    use Inbound::*;
    use SessionState::*;
    match (state, event) {
        (WaitReply, Icrp) => CompleteEstablish,
        (WaitReply, Cdn) | (WaitReply, Iccn) => Close,
        (WaitReply, Icrq) => SendCdnAndClose,
        (Established, Cdn) => Close,
        (Established, Icrq) | (Established, Icrp) | (Established, Iccn) => SendCdnAndClose,
        _ => None,
    }
}

/// What to do when the owner asks the session to close: `wait-tunnel` has nothing to tell the peer yet, everywhere
/// else a CDN is owed.
pub fn on_user_close(state: SessionState) -> Action {
    match state {
        SessionState::WaitTunnel => Action::Close,
        SessionState::WaitReply | SessionState::Established => Action::SendCdnAndClose,
        SessionState::Dead => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icrp_in_wait_reply_completes_establish() {
        assert_eq!(
            on_inbound(SessionState::WaitReply, Inbound::Icrp),
            Action::CompleteEstablish
        );
    }

    #[test]
    fn cdn_always_closes() {
        assert_eq!(on_inbound(SessionState::WaitReply, Inbound::Cdn), Action::Close);
        assert_eq!(on_inbound(SessionState::Established, Inbound::Cdn), Action::Close);
    }

    #[test]
    fn user_close_before_reply_sends_nothing() {
        assert_eq!(on_user_close(SessionState::WaitTunnel), Action::Close);
    }

    #[test]
    fn user_close_once_established_sends_cdn() {
        assert_eq!(
            on_user_close(SessionState::Established),
            Action::SendCdnAndClose
        );
    }
}
