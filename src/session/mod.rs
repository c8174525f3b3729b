//! The session actor: one task per session that selects
//! over session-scoped messages forwarded by the tunnel, a tunnel-open
//! notification, and its own close signal. State is never touched from
//! the tunnel's task except through these channels.

mod fsm;

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::avp::CdnResult;
use crate::config::SessionConfig;
use crate::dataplane::{Dataplane, SessionHandle};
use crate::events::Event;
use crate::ids::SessionId;
use crate::message::{self, ControlMessage};
use crate::tunnel::TunnelHandleForSession;

use fsm::{Action, Inbound, SessionState};

/// A running session actor. Dropping it closes the session synchronously.
pub struct Session {
    name: String,
    inbound_tx: Sender<ControlMessage>,
    open_tx: Sender<()>,
    close_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Session {
    pub fn spawn(
        cfg: SessionConfig,
        tunnel_name: String,
        tunnel: Weak<dyn TunnelHandleForSession>,
        dataplane: Arc<dyn Dataplane>,
    ) -> Session {
        let name = cfg.name.clone();
        let (inbound_tx, inbound_rx) = unbounded::<ControlMessage>();
        let (open_tx, open_rx) = bounded::<()>(1);
        let (close_tx, close_rx) = bounded::<()>(1);
        let thread = std::thread::spawn(move || {
            run(cfg, tunnel_name, tunnel, dataplane, inbound_rx, open_rx, close_rx);
        });
        Session {
            name,
            inbound_tx,
            open_tx,
            close_tx,
            thread: Some(thread),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwards a session-scoped message received by the tunnel.
    pub fn deliver(&self, msg: ControlMessage) {
        let _ = self.inbound_tx.send(msg);
    }

    /// Tells a linked-but-waiting session that the tunnel reached
    /// `established`.
    pub fn notify_tunnel_open(&self) {
        let _ = self.open_tx.send(());
    }

    pub fn close(&mut self) {
        let _ = self.close_tx.send(());
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    cfg: SessionConfig,
    tunnel_name: String,
    tunnel: Weak<dyn TunnelHandleForSession>,
    dataplane: Arc<dyn Dataplane>,
    inbound_rx: Receiver<ControlMessage>,
    open_rx: Receiver<()>,
    close_rx: Receiver<()>,
) {
    let name = cfg.name.clone();
    let local_sid = SessionId(cfg.sid);
    let mut state = SessionState::WaitTunnel;
    let mut peer_sid = SessionId::ZERO;
    let mut handle: Option<Box<dyn SessionHandle>> = None;

    loop {
        select! {
            recv(open_rx) -> _ => {
                if state != SessionState::WaitTunnel {
                    continue;
                }
                let Some(t) = tunnel.upgrade() else { return };
                let call_serial = t.next_call_serial();
                let msg = message::icrq(t.version(), t.peer_tid(), local_sid, call_serial);
                if t.send(msg).is_err() {
                    warn!(session = %name, "ICRQ send failed, tearing down session");
                    close_session(&name, &tunnel_name, &tunnel, &mut handle, None);
                    return;
                }
                state = SessionState::WaitReply;
            }
            recv(inbound_rx) -> msg => {
                let Ok(msg) = msg else { return };
                let Some(t) = tunnel.upgrade() else { return };
                let event = Inbound::classify(msg.message_type());
                match fsm::on_inbound(state, event) {
                    Action::CompleteEstablish => {
                        peer_sid = SessionId(match &msg {
                            ControlMessage::V2(m) => m.session_id as u32,
                            ControlMessage::V3(m) => m.control_conn_id.0,
                        });
                        let iccn = message::iccn(t.version(), t.peer_tid(), peer_sid, 0, 1);
                        if t.send(iccn).is_err() {
                            close_session(&name, &tunnel_name, &tunnel, &mut handle, None);
                            return;
                        }
                        match dataplane.new_session(t.local_tid(), t.peer_tid(), local_sid, &cfg) {
                            Ok(h) => {
                                let iface = h.interface_name();
                                handle = Some(h);
                                info!(session = %name, interface = %iface, "session established");
                                t.dispatch(Event::SessionUp {
                                    tunnel: tunnel_name.clone(),
                                    session: name.clone(),
                                    local_sid,
                                    peer_sid,
                                    interface_name: iface,
                                });
                            }
                            Err(e) => {
                                warn!(session = %name, error = %e, "dataplane session install failed");
                            }
                        }
                        state = SessionState::Established;
                    }
                    Action::Close => {
                        close_session(&name, &tunnel_name, &tunnel, &mut handle, None);
                        return;
                    }
                    Action::SendCdnAndClose => {
                        let cdn = message::cdn(t.version(), t.peer_tid(), peer_sid, CdnResult::GeneralError, None);
                        let _ = t.send(cdn);
                        close_session(&name, &tunnel_name, &tunnel, &mut handle, None);
                        return;
                    }
                    Action::None => {
                        debug!(session = %name, ?state, ?event, "no transition for inbound message");
                    }
                }
            }
            recv(close_rx) -> _ => {
                if let Some(t) = tunnel.upgrade() {
                    if let Action::SendCdnAndClose = fsm::on_user_close(state) {
                        let cdn = message::cdn(t.version(), t.peer_tid(), peer_sid, CdnResult::AdminDisconnect, None);
                        let _ = t.send(cdn);
                    }
                }
                close_session(&name, &tunnel_name, &tunnel, &mut handle, None);
                return;
            }
        }
    }
}

/// `close`: tears down the data plane if any, emits
/// `SessionDown`, unlinks from the parent tunnel.
fn close_session(
    name: &str,
    tunnel_name: &str,
    tunnel: &Weak<dyn TunnelHandleForSession>,
    handle: &mut Option<Box<dyn SessionHandle>>,
    reason: Option<String>,
) {
    if let Some(mut h) = handle.take() {
        h.down();
    }
    if let Some(t) = tunnel.upgrade() {
        t.dispatch(Event::SessionDown {
            tunnel: tunnel_name.to_string(),
            session: name.to_string(),
            reason,
        });
        t.unlink_session(name);
    }
}

#[cfg(test)]
mod tests {
    use super::fsm::*;

    #[test]
    fn user_close_in_wait_tunnel_sends_nothing() {
        assert_eq!(on_user_close(SessionState::WaitTunnel), Action::Close);
    }
}
