//! The tunnel actor: drives the control-channel FSM over
//! a [`Transport`], owns a collection of [`Session`]s, and installs the
//! tunnel-level row in the data plane on handshake completion.
//!
//! The FSM itself runs on a dedicated task reading [`Transport::deliveries`]
//! (the sender and receiver tasks are the ones [`Transport::spawn`]
//! already owns; this task is the one that turns delivered messages into
//! state transitions).

pub mod fsm;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::avp::{Avp, AttributeType, ErrorCode, StopCcnResult};
use crate::config::{SessionConfig, TunnelConfig, TunnelMode};
use crate::context::ContextHandle;
use crate::dataplane::{Dataplane, TunnelHandle as DpTunnelHandle};
use crate::error::{ConfigError, Error, TransportError};
use crate::events::Event;
use crate::ids::{ControlConnId, ProtocolVersion, SessionId};
use crate::message::{self, ControlMessage};
use crate::session::Session;
use crate::socket::ControlSocket;
use crate::transport::{Transport, TransportConfig, TransportSender};

use fsm::{Action, Inbound, TunnelState};

/// Non-owning handle a [`Session`] uses to reach its parent tunnel.
pub trait TunnelHandleForSession: Send + Sync {
    fn version(&self) -> ProtocolVersion;
    fn local_tid(&self) -> ControlConnId;
    fn peer_tid(&self) -> ControlConnId;
    fn send(&self, msg: ControlMessage) -> Result<(), TransportError>;
    fn next_call_serial(&self) -> u32;
    fn unlink_session(&self, name: &str);
    fn dispatch(&self, event: Event);
}

struct TunnelInner {
    name: String,
    version: ProtocolVersion,
    local_tid: ControlConnId,
    peer_tid: Arc<AtomicU32>,
    transport_sender: TransportSender,
    context: Weak<dyn ContextHandle>,
    sessions: Mutex<HashMap<String, Session>>,
    session_by_sid: Mutex<HashMap<SessionId, String>>,
}

impl TunnelHandleForSession for TunnelInner {
    fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn local_tid(&self) -> ControlConnId {
        self.local_tid
    }

    fn peer_tid(&self) -> ControlConnId {
        ControlConnId(self.peer_tid.load(AtomicOrdering::Acquire))
    }

    fn send(&self, msg: ControlMessage) -> Result<(), TransportError> {
        self.transport_sender.send(msg)
    }

    fn next_call_serial(&self) -> u32 {
        self.context
            .upgrade()
            .map(|c| c.next_call_serial())
            .unwrap_or(0)
    }

    fn unlink_session(&self, name: &str) {
        self.sessions.lock().remove(name);
        self.session_by_sid.lock().retain(|_, v| v != name);
    }

    fn dispatch(&self, event: Event) {
        if let Some(c) = self.context.upgrade() {
            c.dispatch(event);
        }
    }
}

enum Control {
    NewSession(SessionConfig, Sender<Result<(), Error>>),
    Close,
}

/// A running tunnel. Dropping it does not close it — call [`Tunnel::close`]
/// explicitly (the owning [`crate::context::Context`] does this as part of
/// its own teardown).
pub struct Tunnel {
    inner: Arc<TunnelInner>,
    control_tx: Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// Opens a new tunnel: binds the control socket, spawns the reliable
    /// transport, and starts the FSM task. For `Dynamic` mode this also
    /// sends the initial SCCRQ.
    pub fn open(
        cfg: TunnelConfig,
        context: Weak<dyn ContextHandle>,
        dataplane: Arc<dyn Dataplane>,
    ) -> Result<Tunnel, Error> {
        cfg.validate()?;
        if cfg.mode == TunnelMode::Dynamic && cfg.peer.is_none() {
            return Err(ConfigError::MissingPeerAddress.into());
        }
        let peer_addr = cfg.peer.unwrap_or(cfg.local);
        let socket = Arc::new(ControlSocket::bind(cfg.local, cfg.encap)?);
        let transport = Transport::spawn(
            Arc::clone(&socket),
            peer_addr,
            cfg.version,
            TransportConfig::from(&cfg),
        );

        let inner = Arc::new(TunnelInner {
            name: cfg.name.clone(),
            version: cfg.version,
            local_tid: ControlConnId(cfg.tid),
            peer_tid: transport.peer_tid_arc(),
            transport_sender: transport.sender(),
            context,
            sessions: Mutex::new(HashMap::new()),
            session_by_sid: Mutex::new(HashMap::new()),
        });

        let (control_tx, control_rx) = unbounded::<Control>();
        let thread = {
            let inner = Arc::clone(&inner);
            std::thread::spawn(move || run(cfg, peer_addr, transport, inner, dataplane, control_rx))
        };

        Ok(Tunnel {
            inner,
            control_tx,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn local_tid(&self) -> ControlConnId {
        self.inner.local_tid
    }

    /// Links a new session under this tunnel.
    pub fn new_session(&self, cfg: SessionConfig) -> Result<(), Error> {
        let (reply_tx, reply_rx) = bounded(1);
        self.control_tx
            .send(Control::NewSession(cfg, reply_tx))
            .map_err(|_| Error::Transport(TransportError::Closed))?;
        reply_rx.recv().unwrap_or(Err(Error::Transport(TransportError::Closed)))
    }

    /// Drives the FSM to `dead` (StopCCN, drain, then close) and blocks
    /// until the tunnel's task has quiesced.
    pub fn close(&mut self) {
        let _ = self.control_tx.send(Control::Close);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.close();
    }
}

fn send_async(sender: TransportSender, msg: ControlMessage) {
    std::thread::spawn(move || {
        let _ = sender.send(msg);
    });
}

fn decode_peer_tid(msg: &ControlMessage, version: ProtocolVersion) -> Option<ControlConnId> {
    let avp = Avp::find(msg.avps(), AttributeType::AssignedTunnelId)?;
    if version.is_v2() {
        avp.decode_u16().ok().map(ControlConnId::from)
    } else {
        avp.decode_u32().ok().map(ControlConnId)
    }
}

/// Demultiplex key for a session-scoped message. V2 carries it directly
/// in the header; V3 has no session field in the control header, so this
/// looks at the
/// LocalSessionId AVP (the recipient's own ID, as the peer sees it) and
/// falls back to AssignedSessionId for messages that only carry that.
fn local_session_id(msg: &ControlMessage) -> Option<SessionId> {
    match msg {
        ControlMessage::V2(m) => Some(SessionId(m.session_id as u32)),
        ControlMessage::V3(_) => Avp::find(msg.avps(), AttributeType::LocalSessionId)
            .or_else(|| Avp::find(msg.avps(), AttributeType::AssignedSessionId))
            .and_then(|a| a.decode_u32().ok())
            .map(SessionId),
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    cfg: TunnelConfig,
    peer_addr: SocketAddr,
    mut transport: Transport,
    inner: Arc<TunnelInner>,
    dataplane: Arc<dyn Dataplane>,
    control_rx: Receiver<Control>,
) {
    let mut state = TunnelState::Idle;
    let mut dp_handle: Option<Box<dyn DpTunnelHandle>> = None;
    let mut drain_deadline: Option<Instant> = None;

    match cfg.mode {
        TunnelMode::Static => {
            match dataplane.new_tunnel(&cfg, cfg.local, peer_addr, None) {
                Ok(h) => dp_handle = Some(h),
                Err(e) => warn!(tunnel = %inner.name, error = %e, "static dataplane install failed"),
            }
            state = TunnelState::Established;
            inner.dispatch(Event::TunnelUp {
                tunnel: inner.name.clone(),
                local_tid: inner.local_tid,
                peer_tid: ControlConnId(cfg.ptid.unwrap_or(0)),
            });
        }
        TunnelMode::Quiescent => {
            // Transport runs (control traffic is drained and acked) but the
            // FSM never reacts to it.
        }
        TunnelMode::Dynamic => {
            let sccrq = message::sccrq(&cfg, inner.local_tid);
            send_async(inner.transport_sender.clone(), sccrq);
            state = TunnelState::WaitCtlReply;
        }
    }

    loop {
        let timeout = drain_deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::from_millis(200));

        select! {
            recv(transport.deliveries()) -> msg => {
                let Ok(msg) = msg else {
                    warn!(tunnel = %inner.name, "transport closed unexpectedly");
                    close_all(&inner, &mut dp_handle, &mut transport, Some("transport closed".into()));
                    return;
                };
                if state == TunnelState::Dead || state == TunnelState::StopccnPending {
                    continue;
                }
                if !msg.matches_tunnel(inner.local_tid) {
                    debug!(tunnel = %inner.name, "dropping message for foreign tunnel id");
                    continue;
                }
                if msg.version() != inner.version {
                    debug!(tunnel = %inner.name, "dropping message with mismatched protocol version");
                    continue;
                }
                if let Err(e) = message::validate(&msg) {
                    warn!(tunnel = %inner.name, error = %e, "message failed validation, sending StopCCN");
                    let stopccn = message::stop_ccn(
                        &cfg,
                        inner.local_tid,
                        inner.peer_tid(),
                        StopCcnResult::GeneralError,
                        Some((e.error_code(), e.to_string())),
                    );
                    send_async(inner.transport_sender.clone(), stopccn);
                    state = TunnelState::StopccnPending;
                    drain_deadline = Some(Instant::now() + cfg.stopccn_timeout);
                    continue;
                }
                let event = Inbound::classify(msg.message_type());
                match fsm::on_inbound(state, event) {
                    Action::CompleteHandshake => {
                        if let Some(ptid) = decode_peer_tid(&msg, inner.version) {
                            inner.peer_tid.store(ptid.0, AtomicOrdering::Release);
                        }
                        let scccn = message::scccn(&cfg, inner.peer_tid());
                        let _ = transport.send(scccn);
                        match dataplane.new_tunnel(&cfg, cfg.local, peer_addr, None) {
                            Ok(h) => dp_handle = Some(h),
                            Err(e) => warn!(tunnel = %inner.name, error = %e, "dataplane install failed"),
                        }
                        state = TunnelState::Established;
                        info!(tunnel = %inner.name, peer_tid = %inner.peer_tid(), "tunnel established");
                        inner.dispatch(Event::TunnelUp {
                            tunnel: inner.name.clone(),
                            local_tid: inner.local_tid,
                            peer_tid: inner.peer_tid(),
                        });
                        for session in inner.sessions.lock().values() {
                            session.notify_tunnel_open();
                        }
                    }
                    Action::DrainOnPeerStopCcn => {
                        info!(tunnel = %inner.name, "peer sent StopCCN, draining");
                        state = TunnelState::StopccnPending;
                        drain_deadline = Some(Instant::now() + cfg.stopccn_timeout);
                    }
                    Action::SendStopCcn => {
                        let stopccn = message::stop_ccn(
                            &cfg,
                            inner.local_tid,
                            inner.peer_tid(),
                            StopCcnResult::FsmError,
                            None,
                        );
                        send_async(inner.transport_sender.clone(), stopccn);
                        state = TunnelState::StopccnPending;
                        drain_deadline = Some(Instant::now() + cfg.stopccn_timeout);
                    }
                    Action::ForwardToSession => {
                        if let Some(sid) = local_session_id(&msg) {
                            let name = inner.session_by_sid.lock().get(&sid).cloned();
                            match name {
                                Some(name) => {
                                    if let Some(session) = inner.sessions.lock().get(&name) {
                                        session.deliver(msg);
                                    }
                                }
                                None => debug!(tunnel = %inner.name, ?sid, "no session for inbound message"),
                            }
                        }
                    }
                    Action::None => {
                        debug!(tunnel = %inner.name, ?state, ?event, "no transition for inbound message");
                    }
                }
            }
            recv(transport.codec_errors()) -> err => {
                let Ok(err) = err else { continue };
                if state != TunnelState::StopccnPending && state != TunnelState::Dead {
                    warn!(tunnel = %inner.name, error = %err, "codec error, sending StopCCN");
                    let stopccn = message::stop_ccn(
                        &cfg,
                        inner.local_tid,
                        inner.peer_tid(),
                        StopCcnResult::GeneralError,
                        Some((ErrorCode::BadValue, err.to_string())),
                    );
                    send_async(inner.transport_sender.clone(), stopccn);
                    state = TunnelState::StopccnPending;
                    drain_deadline = Some(Instant::now() + cfg.stopccn_timeout);
                }
            }
            recv(control_rx) -> ctrl => {
                match ctrl {
                    Ok(Control::NewSession(session_cfg, reply)) => {
                        let _ = reply.send(link_session(&cfg, &inner, &dataplane, state, session_cfg));
                    }
                    Ok(Control::Close) | Err(_) => {
                        if state != TunnelState::StopccnPending && state != TunnelState::Dead {
                            let stopccn = message::stop_ccn(
                                &cfg,
                                inner.local_tid,
                                inner.peer_tid(),
                                StopCcnResult::ShuttingDown,
                                None,
                            );
                            send_async(inner.transport_sender.clone(), stopccn);
                            state = TunnelState::StopccnPending;
                            drain_deadline = Some(Instant::now() + cfg.stopccn_timeout);
                        }
                    }
                }
            }
            default(timeout) => {}
        }

        if let Some(deadline) = drain_deadline {
            if Instant::now() >= deadline {
                close_all(&inner, &mut dp_handle, &mut transport, None);
                return;
            }
        }
    }
}

fn link_session(
    cfg: &TunnelConfig,
    inner: &Arc<TunnelInner>,
    dataplane: &Arc<dyn Dataplane>,
    state: TunnelState,
    session_cfg: SessionConfig,
) -> Result<(), Error> {
    session_cfg.validate(cfg.version)?;
    let sid = SessionId(session_cfg.sid);
    let mut sessions = inner.sessions.lock();
    if sessions.contains_key(&session_cfg.name) {
        return Err(ConfigError::DuplicateSessionName(session_cfg.name).into());
    }
    if inner.session_by_sid.lock().contains_key(&sid) {
        return Err(ConfigError::DuplicateSessionId(sid.0).into());
    }
    let name = session_cfg.name.clone();
    let trait_handle: Arc<dyn TunnelHandleForSession> = Arc::clone(inner);
    let weak = Arc::downgrade(&trait_handle);
    let session = Session::spawn(session_cfg, inner.name.clone(), weak, Arc::clone(dataplane));
    if state == TunnelState::Established {
        session.notify_tunnel_open();
    }
    inner.session_by_sid.lock().insert(sid, name.clone());
    sessions.insert(name, session);
    Ok(())
}

fn close_all(
    inner: &Arc<TunnelInner>,
    dp_handle: &mut Option<Box<dyn DpTunnelHandle>>,
    transport: &mut Transport,
    reason: Option<String>,
) {
    // Drain into an owned `Vec` and release the lock *before* closing any
    // session: `Session::close` joins the session's task, whose close path
    // calls back into `TunnelInner::unlink_session`, which locks this same
    // mutex. Holding the guard across `close()` would deadlock.
    let drained: Vec<(String, Session)> = inner.sessions.lock().drain().collect();
    for (_, mut session) in drained {
        session.close();
    }
    inner.session_by_sid.lock().clear();
    if let Some(mut h) = dp_handle.take() {
        h.down();
    }
    transport.close();
    inner.dispatch(Event::TunnelDown {
        tunnel: inner.name.clone(),
        reason,
    });
    if let Some(c) = inner.context.upgrade() {
        c.unlink_tunnel(&inner.name);
    }
    info!(tunnel = %inner.name, "tunnel closed");
}
