//! Reliable control-message transport: Ns/Nr sequencing, the
//! tx/ack/rx queues, exponential-backoff retransmission, slow-start
//! congestion control, and the Hello/Ack timers, running over the
//! unreliable [`crate::socket::ControlSocket`].
//!
//! Structured as two threads: a *receiver* thread that owns the rx queue
//! and does early sequence validity checks, and a *sender* thread that
//! owns the tx/ack queues and every timer. The two communicate only by
//! channel; the one piece of state genuinely shared between them — the
//! (Ns, Nr) pair — is protected by a short `parking_lot::Mutex` critical
//! section.

mod congestion;
mod timer;

pub use congestion::Congestion;
pub use timer::Timer;

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::TunnelConfig;
use crate::error::{CodecError, TransportError};
use crate::ids::ProtocolVersion;
use crate::message::ControlMessage;
use crate::socket::ControlSocket;

/// Modular comparison of 16-bit sequence numbers: `a` is "greater" than `b` iff
/// `(a - b) mod 2^16` falls in the open lower half of the space.
pub fn seq_cmp(a: u16, b: u16) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let diff = a.wrapping_sub(b);
    if diff < 0x8000 {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

fn seq_gt(a: u16, b: u16) -> bool {
    seq_cmp(a, b) == Ordering::Greater
}

fn seq_lt(a: u16, b: u16) -> bool {
    seq_cmp(a, b) == Ordering::Less
}

/// The (Ns, Nr) pair shared between the receiver and sender threads.
/// `next_ns` is the sequence number the *next* outgoing message will be
/// stamped with; `local_nr` is the sequence number the transport next
/// expects to deliver (i.e. what we advertise as our own Nr).
#[derive(Clone, Copy, Debug)]
struct SeqState {
    next_ns: u16,
    local_nr: u16,
}

/// Configuration the reliable transport needs, lifted out of
/// [`TunnelConfig`] so the transport doesn't depend on the rest of a
/// tunnel's configuration surface.
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    pub hello_timeout: Duration,
    pub tx_window_size: u32,
    pub max_retries: u32,
    pub retry_timeout: Duration,
    pub ack_timeout: Duration,
}

impl From<&TunnelConfig> for TransportConfig {
    fn from(cfg: &TunnelConfig) -> TransportConfig {
        TransportConfig {
            hello_timeout: cfg.hello_timeout,
            tx_window_size: cfg.window_size as u32,
            max_retries: cfg.max_retries,
            retry_timeout: cfg.retry_timeout,
            ack_timeout: cfg.ack_timeout,
        }
    }
}

struct SendRequest {
    msg: ControlMessage,
    done: Sender<Result<(), TransportError>>,
}

fn send_via(
    send_tx: &Sender<SendRequest>,
    closed: &AtomicBool,
    msg: ControlMessage,
) -> Result<(), TransportError> {
    if closed.load(AtomicOrdering::Acquire) {
        return Err(TransportError::Closed);
    }
    let (done_tx, done_rx) = bounded(1);
    send_tx
        .send(SendRequest { msg, done: done_tx })
        .map_err(|_| TransportError::Closed)?;
    done_rx.recv().unwrap_or(Err(TransportError::Closed))
}

/// A cloneable, non-owning handle to a running [`Transport`]'s send path.
#[derive(Clone)]
pub struct TransportSender {
    send_tx: Sender<SendRequest>,
    closed: Arc<AtomicBool>,
}

impl TransportSender {
    pub fn send(&self, msg: ControlMessage) -> Result<(), TransportError> {
        send_via(&self.send_tx, &self.closed, msg)
    }
}

/// An in-flight message awaiting acknowledgement.
struct AckEntry {
    ns: u16,
    msg: ControlMessage,
    is_hello: bool,
    retries: u32,
    /// When this message was first handed to the socket. Retransmit
    /// deadlines are computed as `sent_at + retry_timeout * 2^retries`, so
    /// the backoff schedule is relative to the original send, not to the
    /// most recent retransmit.
    sent_at: std::time::Instant,
    deadline: std::time::Instant,
    done: Sender<Result<(), TransportError>>,
}

/// Handle to a running reliable transport. Dropping it does not stop the
/// background threads; call [`Transport::close`] explicitly (the owning
/// tunnel does this as part of its own teardown).
pub struct Transport {
    send_tx: Sender<SendRequest>,
    close_tx: Sender<()>,
    deliver_rx: Receiver<ControlMessage>,
    codec_err_rx: Receiver<CodecError>,
    sender_thread: Option<JoinHandle<()>>,
    receiver_thread: Option<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
    peer_tid: Arc<AtomicU32>,
}

impl Transport {
    /// Spawns the receiver and sender threads for a tunnel's control
    /// traffic.
    pub fn spawn(
        socket: Arc<ControlSocket>,
        peer: std::net::SocketAddr,
        version: ProtocolVersion,
        cfg: TransportConfig,
    ) -> Transport {
        let seq = Arc::new(Mutex::new(SeqState {
            next_ns: 0,
            local_nr: 0,
        }));
        let closed = Arc::new(AtomicBool::new(false));
        let peer_tid = Arc::new(AtomicU32::new(0));

        let (send_tx, send_rx) = unbounded::<SendRequest>();
        let (close_tx, close_rx) = bounded::<()>(1);
        let (deliver_tx, deliver_rx) = unbounded::<ControlMessage>();
        let (codec_err_tx, codec_err_rx) = unbounded::<CodecError>();
        let (nr_update_tx, nr_update_rx) = unbounded::<u16>();
        let (ack_now_tx, ack_now_rx) = unbounded::<()>();
        let (arm_ack_tx, arm_ack_rx) = unbounded::<()>();
        let (recv_close_tx, recv_close_rx) = bounded::<()>(1);

        let receiver_thread = {
            let socket = Arc::clone(&socket);
            let seq = Arc::clone(&seq);
            std::thread::spawn(move || {
                receiver_loop(
                    socket,
                    seq,
                    version,
                    deliver_tx,
                    codec_err_tx,
                    nr_update_tx,
                    ack_now_tx,
                    arm_ack_tx,
                    recv_close_rx,
                )
            })
        };

        let sender_thread = {
            let socket = Arc::clone(&socket);
            let seq = Arc::clone(&seq);
            let closed = Arc::clone(&closed);
            let peer_tid = Arc::clone(&peer_tid);
            std::thread::spawn(move || {
                sender_loop(
                    socket,
                    peer,
                    version,
                    seq,
                    cfg,
                    send_rx,
                    nr_update_rx,
                    ack_now_rx,
                    arm_ack_rx,
                    close_rx,
                    recv_close_tx,
                    closed,
                    peer_tid,
                )
            })
        };

        Transport {
            send_tx,
            close_tx,
            deliver_rx,
            codec_err_rx,
            sender_thread: Some(sender_thread),
            receiver_thread: Some(receiver_thread),
            closed,
            peer_tid,
        }
    }

    /// Tells the transport the tunnel id to stamp on internally generated
    /// Hello and explicit-Ack messages, once it's been learned from the
    /// peer's SCCRQ/SCCRP.
    /// Every other outgoing message is built by the caller and already
    /// carries the right id.
    pub fn set_peer_tunnel_id(&self, id: crate::ids::ControlConnId) {
        self.peer_tid.store(id.0, AtomicOrdering::Release);
    }

    /// Enqueues `msg` and blocks until it is acknowledged by the peer or
    /// the transport fails.
    pub fn send(&self, msg: ControlMessage) -> Result<(), TransportError> {
        send_via(&self.send_tx, &self.closed, msg)
    }

    /// A cheaply cloneable handle for sending through this transport from
    /// another task without sharing ownership of its threads.
    pub fn sender(&self) -> TransportSender {
        TransportSender {
            send_tx: self.send_tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }

    /// The peer tunnel ID this transport currently stamps on
    /// internally-generated messages, once learned.
    pub fn peer_tunnel_id(&self) -> crate::ids::ControlConnId {
        crate::ids::ControlConnId(self.peer_tid.load(AtomicOrdering::Acquire))
    }

    /// Shares the atomic backing [`Transport::peer_tunnel_id`] and
    /// [`Transport::set_peer_tunnel_id`] so a non-owning handle can observe
    /// the same value without going through the transport itself.
    pub(crate) fn peer_tid_arc(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.peer_tid)
    }

    /// The channel of in-sequence, non-Ack messages delivered upward.
    pub fn deliveries(&self) -> &Receiver<ControlMessage> {
        &self.deliver_rx
    }

    /// Parse failures surfaced from the receive path: the owning tunnel
    /// FSM reacts to these by sending StopCCN rather than silently
    /// dropping the datagram.
    pub fn codec_errors(&self) -> &Receiver<CodecError> {
        &self.codec_err_rx
    }

    /// Flushes tx/ack queues (failing each pending send), stops both
    /// threads, and closes the underlying socket.
    pub fn close(&mut self) {
        if self.closed.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        let _ = self.close_tx.send(());
        if let Some(h) = self.sender_thread.take() {
            let _ = h.join();
        }
        if let Some(h) = self.receiver_thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

#[allow(clippy::too_many_arguments)]
fn receiver_loop(
    socket: Arc<ControlSocket>,
    seq: Arc<Mutex<SeqState>>,
    version: ProtocolVersion,
    deliver_tx: Sender<ControlMessage>,
    codec_err_tx: Sender<CodecError>,
    nr_update_tx: Sender<u16>,
    ack_now_tx: Sender<()>,
    arm_ack_tx: Sender<()>,
    close_rx: Receiver<()>,
) {
    let mut rx_queue: VecDeque<ControlMessage> = VecDeque::new();
    let mut buf = [0u8; 4096];
    loop {
        if close_rx.try_recv().is_ok() {
            return;
        }
        let datagram = match socket.recv_from(&mut buf) {
            Ok(Some((n, _from))) => &buf[..n],
            Ok(None) => {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(e) => {
                warn!(error = %e, "control socket recv failed");
                return;
            }
        };
        let msgs = match ControlMessage::parse_datagram(datagram) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "dropping unparseable datagram");
                let _ = codec_err_tx.send(e);
                continue;
            }
        };
        let mut saw_non_ack = false;
        for msg in msgs {
            if msg.version() != version {
                debug!(?version, got = ?msg.version(), "dropping message with mismatched protocol version");
                continue;
            }
            let next_ns = seq.lock().next_ns;
            if seq_gt(msg.nr(), next_ns.wrapping_add(1)) {
                warn!(nr = msg.nr(), next_ns, "dropping malformed Nr");
                continue;
            }
            let _ = nr_update_tx.send(msg.nr());
            // Ack-only messages don't occupy a slot in the sequence space
            // (their Ns is the sender's current, not-yet-used next_ns) so
            // they never enter the ordering queue, only the ack sweep above.
            if !msg.is_ack_only() {
                saw_non_ack = true;
                rx_queue.push_back(msg);
            }
        }
        // Drain the rx queue in order.
        while let Some(front) = rx_queue.front() {
            let local_nr = seq.lock().local_nr;
            match seq_cmp(front.ns(), local_nr) {
                Ordering::Equal => {
                    let msg = rx_queue.pop_front().unwrap();
                    seq.lock().local_nr = local_nr.wrapping_add(1);
                    if deliver_tx.send(msg).is_err() {
                        return;
                    }
                }
                Ordering::Less => {
                    trace!(ns = front.ns(), local_nr, "dropping duplicate message");
                    rx_queue.pop_front();
                    let _ = ack_now_tx.send(());
                }
                Ordering::Greater => break,
            }
        }
        if saw_non_ack {
            let _ = arm_ack_tx.send(());
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn sender_loop(
    socket: Arc<ControlSocket>,
    peer: std::net::SocketAddr,
    version: ProtocolVersion,
    seq: Arc<Mutex<SeqState>>,
    cfg: TransportConfig,
    send_rx: Receiver<SendRequest>,
    nr_update_rx: Receiver<u16>,
    ack_now_rx: Receiver<()>,
    arm_ack_rx: Receiver<()>,
    close_rx: Receiver<()>,
    recv_close_tx: Sender<()>,
    closed: Arc<AtomicBool>,
    peer_tid: Arc<AtomicU32>,
) {
    let mut tx_queue: VecDeque<SendRequest> = VecDeque::new();
    let mut ack_queue: VecDeque<AckEntry> = VecDeque::new();
    let mut congestion = Congestion::new(cfg.tx_window_size);
    let mut hello_timer = Timer::idle();
    let mut ack_timer = Timer::idle();
    let mut hello_in_flight = false;
    if !cfg.hello_timeout.is_zero() {
        hello_timer.arm(cfg.hello_timeout);
    }

    let fail_all = |tx_queue: &mut VecDeque<SendRequest>,
                    ack_queue: &mut VecDeque<AckEntry>,
                    err: TransportError| {
        while let Some(req) = tx_queue.pop_front() {
            let _ = req.done.send(Err(clone_transport_error(&err)));
        }
        while let Some(entry) = ack_queue.pop_front() {
            let _ = entry.done.send(Err(clone_transport_error(&err)));
        }
    };

    loop {
        let poll_interval = [
            hello_timer.remaining(),
            ack_timer.remaining(),
            ack_queue.front().map(|e| e.deadline.saturating_duration_since(std::time::Instant::now())),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(Duration::from_millis(50))
        .max(Duration::from_millis(1));

        select! {
            recv(send_rx) -> req => {
                if let Ok(req) = req {
                    tx_queue.push_back(req);
                }
            }
            recv(nr_update_rx) -> nr => {
                // Any queued message whose Ns < received Nr is acked.
                if let Ok(nr) = nr {
                    while let Some(front) = ack_queue.front() {
                        if seq_lt(front.ns, nr) {
                            let entry = ack_queue.pop_front().unwrap();
                            congestion.on_ack();
                            if entry.is_hello {
                                hello_in_flight = false;
                            }
                            let _ = entry.done.send(Ok(()));
                        } else {
                            break;
                        }
                    }
                }
            }
            recv(ack_now_rx) -> _ => {
                let tid = crate::ids::ControlConnId(peer_tid.load(AtomicOrdering::Acquire));
                send_explicit_ack(&socket, peer, &seq, version, tid);
            }
            recv(arm_ack_rx) -> _ => {
                ack_timer.arm(cfg.ack_timeout);
            }
            recv(close_rx) -> _ => {
                let _ = recv_close_tx.send(());
                fail_all(&mut tx_queue, &mut ack_queue, TransportError::Closed);
                return;
            }
            default(poll_interval) => {}
        }

        // Retransmission. `max_retries` retransmits are allowed (the
        // original send plus `max_retries` resends); deadlines are measured
        // from each entry's original `sent_at`, not from the previous
        // retransmit, so the schedule is 100/200/400ms absolute (not
        // 100/300/700ms) for `retry_timeout=100ms`.
        let now = std::time::Instant::now();
        if let Some(idx) = ack_queue.iter().position(|e| e.deadline <= now) {
            let exhausted = ack_queue[idx].retries >= cfg.max_retries;
            if exhausted {
                let failed = ack_queue.remove(idx).unwrap();
                let retries = failed.retries;
                let _ = failed.done.send(Err(TransportError::RetriesExhausted {
                    ns: failed.ns,
                    retries,
                }));
                closed.store(true, AtomicOrdering::Release);
                let _ = recv_close_tx.send(());
                fail_all(
                    &mut tx_queue,
                    &mut ack_queue,
                    TransportError::RetriesExhausted { ns: failed.ns, retries },
                );
                return;
            }
            congestion.on_retransmit();
            let local_nr = seq.lock().local_nr;
            let (resend_bytes, new_deadline) = {
                let entry = &mut ack_queue[idx];
                entry.retries += 1;
                let mut resend = entry.msg.clone();
                resend.set_ns_nr(entry.ns, local_nr);
                let deadline = entry.sent_at + cfg.retry_timeout * 2u32.pow(entry.retries);
                (resend.encode(), deadline)
            };
            let _ = socket.send_to(&resend_bytes, peer);
            ack_queue[idx].deadline = new_deadline;
        }

        // Keepalive.
        if hello_timer.fired() && !hello_in_flight {
            hello_in_flight = true;
            let (done_tx, _done_rx) = bounded(1);
            let tid = crate::ids::ControlConnId(peer_tid.load(AtomicOrdering::Acquire));
            tx_queue.push_back(SendRequest {
                msg: hello_message(version, tid),
                done: done_tx,
            });
            hello_timer.arm(cfg.hello_timeout);
        }

        // Explicit ack.
        if ack_timer.fired() {
            ack_timer.cancel();
            let tid = crate::ids::ControlConnId(peer_tid.load(AtomicOrdering::Acquire));
            send_explicit_ack(&socket, peer, &seq, version, tid);
        }

        // Drain the tx queue while the congestion window permits.
        while congestion.can_send() {
            let Some(req) = tx_queue.pop_front() else { break };
            let mut msg = req.msg;
            let is_hello = msg.message_type() == crate::avp::MessageTypeCode::Hello;
            let (ns, nr) = {
                let mut s = seq.lock();
                let ns = s.next_ns;
                let nr = s.local_nr;
                if !msg.is_ack_only() {
                    s.next_ns = s.next_ns.wrapping_add(1);
                }
                (ns, nr)
            };
            msg.set_ns_nr(ns, nr);
            let bytes = msg.encode();
            if let Err(e) = socket.send_to(&bytes, peer) {
                let _ = req.done.send(Err(TransportError::Io(e)));
                continue;
            }
            congestion.on_send();
            ack_timer.cancel();
            hello_timer.arm(cfg.hello_timeout);
            let sent_at = std::time::Instant::now();
            ack_queue.push_back(AckEntry {
                ns,
                msg,
                is_hello,
                retries: 0,
                sent_at,
                deadline: sent_at + cfg.retry_timeout,
                done: req.done,
            });
        }
    }
}

fn send_explicit_ack(
    socket: &ControlSocket,
    peer: std::net::SocketAddr,
    seq: &Mutex<SeqState>,
    version: ProtocolVersion,
    peer_tid: crate::ids::ControlConnId,
) {
    let (ns, nr) = {
        let s = seq.lock();
        (s.next_ns, s.local_nr)
    };
    let ack = if version.is_v2() {
        ControlMessage::V2(crate::message::V2Message {
            tunnel_id: peer_tid.as_v2_u16(),
            session_id: 0,
            ns,
            nr,
            avps: Vec::new(),
            message_type: crate::avp::MessageTypeCode::Ack,
        })
    } else {
        ControlMessage::V3(crate::message::V3Message {
            control_conn_id: peer_tid,
            ns,
            nr,
            avps: vec![crate::avp::Avp::message_type(crate::avp::MessageTypeCode::Ack)],
            message_type: crate::avp::MessageTypeCode::Ack,
        })
    };
    let _ = socket.send_to(&ack.encode(), peer);
}

fn hello_message(version: ProtocolVersion, peer_tid: crate::ids::ControlConnId) -> ControlMessage {
    let avps = vec![crate::avp::Avp::message_type(crate::avp::MessageTypeCode::Hello)];
    if version.is_v2() {
        ControlMessage::V2(crate::message::V2Message {
            tunnel_id: peer_tid.as_v2_u16(),
            session_id: 0,
            ns: 0,
            nr: 0,
            avps,
            message_type: crate::avp::MessageTypeCode::Hello,
        })
    } else {
        ControlMessage::V3(crate::message::V3Message {
            control_conn_id: peer_tid,
            ns: 0,
            nr: 0,
            avps,
            message_type: crate::avp::MessageTypeCode::Hello,
        })
    }
}

fn clone_transport_error(e: &TransportError) -> TransportError {
    match e {
        TransportError::RetriesExhausted { ns, retries } => TransportError::RetriesExhausted {
            ns: *ns,
            retries: *retries,
        },
        TransportError::Closed => TransportError::Closed,
        TransportError::MalformedSequence(addr) => TransportError::MalformedSequence(*addr),
        TransportError::Io(e) => TransportError::Io(std::io::Error::new(e.kind(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_cmp_handles_wraparound() {
        assert_eq!(seq_cmp(1, 0), Ordering::Greater);
        assert_eq!(seq_cmp(0, 1), Ordering::Less);
        assert_eq!(seq_cmp(0, 0xFFFF), Ordering::Greater);
        assert_eq!(seq_cmp(0xFFFF, 0), Ordering::Less);
        assert_eq!(seq_cmp(5, 5), Ordering::Equal);
    }

    #[test]
    fn transport_config_from_tunnel_config() {
        use crate::config::{FramingCaps, TunnelMode};
        use crate::ids::EncapType;
        let tcfg = TunnelConfig {
            name: "t0".into(),
            local: "127.0.0.1:0".parse().unwrap(),
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
            host_name: "h".into(),
            framing_caps: FramingCaps::BOTH,
            stopccn_timeout: Duration::from_secs(5),
        };
        let cfg: TransportConfig = (&tcfg).into();
        assert_eq!(cfg.tx_window_size, 4);
        assert_eq!(cfg.max_retries, 3);
    }
}
