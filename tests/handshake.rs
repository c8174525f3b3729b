//! End-to-end tunnel establishment and teardown over loopback UDP. The
//! peer side is a hand-scripted `UdpSocket`, not another instance of this
//! crate's own `Tunnel` — the FSM only models the client-initiates role,
//! so a passive responder has to be driven by hand.

use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use l2tp_rs::avp::{MessageTypeCode, StopCcnResult};
use l2tp_rs::config::{FramingCaps, TunnelConfig, TunnelMode};
use l2tp_rs::events::{Event, EventHandler};
use l2tp_rs::ids::{ControlConnId, EncapType, ProtocolVersion};
use l2tp_rs::message::{self, ControlMessage, V2Message};
use l2tp_rs::Context;

struct RecordingHandler(Mutex<Vec<Event>>);

impl EventHandler for RecordingHandler {
    fn handle(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

fn wait_for<F: Fn(&[Event]) -> bool>(handler: &RecordingHandler, pred: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pred(&handler.0.lock().unwrap()) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn peer_cfg(host_name: &str) -> TunnelConfig {
    TunnelConfig {
        name: "peer".into(),
        local: "127.0.0.1:0".parse().unwrap(),
        peer: None,
        encap: EncapType::Udp,
        version: ProtocolVersion::V2,
        mode: TunnelMode::Quiescent,
        tid: 0x11e7,
        ptid: None,
        window_size: 4,
        hello_timeout: Duration::from_secs(3600),
        retry_timeout: Duration::from_millis(200),
        max_retries: 5,
        ack_timeout: Duration::from_millis(50),
        host_name: host_name.into(),
        framing_caps: FramingCaps::BOTH,
        stopccn_timeout: Duration::from_millis(300),
    }
}

#[test]
fn three_way_handshake_then_peer_initiated_teardown() {
    let peer_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer_sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let peer_addr = peer_sock.local_addr().unwrap();

    let client_tid: u32 = 0x9999;
    let client_cfg = TunnelConfig {
        name: "client".into(),
        local: "127.0.0.1:0".parse().unwrap(),
        peer: Some(peer_addr),
        encap: EncapType::Udp,
        version: ProtocolVersion::V2,
        mode: TunnelMode::Dynamic,
        tid: client_tid,
        ptid: None,
        window_size: 4,
        hello_timeout: Duration::from_secs(3600),
        retry_timeout: Duration::from_millis(200),
        max_retries: 5,
        ack_timeout: Duration::from_millis(50),
        host_name: "client".into(),
        framing_caps: FramingCaps::BOTH,
        stopccn_timeout: Duration::from_millis(300),
    };

    let handler = Arc::new(RecordingHandler(Mutex::new(Vec::new())));
    let ctx = Context::new(handler.clone(), Arc::new(l2tp_rs::dataplane::NullDataplane));
    ctx.new_tunnel(client_cfg).expect("client tunnel creation");

    // Peer receives the initial SCCRQ and answers with SCCRP advertising
    // peer-tid=0x11e7, which should prompt the client to emit SCCCN.
    let mut buf = [0u8; 2048];
    let (n, client_addr) = peer_sock.recv_from(&mut buf).expect("SCCRQ never arrived");
    let sccrq = ControlMessage::parse_datagram(&buf[..n]).unwrap().remove(0);
    assert_eq!(sccrq.message_type(), MessageTypeCode::Sccrq);
    assert_eq!(sccrq.as_v2().unwrap().tunnel_id, client_tid as u16);

    let pcfg = peer_cfg("peer");
    let mut sccrp = message::sccrp(&pcfg, ControlConnId(0x11e7), ControlConnId(client_tid));
    sccrp.set_ns_nr(0, 1);
    peer_sock.send_to(&sccrp.encode(), client_addr).unwrap();

    // 2. Client replies with SCCCN once it's learned the peer's tunnel id.
    let (n, _) = peer_sock.recv_from(&mut buf).expect("SCCCN never arrived");
    let scccn = ControlMessage::parse_datagram(&buf[..n]).unwrap().remove(0);
    assert_eq!(scccn.message_type(), MessageTypeCode::Scccn);
    assert_eq!(scccn.ns(), 1);
    assert_eq!(scccn.as_v2().unwrap().tunnel_id, client_tid as u16);

    // Ack-only messages never occupy an Ns slot (RFC 2661 §5.8), so any Ns
    // value works here; only the Nr field (acking the client's Ns=1) matters.
    let ack = ControlMessage::V2(V2Message {
        tunnel_id: client_tid as u16,
        session_id: 0,
        ns: 0,
        nr: 2,
        avps: Vec::new(),
        message_type: MessageTypeCode::Ack,
    });
    peer_sock.send_to(&ack.encode(), client_addr).unwrap();

    // Client should now reach `established` and emit TunnelUp.
    assert!(
        wait_for(
            &handler,
            |events| events.iter().any(|e| matches!(e, Event::TunnelUp { .. })),
            Duration::from_secs(2),
        ),
        "TunnelUp was never dispatched"
    );
    {
        let events = handler.0.lock().unwrap();
        let up = events
            .iter()
            .find_map(|e| match e {
                Event::TunnelUp { tunnel, local_tid, peer_tid } => Some((tunnel.clone(), *local_tid, *peer_tid)),
                _ => None,
            })
            .unwrap();
        assert_eq!(up.0, "client");
        assert_eq!(up.1, ControlConnId(client_tid));
        assert_eq!(up.2, ControlConnId(0x11e7));
    }

    // Peer sends StopCCN; client must drain and then emit TunnelDown,
    // then close and unlink itself from the context.
    let mut stopccn = message::stop_ccn(
        &pcfg,
        ControlConnId(0x11e7),
        ControlConnId(client_tid),
        StopCcnResult::Clear,
        None,
    );
    stopccn.set_ns_nr(1, 2);
    peer_sock.send_to(&stopccn.encode(), client_addr).unwrap();

    assert!(
        wait_for(
            &handler,
            |events| events.iter().any(|e| matches!(e, Event::TunnelDown { .. })),
            Duration::from_secs(2),
        ),
        "TunnelDown was never dispatched after peer StopCCN"
    );
    assert_eq!(ctx.tunnel_count(), 0, "tunnel should have unlinked itself on close");
}
