//! Reliable-transport timing and ack-sweep behavior over loopback UDP,
//! driving `Transport` directly rather than through a `Tunnel` so the
//! peer side can be a hand-scripted socket with full control over what
//! it acks and when.

use std::net::UdpSocket;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use l2tp_rs::avp::MessageTypeCode;
use l2tp_rs::config::{FramingCaps, TunnelConfig, TunnelMode};
use l2tp_rs::error::TransportError;
use l2tp_rs::ids::{ControlConnId, EncapType, ProtocolVersion};
use l2tp_rs::message::{self, ControlMessage, V2Message};
use l2tp_rs::socket::ControlSocket;
use l2tp_rs::transport::{Transport, TransportConfig};

fn hello_cfg() -> TunnelConfig {
    TunnelConfig {
        name: "t0".into(),
        local: "127.0.0.1:0".parse().unwrap(),
        peer: None,
        encap: EncapType::Udp,
        version: ProtocolVersion::V2,
        mode: TunnelMode::Dynamic,
        tid: 1,
        ptid: None,
        window_size: 8,
        hello_timeout: Duration::from_secs(3600),
        retry_timeout: Duration::from_millis(100),
        max_retries: 3,
        ack_timeout: Duration::from_millis(50),
        host_name: "h".into(),
        framing_caps: FramingCaps::BOTH,
        stopccn_timeout: Duration::from_secs(5),
    }
}

/// With `retry_timeout=100ms, max_retries=3` and no ack ever
/// arriving, the transport retransmits with exponential backoff and then
/// fails with `TransportError::RetriesExhausted` within roughly a second.
#[test]
fn retransmit_exhausts_and_fails_within_expected_window() {
    let black_hole = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let socket = std::sync::Arc::new(ControlSocket::bind("127.0.0.1:0".parse().unwrap(), EncapType::Udp).unwrap());
    let transport = Transport::spawn(
        socket,
        black_hole.local_addr().unwrap(),
        ProtocolVersion::V2,
        TransportConfig {
            hello_timeout: Duration::from_secs(3600),
            tx_window_size: 4,
            max_retries: 3,
            retry_timeout: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(50),
        },
    );

    let cfg = hello_cfg();
    let start = Instant::now();
    let result = transport.send(message::hello(&cfg, ControlConnId(1)));
    let elapsed = start.elapsed();

    assert!(
        matches!(result, Err(TransportError::RetriesExhausted { retries: 3, .. })),
        "expected retries-exhausted, got {result:?}"
    );
    assert!(elapsed >= Duration::from_millis(300), "failed too fast: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(3000), "failed too slow: {elapsed:?}");
}

/// Once messages up through Ns=2 have already been acked
/// (Nr=3), a second, stale reception of Nr=3 must not disturb the still
/// in-flight sends — they only complete once a fresh ack actually covers
/// them.
#[test]
fn stale_ack_leaves_later_sends_pending() {
    let peer_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer_sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let peer_addr = peer_sock.local_addr().unwrap();

    let socket = std::sync::Arc::new(ControlSocket::bind("127.0.0.1:0".parse().unwrap(), EncapType::Udp).unwrap());
    let transport = Transport::spawn(
        socket,
        peer_addr,
        ProtocolVersion::V2,
        TransportConfig {
            hello_timeout: Duration::from_secs(3600),
            tx_window_size: 8,
            max_retries: 10,
            retry_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_millis(50),
        },
    );

    let cfg = hello_cfg();
    let sender = transport.sender();
    let (done_tx, done_rx) = mpsc::channel();
    for _ in 0..5 {
        let sender = sender.clone();
        let done_tx = done_tx.clone();
        let msg = message::hello(&cfg, ControlConnId(1));
        std::thread::spawn(move || {
            let _ = done_tx.send(sender.send(msg));
        });
    }

    // Drain the 5 Hello datagrams off the wire (Ns 0..=4).
    let mut buf = [0u8; 2048];
    let mut client_addr = peer_addr;
    for _ in 0..5 {
        let (n, from) = peer_sock.recv_from(&mut buf).expect("hello never arrived");
        client_addr = from;
        let msg = ControlMessage::parse_datagram(&buf[..n]).unwrap().remove(0);
        assert_eq!(msg.message_type(), MessageTypeCode::Hello);
    }

    let send_ack = |nr: u16| {
        let ack = ControlMessage::V2(V2Message {
            tunnel_id: 1,
            session_id: 0,
            ns: 0,
            nr,
            avps: Vec::new(),
            message_type: MessageTypeCode::Ack,
        });
        peer_sock.send_to(&ack.encode(), client_addr).unwrap();
    };

    // Ack the first 3 (Ns 0..=2).
    send_ack(3);
    std::thread::sleep(Duration::from_millis(150));
    let completed_after_first_ack = done_rx.try_iter().count();
    assert_eq!(completed_after_first_ack, 3);

    // Stale repeat of the same ack must not complete anything further.
    send_ack(3);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(done_rx.try_iter().count(), 0, "stale ack completed a send");

    // A real ack covering the rest releases the remaining two sends.
    send_ack(5);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(done_rx.try_iter().count(), 2);
}
