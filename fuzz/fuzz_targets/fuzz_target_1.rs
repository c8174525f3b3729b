#![no_main]
use l2tp_rs::message::ControlMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(msgs) = ControlMessage::parse_datagram(data) {
        for msg in &msgs {
            let _ = msg.encode();
        }
    }
});
