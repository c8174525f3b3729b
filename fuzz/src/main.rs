extern crate afl;
extern crate l2tp_rs;

use afl::fuzz;
use l2tp_rs::message::ControlMessage;

fn main() {
    fuzz!(|data: &[u8]| {
        if let Ok(msgs) = ControlMessage::parse_datagram(data) {
            for msg in &msgs {
                let _ = msg.encode();
            }
        }
    });
}
