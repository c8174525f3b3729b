/*!

A userspace control-plane implementation of the Layer-2 Tunneling Protocol:
L2TPv2 ([RFC 2661]) and L2TPv3 ([RFC 3931]).

This crate negotiates *tunnels* (control connections) and *sessions*
(pseudowires) with a peer over an unreliable datagram socket. It covers:

* the AVP and control-message wire codec ([`avp`], [`message`]),
* the sliding-window, cumulative-ack reliable transport that RFC 2661 §5.8
  and RFC 3931 §4.2 mandate on top of that unreliable socket ([`transport`]),
* the tunnel and session finite state machines that drive the three-way
  handshakes, teardown, and error propagation ([`tunnel`], [`session`]),
* a [`Context`] that owns a registry of tunnels and dispatches lifecycle
  events to user code.

Installing frames into an actual kernel data plane is out of scope: the
crate consumes the [`dataplane::Dataplane`] trait but does not implement
it, so callers supply their own backend (or use [`dataplane::NullDataplane`]
for control-plane-only testing). Likewise, loading configuration from a
file, CLI argument parsing, and signal handling belong to a binary built on
top of this crate, not to the crate itself.

[RFC 2661]: https://www.rfc-editor.org/rfc/rfc2661
[RFC 3931]: https://www.rfc-editor.org/rfc/rfc3931
*/

pub mod avp;
pub mod config;
pub mod context;
pub mod dataplane;
pub mod error;
pub mod events;
pub mod ids;
pub mod message;
pub mod session;
pub mod socket;
pub mod tunnel;
pub mod transport;

pub use context::{Context, ContextHandle};
pub use error::{CodecError, ConfigError, Error, FsmError, Result, TransportError, ValidationError};
pub use events::{Event, EventHandler};
pub use ids::{ControlConnId, EncapType, ProtocolVersion, SessionId};
