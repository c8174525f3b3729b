//! Lifecycle events dispatched to a user-registered handler.

use crate::ids::{ControlConnId, SessionId};

#[derive(Clone, Debug)]
pub enum Event {
    TunnelUp {
        tunnel: String,
        local_tid: ControlConnId,
        peer_tid: ControlConnId,
    },
    TunnelDown {
        tunnel: String,
        reason: Option<String>,
    },
    SessionUp {
        tunnel: String,
        session: String,
        local_sid: SessionId,
        peer_sid: SessionId,
        interface_name: String,
    },
    SessionDown {
        tunnel: String,
        session: String,
        reason: Option<String>,
    },
}

/// Registered once on a [`crate::context::Context`] and invoked from
/// whichever tunnel or session task produced the event; implementations
/// must not block for long, since they run inline on that task.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Event);
}

impl<F> EventHandler for F
where
    F: Fn(Event) + Send + Sync,
{
    fn handle(&self, event: Event) {
        self(event)
    }
}

/// An event handler that discards every event, for tests and callers that
/// don't care about lifecycle notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventHandler;

impl EventHandler for NullEventHandler {
    fn handle(&self, _event: Event) {}
}
