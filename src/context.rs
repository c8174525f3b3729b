//! The registry of tunnels, ID allocation, and event dispatch.
//!
//! A [`Context`] exclusively owns its [`Tunnel`]s, keyed by name. Tunnels
//! reach back into it only through the [`ContextHandle`] trait object to
//! allocate call-serial numbers and deliver lifecycle events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

use crate::config::TunnelConfig;
use crate::dataplane::{Dataplane, NullDataplane};
use crate::error::{ConfigError, Error};
use crate::events::{Event, EventHandler, NullEventHandler};
use crate::ids::ProtocolVersion;
use crate::tunnel::Tunnel;

/// How many rejection-sampling attempts [`Context::alloc_tunnel_id`] and
/// [`Context::alloc_session_id`] try before giving up.
const ID_ALLOC_ATTEMPTS: u32 = 1000;

/// The interface [`Tunnel`] (and, through it, [`crate::session::Session`])
/// uses to reach its owning `Context` without holding a strong reference.
pub trait ContextHandle: Send + Sync {
    /// The next monotonically increasing 32-bit call-serial number,
    /// shared across every tunnel in the context.
    fn next_call_serial(&self) -> u32;
    /// Delivers a lifecycle event to the registered handler.
    fn dispatch(&self, event: Event);
    /// Removes a tunnel from the registry once its FSM has reached `dead`
    /// and it has fully closed.
    fn unlink_tunnel(&self, name: &str);
}

/// Owns every [`Tunnel`] created through it: one entry point holds
/// everything needed to make progress, and closing it tears down
/// everything beneath.
pub struct Context {
    tunnels: Mutex<HashMap<String, Tunnel>>,
    call_serial: AtomicU32,
    event_handler: Arc<dyn EventHandler>,
    dataplane: Arc<dyn Dataplane>,
}

impl Context {
    /// Builds a new, empty context. Returned as an `Arc` because every
    /// [`Tunnel`] it creates holds a [`Weak`] back-reference to it.
    pub fn new(event_handler: Arc<dyn EventHandler>, dataplane: Arc<dyn Dataplane>) -> Arc<Context> {
        Arc::new(Context {
            tunnels: Mutex::new(HashMap::new()),
            call_serial: AtomicU32::new(0),
            event_handler,
            dataplane,
        })
    }

    /// A context with no event handler and a no-op data plane, for tests
    /// and examples that only exercise the control-plane protocol.
    pub fn new_null() -> Arc<Context> {
        Context::new(Arc::new(NullEventHandler), Arc::new(NullDataplane))
    }

    /// Creates and opens a tunnel under this context. Rejects a duplicate
    /// name or local tunnel id before any state changes are made.
    pub fn new_tunnel(self: &Arc<Self>, cfg: TunnelConfig) -> Result<(), Error> {
        cfg.validate()?;
        {
            let tunnels = self.tunnels.lock();
            if tunnels.contains_key(&cfg.name) {
                return Err(ConfigError::DuplicateTunnelName(cfg.name.clone()).into());
            }
            if tunnels.values().any(|t| t.local_tid().0 == cfg.tid) {
                return Err(ConfigError::DuplicateTunnelId(cfg.tid).into());
            }
        }
        let name = cfg.name.clone();
        let weak: Weak<dyn ContextHandle> = Arc::downgrade(self);
        let tunnel = Tunnel::open(cfg, weak, Arc::clone(&self.dataplane))?;
        self.tunnels.lock().insert(name, tunnel);
        Ok(())
    }

    /// Links a new session under an existing tunnel.
    pub fn new_session(&self, tunnel_name: &str, cfg: crate::config::SessionConfig) -> Result<(), Error> {
        let tunnels = self.tunnels.lock();
        let tunnel = tunnels
            .get(tunnel_name)
            .ok_or_else(|| Error::Config(ConfigError::DuplicateTunnelName(tunnel_name.to_string())))?;
        tunnel.new_session(cfg)
    }

    /// Rejection-samples an unused local tunnel id: 16 bits
    /// for V2, 32 bits for V3. `0` is always excluded.
    pub fn alloc_tunnel_id(&self, version: ProtocolVersion) -> Result<u32, ConfigError> {
        let tunnels = self.tunnels.lock();
        let mut rng = rand::thread_rng();
        for _ in 0..ID_ALLOC_ATTEMPTS {
            let candidate = if version.is_v2() {
                rng.gen_range(1..=u16::MAX as u32)
            } else {
                rng.gen_range(1..=u32::MAX)
            };
            if !tunnels.values().any(|t| t.local_tid().0 == candidate) {
                return Ok(candidate);
            }
        }
        Err(ConfigError::IdAllocationExhausted("tunnel", ID_ALLOC_ATTEMPTS))
    }

    /// Number of tunnels currently registered.
    pub fn tunnel_count(&self) -> usize {
        self.tunnels.lock().len()
    }

    pub fn tunnel_names(&self) -> Vec<String> {
        self.tunnels.lock().keys().cloned().collect()
    }

    /// Closes and removes a single tunnel by name, blocking until it has
    /// quiesced.
    ///
    /// The tunnel is removed from the registry, and the lock released,
    /// *before* `close()` blocks: the tunnel's own actor thread calls back
    /// into [`ContextHandle::unlink_tunnel`] as it quiesces, which would
    /// deadlock against a lock held across the join.
    pub fn close_tunnel(&self, name: &str) {
        let removed = self.tunnels.lock().remove(name);
        if let Some(mut tunnel) = removed {
            tunnel.close();
        }
    }

    /// Closes every tunnel and blocks until all have quiesced. Each
    /// tunnel's own `close` already closes its sessions first.
    ///
    /// Drains the registry into a owned `Vec` and drops the lock before
    /// closing any tunnel, for the same reason as [`Context::close_tunnel`].
    pub fn close(&self) {
        let drained: Vec<(String, Tunnel)> = self.tunnels.lock().drain().collect();
        for (name, mut tunnel) in drained {
            info!(tunnel = %name, "closing tunnel as part of context shutdown");
            tunnel.close();
        }
    }
}

impl ContextHandle for Context {
    fn next_call_serial(&self) -> u32 {
        self.call_serial.fetch_add(1, Ordering::Relaxed)
    }

    fn dispatch(&self, event: Event) {
        self.event_handler.handle(event);
    }

    fn unlink_tunnel(&self, name: &str) {
        // The tunnel's own actor thread is already exiting by the time
        // this runs ; removing
        // it here just drops the `Tunnel` handle. If the user is
        // concurrently calling `close_tunnel`/`close` on the same name the
        // entry may already be gone, which is fine — both paths converge
        // on "not registered any more".
        if self.tunnels.lock().remove(name).is_none() {
            warn!(tunnel = name, "unlink_tunnel: already removed");
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_serials_increase_monotonically() {
        let ctx = Context::new_null();
        assert_eq!(ctx.next_call_serial(), 0);
        assert_eq!(ctx.next_call_serial(), 1);
        assert_eq!(ctx.next_call_serial(), 2);
    }

    #[test]
    fn tunnel_id_allocation_avoids_zero() {
        let ctx = Context::new_null();
        for _ in 0..50 {
            let id = ctx.alloc_tunnel_id(ProtocolVersion::V2).unwrap();
            assert_ne!(id, 0);
            assert!(id <= u16::MAX as u32);
        }
    }

    #[test]
    fn closing_empty_context_is_a_no_op() {
        let ctx = Context::new_null();
        ctx.close();
        assert_eq!(ctx.tunnel_count(), 0);
    }
}
