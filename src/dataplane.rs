//! The data-plane collaborator: the core consumes this
//! trait but does not implement it. A real implementation installs rules
//! into the kernel's L2TP netlink subsystem; tests and `Static`/`Quiescent`
//! tunnels in this crate use [`NullDataplane`].
//!
//! Exposed as `dyn Dataplane` rather than an associated-type trait so
//! [`crate::context::Context`] can hold a single `Arc<dyn Dataplane>`
//! regardless of which back-end is plugged in.

use std::net::SocketAddr;

use crate::config::{SessionConfig, TunnelConfig};
use crate::ids::{ControlConnId, SessionId};

/// Per-session traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    pub tx_pkts: u64,
    pub tx_bytes: u64,
    pub tx_errs: u64,
    pub rx_pkts: u64,
    pub rx_bytes: u64,
    pub rx_errs: u64,
}

/// A handle to an installed tunnel row in the data plane.
pub trait TunnelHandle: Send {
    /// Removes the tunnel's data-plane state. Must be safe to call more
    /// than once.
    fn down(&mut self);
}

/// A handle to an installed session (pseudowire) row in the data plane.
pub trait SessionHandle: Send {
    fn interface_name(&self) -> String;
    fn statistics(&self) -> SessionStatistics;
    /// Must be safe to call more than once.
    fn down(&mut self);
}

/// Installs and removes the kernel (or other back-end) state backing
/// tunnels and sessions.
pub trait Dataplane: Send + Sync {
    fn new_tunnel(
        &self,
        cfg: &TunnelConfig,
        local: SocketAddr,
        peer: SocketAddr,
        socket_fd: Option<i32>,
    ) -> std::io::Result<Box<dyn TunnelHandle>>;

    fn new_session(
        &self,
        local_tid: ControlConnId,
        peer_tid: ControlConnId,
        local_sid: SessionId,
        cfg: &SessionConfig,
    ) -> std::io::Result<Box<dyn SessionHandle>>;
}

/// A data plane that installs nothing, for `Quiescent`/`Static` tunnels and
/// tests that don't exercise kernel installation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDataplane;

struct NullTunnelHandle;

impl TunnelHandle for NullTunnelHandle {
    fn down(&mut self) {}
}

struct NullSessionHandle {
    interface_name: String,
}

impl SessionHandle for NullSessionHandle {
    fn interface_name(&self) -> String {
        self.interface_name.clone()
    }

    fn statistics(&self) -> SessionStatistics {
        SessionStatistics::default()
    }

    fn down(&mut self) {}
}

impl Dataplane for NullDataplane {
    fn new_tunnel(
        &self,
        _cfg: &TunnelConfig,
        _local: SocketAddr,
        _peer: SocketAddr,
        _socket_fd: Option<i32>,
    ) -> std::io::Result<Box<dyn TunnelHandle>> {
        Ok(Box::new(NullTunnelHandle))
    }

    fn new_session(
        &self,
        local_tid: ControlConnId,
        _peer_tid: ControlConnId,
        local_sid: SessionId,
        cfg: &SessionConfig,
    ) -> std::io::Result<Box<dyn SessionHandle>> {
        let interface_name = cfg
            .interface_name
            .clone()
            .unwrap_or_else(|| format!("l2tp{}s{}", local_tid.0, local_sid.0));
        Ok(Box::new(NullSessionHandle { interface_name }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_dataplane_derives_an_interface_name() {
        let dp = NullDataplane;
        let cfg = SessionConfig {
            name: "s0".into(),
            sid: 7,
            ..Default::default()
        };
        let session = dp
            .new_session(ControlConnId(1), ControlConnId(2), SessionId(7), &cfg)
            .unwrap();
        assert_eq!(session.interface_name(), "l2tp1s7");
    }
}
