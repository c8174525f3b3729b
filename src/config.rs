//! Tunnel and session configuration records.
//!
//! These are plain records, not a builder type: the TOML-loading layer
//! that turns a config file into one of these is an external collaborator
//! and isn't implemented here. `pppd_args` and the other
//! PPP-daemon-specific keys are carried through verbatim for that external
//! collaborator to interpret; the core never parses them.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::ids::{EncapType, ProtocolVersion};

/// How a tunnel is driven once created.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TunnelMode {
    /// No control activity; the dataplane row is installed immediately.
    Static,
    /// Socket and transport run (so control traffic is drained and acked)
    /// but the FSM takes no action.
    Quiescent,
    /// Full three-way handshake and session multiplexing.
    Dynamic,
}

/// Framing capabilities a tunnel advertises.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FramingCaps {
    pub sync: bool,
    pub asynch: bool,
}

impl FramingCaps {
    pub const SYNC_ONLY: FramingCaps = FramingCaps { sync: true, asynch: false };
    pub const ASYNC_ONLY: FramingCaps = FramingCaps { sync: false, asynch: true };
    pub const BOTH: FramingCaps = FramingCaps { sync: true, asynch: true };

    pub fn to_bits(self) -> u32 {
        (self.asynch as u32) | ((self.sync as u32) << 1)
    }

    pub fn from_bits(bits: u32) -> FramingCaps {
        FramingCaps {
            asynch: bits & 0x1 != 0,
            sync: bits & 0x2 != 0,
        }
    }
}

/// Tunnel-level configuration.
#[derive(Clone, Debug)]
pub struct TunnelConfig {
    pub name: String,
    pub local: SocketAddr,
    pub peer: Option<SocketAddr>,
    pub encap: EncapType,
    pub version: ProtocolVersion,
    pub mode: TunnelMode,
    pub tid: u32,
    pub ptid: Option<u32>,
    pub window_size: u16,
    pub hello_timeout: Duration,
    pub retry_timeout: Duration,
    pub max_retries: u32,
    pub ack_timeout: Duration,
    pub host_name: String,
    pub framing_caps: FramingCaps,
    /// How long the StopCCN-pending drain waits before closing.
    pub stopccn_timeout: Duration,
}

impl TunnelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_name.is_empty() {
            return Err(ConfigError::EmptyHostName);
        }
        if self.tid == 0 {
            return Err(ConfigError::ZeroId);
        }
        if self.version.is_v2() && self.tid > u16::MAX as u32 {
            return Err(ConfigError::TunnelIdOverflowsV2(self.tid));
        }
        if let Some(ptid) = self.ptid {
            if self.version.is_v2() && ptid > u16::MAX as u32 {
                return Err(ConfigError::TunnelIdOverflowsV2(ptid));
            }
        }
        if self.encap == EncapType::Ip && self.version.is_v2() {
            return Err(ConfigError::IpEncapRequiresV3);
        }
        if self.version == ProtocolVersion::V3 && self.mode == TunnelMode::Dynamic {
            // Dynamic L2TPv3 tunnels need an additional address-discovery
            // exchange this crate doesn't implement; use Static or Quiescent.
            return Err(ConfigError::V3DynamicUnsupported);
        }
        Ok(())
    }
}

/// Pseudowire type carried by a session.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PseudowireType {
    Ppp,
    Eth,
    /// PPP over an already-established access concentrator session
    /// (PPPoE-backed), as opposed to plain PPP dialed directly.
    PppAc,
}

impl PseudowireType {
    pub fn wire_code(self) -> u16 {
        match self {
            PseudowireType::Ppp => 7,
            PseudowireType::PppAc => 7,
            PseudowireType::Eth => 5,
        }
    }
}

/// How L2-specific sublayer data is carried.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum L2SpecType {
    #[default]
    None,
    Default,
}

/// Session-level configuration.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub name: String,
    pub pseudowire: Option<PseudowireType>,
    pub sid: u32,
    pub psid: Option<u32>,
    pub seqnum: bool,
    pub cookie: Option<Vec<u8>>,
    pub peer_cookie: Option<Vec<u8>>,
    pub interface_name: Option<String>,
    pub l2spec_type: L2SpecType,
    pub reorder_timeout: Option<std::time::Duration>,
    pub pppoe_session_id: Option<u16>,
    pub pppoe_peer_mac: Option<[u8; 6]>,
    pub pppd_args: Option<std::path::PathBuf>,
}

impl SessionConfig {
    pub fn validate(&self, tunnel_version: ProtocolVersion) -> Result<(), ConfigError> {
        if self.sid == 0 {
            return Err(ConfigError::ZeroId);
        }
        if tunnel_version.is_v2() && self.sid > u16::MAX as u32 {
            return Err(ConfigError::SessionIdOverflowsV2(self.sid));
        }
        if let Some(psid) = self.psid {
            if tunnel_version.is_v2() && psid > u16::MAX as u32 {
                return Err(ConfigError::SessionIdOverflowsV2(psid));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_caps_bits() {
        assert_eq!(FramingCaps::BOTH.to_bits(), 0b11);
        assert_eq!(FramingCaps::from_bits(0b11), FramingCaps::BOTH);
        assert_eq!(FramingCaps::ASYNC_ONLY.to_bits(), 0b01);
    }

    #[test]
    fn ip_encap_requires_v3() {
        let cfg = TunnelConfig {
            name: "t0".into(),
            local: "127.0.0.1:0".parse().unwrap(),
            peer: None,
            encap: EncapType::Ip,
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
        assert!(matches!(cfg.validate(), Err(ConfigError::IpEncapRequiresV3)));
    }
}
