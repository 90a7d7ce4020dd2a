//! Core types for desired tunnel state.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::util::ifname;

/// IP address family of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4.
    #[default]
    V4,
    /// IPv6.
    V6,
}

impl IpVersion {
    /// Parse the document's `ip_version` field (`"4"` or `"6"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "4" => Some(Self::V4),
            "6" => Some(Self::V6),
            _ => None,
        }
    }

    /// Family of an address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Check if this is IPv6.
    pub fn is_ipv6(self) -> bool {
        self == Self::V6
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// One entry of the desired-state document, as fetched.
///
/// Nothing here is trusted: every field is optional and empty strings
/// count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTunnel {
    pub tunnel_id: Option<String>,
    pub src_addr: Option<String>,
    pub dst_addr: Option<String>,
    pub dst_hostname: Option<String>,
    pub vlan_id: Option<String>,
    pub ip_version: Option<String>,
    pub description: Option<String>,
}

impl RawTunnel {
    /// Get a field with whitespace trimmed, treating empty as absent.
    pub(crate) fn field(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// A validated, fully resolved tunnel.
///
/// Every retained spec has concrete endpoints; `tunnel_id`, `dst` and
/// `vlan_id` are unique across one validation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub(crate) tunnel_id: u32,
    pub(crate) src: IpAddr,
    pub(crate) dst: IpAddr,
    pub(crate) vlan_id: u16,
    pub(crate) ip_version: IpVersion,
    pub(crate) description: String,
    pub(crate) dst_hostname: Option<String>,
}

impl TunnelSpec {
    /// Create a spec from concrete values.
    pub fn new(tunnel_id: u32, src: IpAddr, dst: IpAddr, vlan_id: u16) -> Self {
        Self {
            tunnel_id,
            src,
            dst,
            vlan_id,
            ip_version: IpVersion::of(&src),
            description: String::new(),
            dst_hostname: None,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Get the tunnel id.
    pub fn tunnel_id(&self) -> u32 {
        self.tunnel_id
    }

    /// Get the outer source address.
    pub fn src(&self) -> IpAddr {
        self.src
    }

    /// Get the outer destination address.
    pub fn dst(&self) -> IpAddr {
        self.dst
    }

    /// Get the VLAN tag.
    pub fn vlan_id(&self) -> u16 {
        self.vlan_id
    }

    /// Get the address family the spec was resolved for.
    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    /// Get the description (may be empty).
    pub fn description_text(&self) -> &str {
        &self.description
    }

    /// Get the hostname the destination was resolved from, if any.
    pub fn dst_hostname(&self) -> Option<&str> {
        self.dst_hostname.as_deref()
    }

    /// Whether the tunnel runs over IPv6 (either endpoint is IPv6).
    pub fn is_ipv6(&self) -> bool {
        self.src.is_ipv6() || self.dst.is_ipv6()
    }

    /// Tunnel interface name.
    pub fn gif(&self) -> String {
        ifname::gif(self.tunnel_id)
    }

    /// Bridge interface name.
    pub fn bridge(&self) -> String {
        ifname::bridge(self.tunnel_id)
    }

    /// VLAN interface name under `physical`.
    pub fn vlan(&self, physical: &str) -> String {
        ifname::vlan(physical, self.vlan_id)
    }
}

impl fmt::Display for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tunnel_id=`{}`, src_addr=`{}`, dst_addr=`{}`, vlan_id=`{}`, description=`{}`",
            self.tunnel_id, self.src, self.dst, self.vlan_id, self.description
        )
    }
}
