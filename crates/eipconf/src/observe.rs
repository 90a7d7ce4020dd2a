//! Observed interface state.
//!
//! An [`ObservedState`] is a snapshot of the managed interfaces that exist
//! right now. It is taken fresh at the start of every pass and never reused
//! across passes.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::ifconfig::{Ifconfig, parse};
use crate::reconcile::IpVersion;
use crate::util::ifname;

/// An existing tunnel interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedTunnel {
    /// Unit number (`gif<tunnel_id>`).
    pub tunnel_id: u32,
    /// Outer source address, if configured.
    pub src: Option<IpAddr>,
    /// Outer destination address, if configured.
    pub dst: Option<IpAddr>,
    /// Whether the tunnel runs over IPv6.
    pub ipv6: bool,
    /// Trimmed description.
    pub description: String,
}

/// An existing bridge interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedBridge {
    /// Unit number (`bridge<tunnel_id>`).
    pub tunnel_id: u32,
    /// Member interfaces in the order they were reported.
    pub members: Vec<String>,
}

impl ObservedBridge {
    /// Membership as a set.
    pub fn member_set(&self) -> BTreeSet<&str> {
        self.members.iter().map(String::as_str).collect()
    }
}

/// Snapshot of managed interfaces, keyed by interface name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// `gif*` interfaces.
    pub tunnels: BTreeMap<String, ObservedTunnel>,
    /// `bridge*` interfaces.
    pub bridges: BTreeMap<String, ObservedBridge>,
    /// VLAN interfaces and their tags.
    pub vlans: BTreeMap<String, u16>,
}

impl ObservedState {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tunnel.
    pub fn tunnel(mut self, tunnel: ObservedTunnel) -> Self {
        self.tunnels.insert(ifname::gif(tunnel.tunnel_id), tunnel);
        self
    }

    /// Add a bridge with the given members.
    pub fn bridge(mut self, tunnel_id: u32, members: &[&str]) -> Self {
        self.bridges.insert(
            ifname::bridge(tunnel_id),
            ObservedBridge {
                tunnel_id,
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
        self
    }

    /// Add a VLAN interface.
    pub fn vlan(mut self, name: &str, tag: u16) -> Self {
        self.vlans.insert(name.to_string(), tag);
        self
    }

    /// Look up a tunnel by id.
    pub fn tunnel_by_id(&self, tunnel_id: u32) -> Option<&ObservedTunnel> {
        self.tunnels.get(&ifname::gif(tunnel_id))
    }

    /// VLAN interfaces under `physical`.
    pub fn vlans_of<'a>(&'a self, physical: &'a str) -> impl Iterator<Item = (&'a str, u16)> + 'a {
        self.vlans
            .iter()
            .filter(move |(name, _)| ifname::is_vlan_of(name, physical))
            .map(|(name, tag)| (name.as_str(), *tag))
    }

    /// Check if nothing managed exists.
    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty() && self.bridges.is_empty() && self.vlans.is_empty()
    }
}

/// Source of live interface state.
pub trait ObservedStateProvider: Send + Sync {
    /// Take a fresh snapshot of tunnel, bridge and VLAN interfaces.
    fn snapshot(&self) -> impl Future<Output = Result<ObservedState>> + Send;

    /// Names of every interface that currently exists.
    fn interface_names(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// First address of the given family configured on `interface`.
    fn interface_address(
        &self,
        interface: &str,
        version: IpVersion,
    ) -> impl Future<Output = Result<IpAddr>> + Send;
}

impl<R: CommandRunner> ObservedStateProvider for Ifconfig<R> {
    async fn snapshot(&self) -> Result<ObservedState> {
        let listing = self.list().await?;
        let mut state = ObservedState::new();

        for name in parse::interface_names(&listing) {
            let gif = ifname::unit(&name, ifname::GIF_PREFIX);
            let bridge = ifname::unit(&name, ifname::BRIDGE_PREFIX);
            // Any dotted name may be a VLAN; only ones reporting a tag are.
            if gif.is_none() && bridge.is_none() && !name.contains('.') {
                continue;
            }

            // Destroyed between the listing and now.
            let detail = match self.describe(&name).await {
                Ok(detail) => detail,
                Err(e) => {
                    tracing::warn!(interface = %name, error = %e, "failed to describe interface, skipping");
                    continue;
                }
            };

            if let Some(tunnel_id) = gif {
                let detail = parse::tunnel_detail(&detail);
                state.tunnels.insert(
                    name,
                    ObservedTunnel {
                        tunnel_id,
                        src: detail.src,
                        dst: detail.dst,
                        ipv6: detail.ipv6,
                        description: detail.description,
                    },
                );
            } else if let Some(tunnel_id) = bridge {
                let members = parse::bridge_members(&detail);
                state
                    .bridges
                    .insert(name, ObservedBridge { tunnel_id, members });
            } else if let Some(tag) = parse::vlan_tag(&detail) {
                state.vlans.insert(name, tag);
            }
        }

        tracing::debug!(
            tunnels = state.tunnels.len(),
            bridges = state.bridges.len(),
            vlans = state.vlans.len(),
            "observed interface state"
        );
        Ok(state)
    }

    async fn interface_names(&self) -> Result<Vec<String>> {
        Ok(parse::interface_names(&self.list().await?))
    }

    async fn interface_address(&self, interface: &str, version: IpVersion) -> Result<IpAddr> {
        let detail = self.describe(interface).await?;
        parse::first_address(&detail, version).ok_or_else(|| Error::NoAddress {
            interface: interface.to_string(),
            version,
        })
    }
}
