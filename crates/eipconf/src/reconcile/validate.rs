//! Validation of the fetched desired-state document.
//!
//! Entries are checked one at a time in document order. A bad entry is
//! reported and dropped; it never fails the rest of the batch.

use std::collections::HashSet;
use std::net::IpAddr;

use super::types::{IpVersion, RawTunnel, TunnelSpec};
use crate::observe::ObservedStateProvider;
use crate::resolve::{HostResolver, Resolver, infer_version};
use crate::util::ifname::{self, IfNameError};

/// Highest usable 802.1Q tag.
pub const MAX_VLAN_ID: u16 = 4094;

/// Why an entry of the document was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("entry is not a valid tunnel object: {0}")]
    Malformed(String),

    #[error("missing tunnel_id")]
    MissingTunnelId,

    #[error("missing vlan_id")]
    MissingVlanId,

    #[error("invalid tunnel_id `{0}`")]
    InvalidTunnelId(String),

    #[error("invalid vlan_id `{0}` (expected 1-{MAX_VLAN_ID})")]
    InvalidVlanId(String),

    #[error("invalid ip_version `{0}` (expected \"4\" or \"6\")")]
    InvalidIpVersion(String),

    #[error("invalid {field} `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("missing both dst_addr and dst_hostname")]
    MissingDestination,

    #[error("missing src_addr and no default specified")]
    NoSourceAddress,

    #[error("failed to get address of {interface}: {error}")]
    SourceInterface { interface: String, error: String },

    #[error("failed to resolve dst_hostname {hostname}: {error}")]
    Unresolvable { hostname: String, error: String },

    #[error("no suitable {version} address for dst_hostname {hostname}")]
    NoSuitableAddress { hostname: String, version: IpVersion },

    #[error("ip_version {version} conflicts with {field} `{addr}`")]
    VersionMismatch {
        version: IpVersion,
        field: &'static str,
        addr: IpAddr,
    },

    #[error("src_addr `{src}` and dst_addr `{dst}` are of different address families")]
    MixedFamilies { src: IpAddr, dst: IpAddr },

    #[error(transparent)]
    InvalidName(#[from] IfNameError),

    #[error("duplicate tunnel_id {0}")]
    DuplicateTunnelId(u32),

    #[error("duplicate dst_addr {0}")]
    DuplicateDstAddr(IpAddr),

    #[error("duplicate vlan_id {0}")]
    DuplicateVlanId(u16),
}

impl RejectReason {
    /// Check if the entry was dropped for colliding with an earlier one.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTunnelId(_) | Self::DuplicateDstAddr(_) | Self::DuplicateVlanId(_)
        )
    }
}

/// A dropped entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position in the document.
    pub index: usize,
    /// The entry's `tunnel_id` as written, if it had one.
    pub tunnel_id: Option<String>,
    /// Why it was dropped.
    pub reason: RejectReason,
}

/// Outcome of validating one document.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Accepted specs, in document order.
    pub accepted: Vec<TunnelSpec>,
    /// Dropped entries, in document order.
    pub rejected: Vec<Rejection>,
}

impl ValidationReport {
    /// Check if every entry was accepted.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validate and resolve every entry of a document.
///
/// First occurrence wins for duplicate `tunnel_id`, resolved `dst_addr` and
/// `vlan_id`.
pub async fn validate<P, H>(
    entries: &[serde_json::Value],
    physical: &str,
    resolver: &mut Resolver<'_, P, H>,
) -> ValidationReport
where
    P: ObservedStateProvider,
    H: HostResolver,
{
    let mut report = ValidationReport::default();
    let mut ids = HashSet::new();
    let mut dsts = HashSet::new();
    let mut vlans = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let raw_id = entry
            .get("tunnel_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let result = resolve_entry(entry, physical, resolver)
            .await
            .and_then(|spec| {
                if ids.contains(&spec.tunnel_id) {
                    Err(RejectReason::DuplicateTunnelId(spec.tunnel_id))
                } else if dsts.contains(&spec.dst) {
                    Err(RejectReason::DuplicateDstAddr(spec.dst))
                } else if vlans.contains(&spec.vlan_id) {
                    Err(RejectReason::DuplicateVlanId(spec.vlan_id))
                } else {
                    ids.insert(spec.tunnel_id);
                    dsts.insert(spec.dst);
                    vlans.insert(spec.vlan_id);
                    Ok(spec)
                }
            });

        match result {
            Ok(spec) => {
                tracing::debug!(index, tunnel = %spec, "accepted tunnel entry");
                report.accepted.push(spec);
            }
            Err(reason) => {
                tracing::error!(
                    index,
                    tunnel_id = raw_id.as_deref().unwrap_or(""),
                    reason = %reason,
                    "skipping invalid tunnel entry"
                );
                report.rejected.push(Rejection {
                    index,
                    tunnel_id: raw_id,
                    reason,
                });
            }
        }
    }

    report
}

async fn resolve_entry<P, H>(
    entry: &serde_json::Value,
    physical: &str,
    resolver: &mut Resolver<'_, P, H>,
) -> Result<TunnelSpec, RejectReason>
where
    P: ObservedStateProvider,
    H: HostResolver,
{
    let raw: RawTunnel = serde_json::from_value(entry.clone())
        .map_err(|e| RejectReason::Malformed(e.to_string()))?;

    let tunnel_id = RawTunnel::field(&raw.tunnel_id).ok_or(RejectReason::MissingTunnelId)?;
    let tunnel_id = parse_tunnel_id(tunnel_id)?;

    let vlan_id = RawTunnel::field(&raw.vlan_id).ok_or(RejectReason::MissingVlanId)?;
    let vlan_id = parse_vlan_id(vlan_id)?;

    let explicit = match RawTunnel::field(&raw.ip_version) {
        Some(v) => Some(
            IpVersion::parse(v).ok_or_else(|| RejectReason::InvalidIpVersion(v.to_string()))?,
        ),
        None => None,
    };

    let src = parse_addr("src_addr", RawTunnel::field(&raw.src_addr))?;
    let dst = parse_addr("dst_addr", RawTunnel::field(&raw.dst_addr))?;
    let hostname = RawTunnel::field(&raw.dst_hostname);
    if dst.is_none() && hostname.is_none() {
        return Err(RejectReason::MissingDestination);
    }

    ifname::validate(&ifname::gif(tunnel_id))?;
    ifname::validate(&ifname::bridge(tunnel_id))?;
    ifname::validate(&ifname::vlan(physical, vlan_id))?;

    if let Some(version) = explicit {
        for (field, addr) in [("src_addr", src), ("dst_addr", dst)] {
            if let Some(addr) = addr.filter(|a| IpVersion::of(a) != version) {
                return Err(RejectReason::VersionMismatch {
                    version,
                    field,
                    addr,
                });
            }
        }
    }

    let version = infer_version(explicit, src.as_ref(), dst.as_ref());

    let src = match src {
        Some(src) => src,
        None => resolver.default_source(tunnel_id, version).await?,
    };

    let dst = match (dst, hostname) {
        (Some(dst), Some(hostname)) => {
            tracing::debug!(tunnel_id, dst_addr = %dst, dst_hostname = hostname, "both dst_addr and dst_hostname set, ignoring dst_hostname");
            dst
        }
        (Some(dst), None) => dst,
        (None, Some(hostname)) => resolver.destination(tunnel_id, hostname, version).await?,
        (None, None) => return Err(RejectReason::MissingDestination),
    };

    if IpVersion::of(&src) != IpVersion::of(&dst) {
        return Err(RejectReason::MixedFamilies { src, dst });
    }

    Ok(TunnelSpec {
        tunnel_id,
        src,
        dst,
        vlan_id,
        ip_version: version,
        description: RawTunnel::field(&raw.description)
            .unwrap_or_default()
            .to_string(),
        dst_hostname: hostname.map(str::to_string),
    })
}

fn parse_tunnel_id(s: &str) -> Result<u32, RejectReason> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RejectReason::InvalidTunnelId(s.to_string()));
    }
    s.parse()
        .map_err(|_| RejectReason::InvalidTunnelId(s.to_string()))
}

fn parse_vlan_id(s: &str) -> Result<u16, RejectReason> {
    let invalid = || RejectReason::InvalidVlanId(s.to_string());
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match s.parse::<u16>() {
        Ok(id) if (1..=MAX_VLAN_ID).contains(&id) => Ok(id),
        _ => Err(invalid()),
    }
}

fn parse_addr(field: &'static str, value: Option<&str>) -> Result<Option<IpAddr>, RejectReason> {
    value
        .map(|v| {
            v.parse().map_err(|_| RejectReason::InvalidAddress {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}
