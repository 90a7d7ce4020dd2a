//! Address resolution policy.
//!
//! Turns the symbolic parts of a tunnel entry into concrete addresses:
//!
//! - a missing `src_addr` comes from the default source interface's live
//!   address, then from the static default address;
//! - a `dst_hostname` is looked up, preferring the destination the tunnel
//!   already uses when it is still among the answers, and falling back to
//!   that destination when lookup fails for an existing tunnel.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::IpAddr;

use crate::observe::{ObservedState, ObservedStateProvider};
use crate::reconcile::{IpVersion, RejectReason};

/// Hostname lookup.
pub trait HostResolver: Send + Sync {
    /// Look up every address for `host`, in resolver order.
    fn lookup(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;
}

/// Resolves through the system resolver (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        if ips.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", host),
            ));
        }
        Ok(ips)
    }
}

/// Fallbacks for entries without a `src_addr`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDefaults {
    /// Interface whose live address is used first.
    pub interface: Option<String>,
    /// Static address used when no interface is configured or it has none.
    pub address: Option<IpAddr>,
}

/// Pick the address family for an entry.
///
/// An explicit version wins; otherwise the family of the source literal,
/// then of the destination literal; IPv4 when there is no signal at all.
pub fn infer_version(
    explicit: Option<IpVersion>,
    src: Option<&IpAddr>,
    dst: Option<&IpAddr>,
) -> IpVersion {
    explicit
        .or_else(|| src.map(IpVersion::of))
        .or_else(|| dst.map(IpVersion::of))
        .unwrap_or_default()
}

/// Choose a destination among lookup answers.
///
/// Keeps `current` if it is still one of the answers, so that a name with
/// several records does not make the tunnel hop between them. Otherwise
/// takes the first answer of the wanted family.
pub fn select_destination(
    current: Option<IpAddr>,
    answers: &[IpAddr],
    version: IpVersion,
) -> Option<IpAddr> {
    if let Some(current) = current
        && answers.contains(&current)
    {
        return Some(current);
    }
    answers
        .iter()
        .copied()
        .find(|ip| IpVersion::of(ip) == version)
}

/// Per-batch resolution state.
///
/// The default interface address is queried at most once per family for
/// the lifetime of a resolver; create one resolver per validation batch.
pub struct Resolver<'a, P, H> {
    provider: &'a P,
    hosts: &'a H,
    defaults: &'a SourceDefaults,
    observed: &'a ObservedState,
    interface_addrs: HashMap<IpVersion, Result<IpAddr, String>>,
}

impl<'a, P: ObservedStateProvider, H: HostResolver> Resolver<'a, P, H> {
    /// Create a resolver against one observed snapshot.
    pub fn new(
        provider: &'a P,
        hosts: &'a H,
        defaults: &'a SourceDefaults,
        observed: &'a ObservedState,
    ) -> Self {
        Self {
            provider,
            hosts,
            defaults,
            observed,
            interface_addrs: HashMap::new(),
        }
    }

    /// Resolve the source address for an entry without `src_addr`.
    pub async fn default_source(
        &mut self,
        tunnel_id: u32,
        version: IpVersion,
    ) -> Result<IpAddr, RejectReason> {
        let defaults = self.defaults;
        if let Some(interface) = defaults.interface.as_deref() {
            let cached = self.interface_addrs.get(&version).cloned();
            let lookup = match cached {
                Some(cached) => cached,
                None => {
                    let fresh = self
                        .provider
                        .interface_address(interface, version)
                        .await
                        .map_err(|e| e.to_string());
                    self.interface_addrs.insert(version, fresh.clone());
                    fresh
                }
            };

            match lookup {
                Ok(addr) => {
                    tracing::info!(tunnel_id, interface, src_addr = %addr, "using interface address as src_addr");
                    return Ok(addr);
                }
                Err(error) => match defaults.address {
                    Some(addr) => {
                        tracing::warn!(
                            tunnel_id,
                            interface,
                            %version,
                            src_addr = %addr,
                            error = %error,
                            "failed to get interface address, using default src_addr"
                        );
                        return Ok(addr);
                    }
                    None => {
                        return Err(RejectReason::SourceInterface {
                            interface: interface.to_string(),
                            error,
                        });
                    }
                },
            }
        }

        match defaults.address {
            Some(addr) => {
                tracing::info!(tunnel_id, src_addr = %addr, "using default src_addr");
                Ok(addr)
            }
            None => Err(RejectReason::NoSourceAddress),
        }
    }

    /// Resolve `hostname` to a destination for tunnel `tunnel_id`.
    pub async fn destination(
        &self,
        tunnel_id: u32,
        hostname: &str,
        version: IpVersion,
    ) -> Result<IpAddr, RejectReason> {
        let current = self.observed.tunnel_by_id(tunnel_id).and_then(|t| t.dst);

        let answers = match self.hosts.lookup(hostname).await {
            Ok(answers) => answers,
            Err(e) => {
                return match current {
                    Some(dst) => {
                        tracing::warn!(
                            tunnel_id,
                            dst_hostname = hostname,
                            dst_addr = %dst,
                            error = %e,
                            "failed to resolve dst_hostname, using existing dst_addr"
                        );
                        Ok(dst)
                    }
                    None => Err(RejectReason::Unresolvable {
                        hostname: hostname.to_string(),
                        error: e.to_string(),
                    }),
                };
            }
        };

        match select_destination(current, &answers, version) {
            Some(dst) if Some(dst) == current => {
                tracing::debug!(tunnel_id, dst_hostname = hostname, dst_addr = %dst, "keeping existing dst_addr from resolved IPs");
                Ok(dst)
            }
            Some(dst) => {
                tracing::info!(tunnel_id, dst_hostname = hostname, dst_addr = %dst, "resolved dst_hostname to IP");
                Ok(dst)
            }
            None => match current {
                Some(dst) => {
                    tracing::warn!(
                        tunnel_id,
                        dst_hostname = hostname,
                        dst_addr = %dst,
                        %version,
                        "no suitable IP found for dst_hostname, using existing dst_addr"
                    );
                    Ok(dst)
                }
                None => Err(RejectReason::NoSuitableAddress {
                    hostname: hostname.to_string(),
                    version,
                }),
            },
        }
    }
}
