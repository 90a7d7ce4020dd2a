//! Parsers for `ifconfig` text output.
//!
//! Only the handful of lines the reconciler cares about are recognized;
//! everything else in the output is skipped.
//!
//! ```text
//! gif1: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> metric 0 mtu 1500
//!         description: tokyo-1
//!         tunnel inet 192.0.2.1 --> 198.51.100.7
//! bridge1: flags=8843<UP,BROADCAST,RUNNING,SIMPLEX,MULTICAST> metric 0 mtu 1500
//!         member: em2.101 flags=143<LEARNING,DISCOVER,AUTOEDGE,AUTOPTP>
//!         member: gif1 flags=143<LEARNING,DISCOVER,AUTOEDGE,AUTOPTP>
//! em2.101: flags=8843<UP,BROADCAST,RUNNING,SIMPLEX,MULTICAST> metric 0 mtu 1500
//!         vlan: 101 vlanproto: 802.1q vlanpcp: 0 parent interface: em2
//! ```

use std::net::IpAddr;

use winnow::ascii::{space0, space1};
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{literal, rest, take_while};

use crate::reconcile::IpVersion;

/// Parser result over text input.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Tunnel attributes scraped from one interface's detail output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelDetail {
    /// Outer source address.
    pub src: Option<IpAddr>,
    /// Outer destination address.
    pub dst: Option<IpAddr>,
    /// Whether the tunnel runs over IPv6.
    pub ipv6: bool,
    /// Trimmed interface description (empty when unset).
    pub description: String,
}

fn token<'a>(input: &mut &'a str) -> PResult<&'a str> {
    take_while(1.., |c: char| !c.is_whitespace()).parse_next(input)
}

/// `name:` at the start of an unindented line.
fn header<'a>(input: &mut &'a str) -> PResult<&'a str> {
    let name = take_while(1.., |c: char| c != ':' && !c.is_whitespace()).parse_next(input)?;
    literal(":").parse_next(input)?;
    Ok(name)
}

/// `tunnel inet <src> --> <dst>`, also accepting `tunnel:` and `->`.
fn tunnel_line<'a>(input: &mut &'a str) -> PResult<(bool, &'a str, &'a str)> {
    literal("tunnel").parse_next(input)?;
    opt(literal(":")).parse_next(input)?;
    space1.parse_next(input)?;
    let family = alt((literal("inet6"), literal("inet"))).parse_next(input)?;
    space1.parse_next(input)?;
    let src = token.parse_next(input)?;
    space1.parse_next(input)?;
    alt((literal("-->"), literal("->"))).parse_next(input)?;
    space1.parse_next(input)?;
    let dst = token.parse_next(input)?;
    Ok((family == "inet6", src, dst))
}

/// `<key>: <rest of line>`.
fn keyed<'a>(key: &'static str, input: &mut &'a str) -> PResult<&'a str> {
    literal(key).parse_next(input)?;
    literal(":").parse_next(input)?;
    space0.parse_next(input)?;
    rest.parse_next(input)
}

/// `inet <addr> ...` or `inet6 <addr> ...`.
fn address_line<'a>(input: &mut &'a str) -> PResult<(IpVersion, &'a str)> {
    let family = alt((literal("inet6"), literal("inet"))).parse_next(input)?;
    space1.parse_next(input)?;
    let addr = token.parse_next(input)?;
    let version = if family == "inet6" {
        IpVersion::V6
    } else {
        IpVersion::V4
    };
    Ok((version, addr))
}

/// Parse an address token, ignoring scoped (`fe80::1%em0`) addresses.
fn parse_ip(token: &str) -> Option<IpAddr> {
    if token.contains('%') {
        return None;
    }
    token.parse().ok()
}

fn detail_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Names of all interfaces in an `ifconfig -a` listing, in listing order.
pub fn interface_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .filter_map(|line| {
            let mut input = line;
            header(&mut input).ok().map(str::to_string)
        })
        .collect()
}

/// Tunnel endpoints and description of a tunnel interface.
pub fn tunnel_detail(detail: &str) -> TunnelDetail {
    let mut out = TunnelDetail::default();

    for line in detail_lines(detail) {
        let mut input = line;
        if let Ok((ipv6, src, dst)) = tunnel_line(&mut input) {
            out.ipv6 = ipv6;
            out.src = parse_ip(src);
            out.dst = parse_ip(dst);
            continue;
        }

        let mut input = line;
        if out.description.is_empty()
            && let Ok(text) = keyed("description", &mut input)
        {
            out.description = text.trim().to_string();
        }
    }

    out
}

/// Member interfaces of a bridge, in output order.
pub fn bridge_members(detail: &str) -> Vec<String> {
    detail_lines(detail)
        .filter_map(|line| {
            let mut input = line;
            let rest = keyed("member", &mut input).ok()?;
            let mut rest = rest;
            token(&mut rest).ok().map(str::to_string)
        })
        .collect()
}

/// VLAN tag of a VLAN interface.
pub fn vlan_tag(detail: &str) -> Option<u16> {
    detail_lines(detail).find_map(|line| {
        let mut input = line;
        let mut rest = keyed("vlan", &mut input).ok()?;
        token(&mut rest).ok()?.parse().ok()
    })
}

/// First unscoped address of the given family configured on an interface.
pub fn first_address(detail: &str, version: IpVersion) -> Option<IpAddr> {
    detail_lines(detail).find_map(|line| {
        let mut input = line;
        let (family, token) = address_line(&mut input).ok()?;
        if family != version {
            return None;
        }
        parse_ip(token).filter(|ip| IpVersion::of(ip) == version)
    })
}
