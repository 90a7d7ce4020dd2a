//! Interface naming for managed tunnels, VLANs and bridges.

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = 16;

/// Prefix of managed tunnel interfaces.
pub const GIF_PREFIX: &str = "gif";

/// Prefix of managed bridge interfaces.
pub const BRIDGE_PREFIX: &str = "bridge";

/// Error type for interface names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IfNameError {
    #[error("invalid interface name {name:?}: {reason}")]
    Invalid { name: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, IfNameError>;

/// Validate an interface name.
pub fn validate(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(IfNameError::Invalid {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("empty name");
    }

    if name.len() >= IFNAMSIZ {
        return invalid("name too long (max 15 chars)");
    }

    if name.contains('/') || name.contains('\0') {
        return invalid("name contains invalid characters");
    }

    if name.chars().any(|c| c.is_whitespace()) {
        return invalid("name contains whitespace");
    }

    Ok(())
}

/// Tunnel interface name for a tunnel id (`gif<id>`).
pub fn gif(tunnel_id: u32) -> String {
    format!("{GIF_PREFIX}{tunnel_id}")
}

/// Bridge interface name for a tunnel id (`bridge<id>`).
pub fn bridge(tunnel_id: u32) -> String {
    format!("{BRIDGE_PREFIX}{tunnel_id}")
}

/// VLAN sub-interface name (`<physical>.<vlan_id>`).
pub fn vlan(physical: &str, vlan_id: u16) -> String {
    format!("{physical}.{vlan_id}")
}

/// Extract the unit number from a `<prefix><digits>` name.
///
/// Returns `None` unless everything after the prefix is a decimal number,
/// so `gif1` matches `gif` but `gif1a` and `gifx` do not.
pub fn unit(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Check whether `name` is a VLAN sub-interface of `physical`.
pub fn is_vlan_of(name: &str, physical: &str) -> bool {
    name.strip_prefix(physical)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|tag| !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_digit()))
}
