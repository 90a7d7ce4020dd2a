//! Transition planning.
//!
//! This module computes the difference between validated tunnel specs and
//! the observed interface state. VLAN interfaces are not planned here; they
//! are reconciled inline while applying.

use std::collections::{BTreeSet, HashSet};

use super::types::TunnelSpec;
use crate::observe::{ObservedState, ObservedTunnel};
use crate::util::ifname;

/// Difference between desired and observed tunnel topology.
#[derive(Debug, Clone, Default)]
pub struct TransitionPlan {
    /// Tunnels to create.
    pub gifs_to_add: Vec<TunnelSpec>,
    /// Existing tunnels to update (spec, changes).
    pub gifs_to_modify: Vec<(TunnelSpec, TunnelChanges)>,
    /// Tunnels to destroy.
    pub gifs_to_remove: Vec<ObservedTunnel>,
    /// Bridges to create, or to recreate when membership is wrong.
    pub bridges_to_add: Vec<DesiredBridge>,
    /// Bridges to destroy (names).
    pub bridges_to_remove: Vec<String>,
}

/// A bridge as it should exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredBridge {
    /// Bridge interface name.
    pub name: String,
    /// Members: the tunnel, then the VLAN interface.
    pub members: [String; 2],
}

/// What to do with one spec's tunnel interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifAction<'a> {
    /// Create and configure from scratch.
    Create,
    /// Update in place.
    Update(&'a TunnelChanges),
    /// Already matches.
    Keep,
}

impl TransitionPlan {
    /// Check if no changes are needed.
    pub fn is_empty(&self) -> bool {
        self.gifs_to_add.is_empty()
            && self.gifs_to_modify.is_empty()
            && self.gifs_to_remove.is_empty()
            && self.bridges_to_add.is_empty()
            && self.bridges_to_remove.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.gifs_to_add.len()
            + self.gifs_to_modify.len()
            + self.gifs_to_remove.len()
            + self.bridges_to_add.len()
            + self.bridges_to_remove.len()
    }

    /// How a spec's tunnel interface should be handled.
    pub fn gif_action(&self, spec: &TunnelSpec) -> GifAction<'_> {
        if self
            .gifs_to_add
            .iter()
            .any(|s| s.tunnel_id == spec.tunnel_id)
        {
            return GifAction::Create;
        }
        self.gifs_to_modify
            .iter()
            .find(|(s, _)| s.tunnel_id == spec.tunnel_id)
            .map_or(GifAction::Keep, |(_, changes)| GifAction::Update(changes))
    }

    /// Check if a bridge has to be (re)created.
    pub fn bridge_needed(&self, name: &str) -> bool {
        self.bridges_to_add.iter().any(|b| b.name == name)
    }

    /// Get a human-readable summary of the changes.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        for spec in &self.gifs_to_add {
            lines.push(format!("+ tunnel {} ({} -> {})", spec.gif(), spec.src, spec.dst));
        }
        for (spec, changes) in &self.gifs_to_modify {
            lines.push(format!("~ tunnel {} ({})", spec.gif(), changes.summary()));
        }
        for tunnel in &self.gifs_to_remove {
            lines.push(format!("- tunnel {}", ifname::gif(tunnel.tunnel_id)));
        }

        for bridge in &self.bridges_to_add {
            lines.push(format!(
                "+ bridge {} ({})",
                bridge.name,
                bridge.members.join(", ")
            ));
        }
        for name in &self.bridges_to_remove {
            lines.push(format!("- bridge {}", name));
        }

        if lines.is_empty() {
            "No changes needed".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Change report for operators, or `None` when nothing changes.
    pub fn report(&self, host: &str) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut msg = format!("Configuration updated on {}:\n", host);

        if !self.gifs_to_add.is_empty() {
            msg.push_str("Added tunnels:\n");
            for spec in &self.gifs_to_add {
                msg.push_str(&format!("- {}\n", spec));
            }
        }
        if !self.gifs_to_modify.is_empty() {
            msg.push_str("Modified tunnels:\n");
            for (spec, _) in &self.gifs_to_modify {
                msg.push_str(&format!("- {}\n", spec));
            }
        }
        if !self.gifs_to_remove.is_empty() {
            msg.push_str("Removed tunnels:\n");
            for tunnel in &self.gifs_to_remove {
                msg.push_str(&format!(
                    "- tunnel_id=`{}`, src_addr=`{}`, dst_addr=`{}`\n",
                    tunnel.tunnel_id,
                    display_opt(tunnel.src),
                    display_opt(tunnel.dst)
                ));
            }
        }
        if !self.bridges_to_add.is_empty() {
            msg.push_str("Rebuilt bridges:\n");
            for bridge in &self.bridges_to_add {
                msg.push_str(&format!("- {}\n", bridge.name));
            }
        }
        if !self.bridges_to_remove.is_empty() {
            msg.push_str("Removed bridges:\n");
            for name in &self.bridges_to_remove {
                msg.push_str(&format!("- {}\n", name));
            }
        }

        Some(msg)
    }
}

fn display_opt(addr: Option<std::net::IpAddr>) -> String {
    addr.map(|a| a.to_string()).unwrap_or_default()
}

/// Description update for an existing tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionChange {
    /// Set to this text.
    Set(String),
    /// Remove the description.
    Clear,
}

/// Changes to make to an existing tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelChanges {
    /// Source, destination or address family differs.
    pub endpoints: bool,
    /// Description differs.
    pub description: Option<DescriptionChange>,
}

impl TunnelChanges {
    /// Compare an observed tunnel with its spec.
    ///
    /// Descriptions are compared after trimming whitespace.
    pub fn between(observed: &ObservedTunnel, spec: &TunnelSpec) -> Self {
        let endpoints = observed.src != Some(spec.src)
            || observed.dst != Some(spec.dst)
            || observed.ipv6 != spec.is_ipv6();

        let want = spec.description.trim();
        let description = if observed.description.trim() == want {
            None
        } else if want.is_empty() {
            Some(DescriptionChange::Clear)
        } else {
            Some(DescriptionChange::Set(want.to_string()))
        };

        Self {
            endpoints,
            description,
        }
    }

    /// Check if any changes are needed.
    pub fn is_empty(&self) -> bool {
        !self.endpoints && self.description.is_none()
    }

    /// Get a summary of the changes.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.endpoints {
            parts.push("endpoints".to_string());
        }
        match &self.description {
            Some(DescriptionChange::Set(text)) => parts.push(format!("description={:?}", text)),
            Some(DescriptionChange::Clear) => parts.push("-description".to_string()),
            None => {}
        }
        parts.join(", ")
    }
}

/// Compute the plan that moves `observed` to `specs`.
pub fn compute_plan(
    observed: &ObservedState,
    specs: &[TunnelSpec],
    physical: &str,
) -> TransitionPlan {
    let mut plan = TransitionPlan::default();

    let desired_gifs: HashSet<String> = specs.iter().map(TunnelSpec::gif).collect();
    let desired_bridges: HashSet<String> = specs.iter().map(TunnelSpec::bridge).collect();

    for spec in specs {
        match observed.tunnels.get(&spec.gif()) {
            Some(current) => {
                let changes = TunnelChanges::between(current, spec);
                if !changes.is_empty() {
                    plan.gifs_to_modify.push((spec.clone(), changes));
                }
            }
            None => plan.gifs_to_add.push(spec.clone()),
        }

        let bridge = DesiredBridge {
            name: spec.bridge(),
            members: [spec.gif(), spec.vlan(physical)],
        };
        let wanted: BTreeSet<&str> = bridge.members.iter().map(String::as_str).collect();
        let matches = observed
            .bridges
            .get(&bridge.name)
            .is_some_and(|current| current.member_set() == wanted);
        if !matches {
            plan.bridges_to_add.push(bridge);
        }
    }

    for (name, tunnel) in &observed.tunnels {
        if !desired_gifs.contains(name) {
            plan.gifs_to_remove.push(tunnel.clone());
        }
    }
    for name in observed.bridges.keys() {
        if !desired_bridges.contains(name) {
            plan.bridges_to_remove.push(name.clone());
        }
    }

    plan
}
