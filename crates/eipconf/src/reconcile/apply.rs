//! Plan application.
//!
//! This module drives `ifconfig` to carry out a [`TransitionPlan`]. The
//! order is fixed:
//!
//! 1. destroy tunnels marked for removal
//! 2. destroy bridges marked for removal
//! 3. per spec, in document order: tunnel, then VLAN, then bridge
//! 4. destroy VLAN interfaces under the physical interface that no spec uses
//!
//! A failed create, tunnel configuration or destroy-before-recreate skips
//! the rest of that spec for this pass. Other failures are recorded and the
//! sequence continues.

use std::collections::HashSet;

use super::diff::{DescriptionChange, GifAction, TransitionPlan, TunnelChanges};
use super::types::TunnelSpec;
use crate::error::Error;
use crate::exec::CommandRunner;
use crate::ifconfig::{DEFAULT_MTU, Ifconfig, IfconfigOp};
use crate::observe::ObservedState;

/// Options for applying a plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Recreate every managed interface instead of skipping ones that
    /// already match.
    pub force_reset: bool,
    /// Don't actually make changes, just record what would be done.
    pub dry_run: bool,
}

impl ApplyOptions {
    /// Options for a forced rebuild.
    pub fn force_reset() -> Self {
        Self {
            force_reset: true,
            dry_run: false,
        }
    }
}

/// Result of applying a plan.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Number of mutating commands issued (or that would be issued in
    /// dry-run mode).
    pub commands_issued: usize,
    /// Failed operations.
    pub errors: Vec<ApplyError>,
    /// One line per command.
    pub summary: Vec<String>,
}

impl ApplyResult {
    /// Check if every command succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get a human-readable summary.
    pub fn summary_text(&self) -> String {
        if self.summary.is_empty() {
            "No changes made".to_string()
        } else {
            self.summary.join("\n")
        }
    }
}

/// An operation that failed after its retries.
#[derive(Debug)]
pub struct ApplyError {
    /// What operation was being performed.
    pub operation: String,
    /// The underlying error.
    pub error: Error,
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.error)
    }
}

/// Apply `plan` for `specs` against the state it was computed from.
pub async fn apply_plan<R: CommandRunner>(
    ifconfig: &Ifconfig<R>,
    plan: &TransitionPlan,
    observed: &ObservedState,
    specs: &[TunnelSpec],
    physical: &str,
    options: ApplyOptions,
) -> ApplyResult {
    let mut applier = Applier {
        ifconfig,
        observed,
        physical,
        options,
        result: ApplyResult::default(),
    };

    // 1. Tunnels first, so no bridge still holds a removed tunnel
    for tunnel in &plan.gifs_to_remove {
        let name = crate::util::ifname::gif(tunnel.tunnel_id);
        applier.run(IfconfigOp::Destroy { name }).await;
    }

    // 2. Bridges
    for name in &plan.bridges_to_remove {
        applier
            .run(IfconfigOp::Destroy { name: name.clone() })
            .await;
    }

    // 3. Per spec
    for spec in specs {
        let vlan = if applier.tunnel(spec, plan.gif_action(spec)).await {
            applier.vlan(spec).await
        } else {
            None
        };
        match vlan {
            // A destroyed VLAN left its bridge, so the bridge is rebuilt too.
            Some(recreated) => {
                let needed = recreated || plan.bridge_needed(&spec.bridge());
                applier.bridge(spec, needed).await;
            }
            None => tracing::warn!(
                tunnel_id = spec.tunnel_id(),
                "skipping remaining configuration for tunnel this pass"
            ),
        }
    }

    // 4. Orphaned VLANs
    let referenced: HashSet<String> = specs.iter().map(|s| s.vlan(physical)).collect();
    let orphans: Vec<String> = observed
        .vlans_of(physical)
        .filter(|(name, _)| !referenced.contains(*name))
        .map(|(name, _)| name.to_string())
        .collect();
    for name in orphans {
        tracing::info!(vlan = %name, "removing unused VLAN");
        applier.run(IfconfigOp::Destroy { name }).await;
    }

    applier.result
}

struct Applier<'a, R> {
    ifconfig: &'a Ifconfig<R>,
    observed: &'a ObservedState,
    physical: &'a str,
    options: ApplyOptions,
    result: ApplyResult,
}

impl<R: CommandRunner> Applier<'_, R> {
    /// Issue one command; returns whether it succeeded.
    async fn run(&mut self, op: IfconfigOp) -> bool {
        self.result.commands_issued += 1;

        if self.options.dry_run {
            self.result.summary.push(format!("Would {}", op));
            return true;
        }

        match self.ifconfig.apply(&op).await {
            Ok(()) => {
                self.result.summary.push(op.to_string());
                true
            }
            Err(e) => {
                tracing::error!(interface = op.interface(), operation = %op, error = %e, "failed to {}", op);
                self.result.errors.push(ApplyError {
                    operation: op.to_string(),
                    error: e,
                });
                false
            }
        }
    }

    /// Reconcile the tunnel interface; false aborts the rest of the spec.
    async fn tunnel(&mut self, spec: &TunnelSpec, action: GifAction<'_>) -> bool {
        let name = spec.gif();
        let exists = self.observed.tunnels.contains_key(&name);

        if self.options.force_reset {
            if exists && !self.run(IfconfigOp::Destroy { name: name.clone() }).await {
                return false;
            }
            return self.create_tunnel(spec, name).await;
        }

        match action {
            GifAction::Create => self.create_tunnel(spec, name).await,
            GifAction::Update(changes) => self.update_tunnel(spec, name, changes).await,
            GifAction::Keep => {
                tracing::debug!(gif = %name, "gif already exists with correct config, skipping");
                true
            }
        }
    }

    async fn create_tunnel(&mut self, spec: &TunnelSpec, name: String) -> bool {
        if !self.run(IfconfigOp::Create { name: name.clone() }).await {
            return false;
        }
        if !self.run(endpoints(spec, &name)).await {
            return false;
        }
        self.run(IfconfigOp::Mtu {
            name: name.clone(),
            mtu: DEFAULT_MTU,
        })
        .await;
        self.run(IfconfigOp::Link0 { name: name.clone() }).await;
        self.run(IfconfigOp::Up { name: name.clone() }).await;

        let text = spec.description_text().trim();
        if !text.is_empty() {
            self.run(IfconfigOp::Description {
                name,
                text: text.to_string(),
            })
            .await;
        }
        true
    }

    async fn update_tunnel(&mut self, spec: &TunnelSpec, name: String, changes: &TunnelChanges) -> bool {
        if changes.endpoints {
            if !self.run(endpoints(spec, &name)).await {
                return false;
            }
            self.run(IfconfigOp::Link0 { name: name.clone() }).await;
            self.run(IfconfigOp::Up { name: name.clone() }).await;
        }

        match &changes.description {
            Some(DescriptionChange::Set(text)) => {
                if self
                    .run(IfconfigOp::Description {
                        name: name.clone(),
                        text: text.clone(),
                    })
                    .await
                {
                    tracing::info!(gif = %name, description = %text, "updated gif description");
                }
            }
            Some(DescriptionChange::Clear) => {
                self.run(IfconfigOp::ClearDescription { name }).await;
            }
            None => {}
        }
        true
    }

    /// Reconcile the VLAN interface.
    ///
    /// Returns `None` to abort the rest of the spec, otherwise whether an
    /// existing VLAN interface was destroyed and created again.
    async fn vlan(&mut self, spec: &TunnelSpec) -> Option<bool> {
        let name = spec.vlan(self.physical);
        let current = self.observed.vlans.get(&name).copied();

        if current == Some(spec.vlan_id()) && !self.options.force_reset {
            tracing::debug!(vlan = %name, "VLAN already exists with correct config, skipping");
            return Some(false);
        }

        if current.is_some() && !self.run(IfconfigOp::Destroy { name: name.clone() }).await {
            return None;
        }
        if !self.run(IfconfigOp::Create { name: name.clone() }).await {
            return None;
        }
        self.run(IfconfigOp::Vlan {
            name,
            tag: spec.vlan_id(),
            parent: self.physical.to_string(),
        })
        .await;
        Some(current.is_some())
    }

    async fn bridge(&mut self, spec: &TunnelSpec, needed: bool) {
        let name = spec.bridge();
        let exists = self.observed.bridges.contains_key(&name);

        if !needed && !self.options.force_reset {
            tracing::debug!(bridge = %name, "bridge already exists with correct config, skipping");
            return;
        }

        if exists && !self.run(IfconfigOp::Destroy { name: name.clone() }).await {
            return;
        }
        if !self.run(IfconfigOp::Create { name: name.clone() }).await {
            return;
        }
        for member in [spec.gif(), spec.vlan(self.physical)] {
            self.run(IfconfigOp::AddMember {
                bridge: name.clone(),
                member,
            })
            .await;
        }
        // Recreating over a wrong membership keeps the MTU it had.
        if !exists || self.options.force_reset {
            self.run(IfconfigOp::Mtu {
                name: name.clone(),
                mtu: DEFAULT_MTU,
            })
            .await;
        }
        self.run(IfconfigOp::Up { name }).await;
    }
}

fn endpoints(spec: &TunnelSpec, name: &str) -> IfconfigOp {
    IfconfigOp::Tunnel {
        name: name.to_string(),
        src: spec.src(),
        dst: spec.dst(),
        ipv6: spec.is_ipv6(),
    }
}
