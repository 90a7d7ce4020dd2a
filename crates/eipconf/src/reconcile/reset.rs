//! Teardown for the reset workflows.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::exec::CommandRunner;
use crate::ifconfig::{Ifconfig, IfconfigOp};
use crate::observe::{ObservedState, ObservedStateProvider};

/// What a reset tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// Every VLAN interface under the physical interface.
    Vlans,
    /// Every managed tunnel, VLAN and bridge interface.
    All,
}

impl fmt::Display for ResetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vlans => write!(f, "VLANs"),
            Self::All => write!(f, "all interfaces"),
        }
    }
}

/// How long to wait for destroyed interfaces to disappear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalWait {
    /// Delay between listings.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for RemovalWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Result of a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    /// Interfaces whose destroy command succeeded.
    pub destroyed: Vec<String>,
    /// Interfaces whose destroy command failed.
    pub failed: Vec<String>,
    /// Destroyed interfaces still listed when the wait timed out.
    pub remaining: Vec<String>,
}

impl TeardownOutcome {
    /// Check if everything was destroyed and confirmed gone.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.remaining.is_empty()
    }
}

/// Names a reset of `scope` destroys, in destroy order.
pub fn teardown_targets(observed: &ObservedState, physical: &str, scope: ResetScope) -> Vec<String> {
    let vlans = observed.vlans_of(physical).map(|(name, _)| name.to_string());
    match scope {
        ResetScope::Vlans => vlans.collect(),
        ResetScope::All => observed
            .tunnels
            .keys()
            .cloned()
            .chain(vlans)
            .chain(observed.bridges.keys().cloned())
            .collect(),
    }
}

/// Destroy everything in `scope` and wait for it to disappear.
///
/// Destroy failures are logged and the remaining destroys still run; only
/// successfully destroyed names are waited for. A timeout is a warning.
pub async fn teardown<R: CommandRunner>(
    ifconfig: &Ifconfig<R>,
    observed: &ObservedState,
    physical: &str,
    scope: ResetScope,
    wait: RemovalWait,
) -> TeardownOutcome {
    let mut outcome = TeardownOutcome::default();

    for name in teardown_targets(observed, physical, scope) {
        match ifconfig.apply(&IfconfigOp::Destroy { name: name.clone() }).await {
            Ok(()) => outcome.destroyed.push(name),
            Err(e) => {
                tracing::error!(interface = %name, %scope, error = %e, "failed to remove interface during reset");
                outcome.failed.push(name);
            }
        }
    }

    if !outcome.destroyed.is_empty() {
        outcome.remaining = wait_for_removal(ifconfig, &outcome.destroyed, wait).await;
    }

    if outcome.is_complete() {
        tracing::info!(%scope, physical_iface = physical, count = outcome.destroyed.len(), "reset completed");
    }
    outcome
}

/// Poll the interface list until none of `names` is present.
///
/// Returns the names still present when `wait.timeout` elapsed (empty on
/// success). A failed listing counts as "not yet" and polling continues.
pub async fn wait_for_removal<P: ObservedStateProvider>(
    provider: &P,
    names: &[String],
    wait: RemovalWait,
) -> Vec<String> {
    tracing::debug!(interfaces = ?names, "waiting for interface removal");
    let deadline = Instant::now() + wait.timeout;
    let mut remaining: Vec<String> = names.to_vec();

    loop {
        match provider.interface_names().await {
            Ok(present) => {
                remaining = names
                    .iter()
                    .filter(|n| present.contains(*n))
                    .cloned()
                    .collect();
                if remaining.is_empty() {
                    tracing::debug!(interfaces = ?names, "all interfaces removed");
                    return remaining;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to check interface removal"),
        }

        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(wait.interval).await;
    }

    tracing::warn!(remaining = ?remaining, timeout = ?wait.timeout, "timeout waiting for interface removal");
    remaining
}
