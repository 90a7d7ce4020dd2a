//! Declarative tunnel reconciliation.
//!
//! A pass turns an untrusted document into the live topology in four steps:
//!
//! ```ignore
//! use eipconf::reconcile::{ApplyOptions, apply_plan, compute_plan, validate};
//! use eipconf::resolve::Resolver;
//!
//! let observed = ifconfig.snapshot().await?;
//! let mut resolver = Resolver::new(&ifconfig, &SystemResolver, &defaults, &observed);
//! let report = validate(&entries, "em2", &mut resolver).await;
//!
//! let plan = compute_plan(&observed, &report.accepted, "em2");
//! println!("{}", plan.summary());
//!
//! apply_plan(&ifconfig, &plan, &observed, &report.accepted, "em2", ApplyOptions::default()).await;
//! ```
//!
//! # Properties
//!
//! - **Idempotent**: a pass over converged state issues no mutating commands
//! - **Stateless**: every pass starts from a fresh snapshot
//! - **Ordered**: removals first, then tunnel, VLAN and bridge per spec
//! - **Dry-run**: preview the commands without issuing them

mod apply;
mod diff;
mod reset;
mod types;
mod validate;

pub use apply::{ApplyError, ApplyOptions, ApplyResult, apply_plan};
pub use diff::{DescriptionChange, DesiredBridge, GifAction, TransitionPlan, TunnelChanges, compute_plan};
pub use reset::{
    RemovalWait, ResetScope, TeardownOutcome, teardown, teardown_targets, wait_for_removal,
};
pub use types::{IpVersion, RawTunnel, TunnelSpec};
pub use validate::{MAX_VLAN_ID, RejectReason, Rejection, ValidationReport, validate};
