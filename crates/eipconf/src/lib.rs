//! Desired-state reconciler for GIF tunnel topologies.
//!
//! Each logical tunnel is three interfaces driven through `ifconfig`: a GIF
//! point-to-point tunnel `gif<id>`, a VLAN sub-interface
//! `<physical>.<vlan>` and a bridge `bridge<id>` joining the two. A desired
//! list of tunnels is fetched periodically and the live interfaces are
//! converged to it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use eipconf::daemon::Reconciler;
//! use eipconf::exec::{Executor, RetryPolicy, SystemRunner};
//! use eipconf::fetch::{DocumentSource, Fetcher};
//! use eipconf::ifconfig::Ifconfig;
//! use eipconf::notify::NullNotifier;
//! use eipconf::reconcile::ApplyOptions;
//! use eipconf::resolve::{SourceDefaults, SystemResolver};
//!
//! #[tokio::main]
//! async fn main() -> eipconf::Result<()> {
//!     let ifconfig = Ifconfig::new(Executor::new(SystemRunner, RetryPolicy::default()), "ifconfig");
//!     let fetcher = Fetcher::new(DocumentSource::parse("https://cfg.example.com/tunnels.json"))?;
//!     let reconciler = Reconciler::new(
//!         ifconfig,
//!         SystemResolver,
//!         fetcher,
//!         "em2",
//!         SourceDefaults::default(),
//!         Arc::new(NullNotifier),
//!     );
//!
//!     let report = reconciler.run_pass(ApplyOptions::default()).await?;
//!     println!("{}", report.plan.summary());
//!     Ok(())
//! }
//! ```

pub mod daemon;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod ifconfig;
pub mod notify;
pub mod observe;
pub mod reconcile;
pub mod resolve;
pub mod settings;
pub mod util;

pub use error::{Error, Result};
