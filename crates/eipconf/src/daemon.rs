//! The reconciliation loop.
//!
//! One [`Reconciler`] is the only writer of interface state. Periodic passes
//! and operator requests ([`Trigger`]s) are served by the same loop, so two
//! passes never overlap.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::Result;
use crate::exec::CommandRunner;
use crate::fetch::Fetcher;
use crate::ifconfig::Ifconfig;
use crate::notify::{Notifier, NotifyLevel};
use crate::observe::ObservedStateProvider;
use crate::reconcile::{
    ApplyOptions, ApplyResult, RemovalWait, ResetScope, TransitionPlan, apply_plan, compute_plan,
    teardown, validate,
};
use crate::resolve::{HostResolver, Resolver, SourceDefaults};

/// Added to the retry delay for each consecutive failed fetch.
pub const FETCH_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// A request for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Run a pass now.
    Reconcile,
    /// Tear down and rebuild.
    Reset(ResetScope),
    /// Stop after the current pass.
    Shutdown(String),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconcile => write!(f, "reconcile"),
            Self::Reset(scope) => write!(f, "reset {}", scope),
            Self::Shutdown(reason) => write!(f, "shutdown ({})", reason),
        }
    }
}

/// What one pass did.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Entries accepted by validation.
    pub accepted: usize,
    /// Entries dropped by validation.
    pub rejected: usize,
    /// The computed plan.
    pub plan: TransitionPlan,
    /// The outcome of applying it.
    pub result: ApplyResult,
}

/// Runs reconciliation passes.
pub struct Reconciler<R, H> {
    ifconfig: Ifconfig<R>,
    hosts: H,
    fetcher: Fetcher,
    physical: String,
    defaults: SourceDefaults,
    notifier: Arc<dyn Notifier>,
    host: String,
    removal_wait: RemovalWait,
}

impl<R: CommandRunner, H: HostResolver> Reconciler<R, H> {
    /// Create a reconciler.
    pub fn new(
        ifconfig: Ifconfig<R>,
        hosts: H,
        fetcher: Fetcher,
        physical: impl Into<String>,
        defaults: SourceDefaults,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ifconfig,
            hosts,
            fetcher,
            physical: physical.into(),
            defaults,
            notifier,
            host: crate::notify::hostname(),
            removal_wait: RemovalWait::default(),
        }
    }

    /// Set the host name used in change reports.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set how long resets wait for interfaces to disappear.
    pub fn removal_wait(mut self, wait: RemovalWait) -> Self {
        self.removal_wait = wait;
        self
    }

    /// Get the `ifconfig` handle.
    pub fn ifconfig(&self) -> &Ifconfig<R> {
        &self.ifconfig
    }

    /// Snapshot, fetch, validate, plan, report and apply.
    ///
    /// Fails only when the interface state cannot be read or the document
    /// cannot be fetched; everything after that is reported in the result.
    pub async fn run_pass(&self, options: ApplyOptions) -> Result<PassReport> {
        let observed = self.ifconfig.snapshot().await?;
        let entries = self.fetcher.fetch().await?;

        let mut resolver = Resolver::new(&self.ifconfig, &self.hosts, &self.defaults, &observed);
        let report = validate(&entries, &self.physical, &mut resolver).await;

        let plan = compute_plan(&observed, &report.accepted, &self.physical);
        if let Some(message) = plan.report(&self.host) {
            tracing::info!("{}", message);
            if !options.dry_run {
                self.notifier.emit(NotifyLevel::Info, &message, &[]);
            }
        }

        let result = apply_plan(
            &self.ifconfig,
            &plan,
            &observed,
            &report.accepted,
            &self.physical,
            options,
        )
        .await;

        tracing::info!(
            tunnels = report.accepted.len(),
            rejected = report.rejected.len(),
            changes = plan.change_count(),
            commands = result.commands_issued,
            errors = result.errors.len(),
            "Configuration check completed"
        );

        Ok(PassReport {
            accepted: report.accepted.len(),
            rejected: report.rejected.len(),
            plan,
            result,
        })
    }

    /// Tear down `scope`, then rebuild with a forced pass.
    pub async fn reset(&self, scope: ResetScope) -> Result<PassReport> {
        let observed = self.ifconfig.snapshot().await?;
        let outcome = teardown(
            &self.ifconfig,
            &observed,
            &self.physical,
            scope,
            self.removal_wait,
        )
        .await;
        if !outcome.is_complete() {
            tracing::warn!(
                %scope,
                failed = ?outcome.failed,
                remaining = ?outcome.remaining,
                "reset incomplete, rebuilding anyway"
            );
        }
        self.run_pass(ApplyOptions::force_reset()).await
    }

    /// Serve periodic passes and triggers until shutdown.
    ///
    /// The first pass runs immediately. After a failed fetch the next
    /// periodic pass comes after 5 s, 10 s, 15 s, ... instead of `interval`.
    /// Triggered passes do not move the periodic deadline. Returns the
    /// shutdown reason.
    pub async fn run(&self, mut triggers: mpsc::Receiver<Trigger>, interval: Duration) -> String {
        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                () = &mut sleep => {
                    let delay = match self.run_pass(ApplyOptions::default()).await {
                        Ok(_) => {
                            failures = 0;
                            interval
                        }
                        Err(e) if e.is_fetch_failure() => {
                            failures += 1;
                            let backoff = FETCH_BACKOFF_STEP * failures;
                            tracing::error!(error = %e, retry_in = ?backoff, "Failed to fetch config");
                            backoff
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to read interface state");
                            interval
                        }
                    };
                    tracing::debug!(sleep = ?delay, "next periodic pass scheduled");
                    sleep.as_mut().reset(Instant::now() + delay);
                }
                trigger = triggers.recv() => match trigger {
                    Some(Trigger::Shutdown(reason)) => return reason,
                    Some(trigger) => self.handle(trigger).await,
                    None => return "control channel closed".to_string(),
                },
            }
        }
    }

    async fn handle(&self, trigger: Trigger) {
        tracing::info!(%trigger, "received request");
        let result = match &trigger {
            Trigger::Reconcile => self.run_pass(ApplyOptions::default()).await,
            Trigger::Reset(scope) => self.reset(*scope).await,
            Trigger::Shutdown(_) => return,
        };
        match result {
            Ok(_) => tracing::info!(%trigger, "request completed"),
            Err(e) if e.is_command_failure() => {
                tracing::error!(%trigger, error = %e, "failed to read interface state")
            }
            Err(e) => tracing::error!(%trigger, error = %e, "request failed"),
        }
    }
}
