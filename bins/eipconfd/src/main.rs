//! eipconfd - tunnel topology reconciliation daemon
//!
//! Periodically fetches the desired tunnel list and converges the host's
//! gif, VLAN and bridge interfaces to it.

mod logging;
mod signals;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use eipconf::daemon::Reconciler;
use eipconf::exec::{Executor, RetryPolicy, SystemRunner};
use eipconf::fetch::Fetcher;
use eipconf::ifconfig::Ifconfig;
use eipconf::notify::{Notifier, NullNotifier, SlackNotifier};
use eipconf::reconcile::ApplyOptions;
use eipconf::resolve::SystemResolver;
use eipconf::settings::Settings;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "eipconfd")]
#[command(about = "Tunnel topology reconciliation daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the settings file [default: settings.json next to the executable]
    #[arg(short, long, env = "EIPCONF_CONF")]
    config: Option<PathBuf>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Print the commands a single pass would issue, without issuing them
    #[arg(long)]
    dry_run: bool,
}

fn default_settings_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("settings.json")))
        .unwrap_or_else(|| PathBuf::from("settings.json"))
}

fn build(
    settings: &Settings,
    notifier: Arc<dyn Notifier>,
) -> eipconf::Result<Reconciler<SystemRunner, SystemResolver>> {
    let ifconfig = Ifconfig::new(
        Executor::new(SystemRunner, RetryPolicy::default()),
        settings.ifconfig_path(),
    );
    let fetcher = Fetcher::new(settings.document_source())?;

    Ok(Reconciler::new(
        ifconfig,
        SystemResolver,
        fetcher,
        settings.physical_iface(),
        settings.source_defaults()?,
        notifier,
    ))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(default_settings_path);
    let settings = match Settings::load(&path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Initial load settings failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let slack = settings
        .slack()
        .filter(|_| !cli.dry_run)
        .map(|slack| Arc::new(SlackNotifier::new(slack)));
    let notifier: Arc<dyn Notifier> = match &slack {
        Some(slack) => slack.clone(),
        None => Arc::new(NullNotifier),
    };
    let _log_guard = logging::init(&settings, notifier.clone());

    tracing::info!(settings = %path.display(), "Program start.");

    let reconciler = match build(&settings, notifier) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    if cli.once || cli.dry_run {
        let options = ApplyOptions {
            dry_run: cli.dry_run,
            ..Default::default()
        };
        let code = match reconciler.run_pass(options).await {
            Ok(report) => {
                if cli.dry_run {
                    println!("{}", report.plan.summary());
                    println!("{}", report.result.summary_text());
                }
                if report.result.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                tracing::error!(source = %settings.config_source, error = %e, "pass failed");
                ExitCode::FAILURE
            }
        };
        flush(slack.as_deref()).await;
        return code;
    }

    let (tx, rx) = mpsc::channel(8);
    let watcher = match signals::spawn(tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let reason = reconciler.run(rx, settings.fetch_interval()).await;
    watcher.abort();

    tracing::info!(reason = %reason, exit_code = 0, "Program terminated");
    flush(slack.as_deref()).await;
    ExitCode::SUCCESS
}

/// Let queued Slack deliveries finish before the runtime goes away.
async fn flush(slack: Option<&SlackNotifier>) {
    if let Some(slack) = slack {
        slack.flush().await;
    }
}
