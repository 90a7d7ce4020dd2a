//! Log subscriber setup.

use std::fs::OpenOptions;
use std::sync::Arc;

use eipconf::notify::{Notifier, NotifyLayer};
use eipconf::settings::{LogLevel, Settings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. Keep the returned guard alive
/// for as long as file logging should be flushed.
pub fn init(settings: &Settings, notifier: Arc<dyn Notifier>) -> Option<WorkerGuard> {
    let level = settings.log_level().unwrap_or_else(|raw| {
        eprintln!("Invalid log_level: {}, defaulting to INFO", raw);
        LogLevel::Info
    });
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let mut guard = None;
    let file_layer = settings.log_file().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let (writer, g) = tracing_appender::non_blocking(file);
                guard = Some(g);
                Some(fmt::layer().with_writer(writer).with_ansi(false))
            }
            Err(e) => {
                eprintln!("Failed to open log file {}: {}, using console only", path, e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .with(NotifyLayer::new(notifier))
        .init();

    guard
}
