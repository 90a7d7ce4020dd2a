//! Operator notifications.
//!
//! A [`Notifier`] receives configuration change reports and every WARN or
//! ERROR log event (through [`NotifyLayer`]). Delivery never blocks the
//! caller and its failures never reach the reconciliation pass.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Log target for delivery diagnostics; [`NotifyLayer`] ignores exactly
/// this target.
pub const DELIVERY_TARGET: &str = "eipconf_notify_delivery";

/// Upper bound on one webhook POST.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    /// Change reports.
    Info,
    /// Degraded but handled.
    Warn,
    /// Something was skipped or failed.
    Error,
}

impl NotifyLevel {
    /// Attachment color.
    pub fn color(self) -> &'static str {
        match self {
            Self::Info => "#36A64F",
            Self::Warn => "#FF9900",
            Self::Error => "#FF0000",
        }
    }

    /// Message tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Info => "[INFO]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        }
    }
}

/// Notification sink.
pub trait Notifier: Send + Sync {
    /// Emit one notification. Must return promptly and never fail.
    fn emit(&self, level: NotifyLevel, message: &str, fields: &[(String, String)]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn emit(&self, _level: NotifyLevel, _message: &str, _fields: &[(String, String)]) {}
}

/// Render a message and its fields as ``message key=`value` ...``.
pub fn render(message: &str, fields: &[(String, String)]) -> String {
    let mut text = message.to_string();
    for (key, value) in fields {
        text.push_str(&format!(" {}=`{}`", key, value));
    }
    text
}

/// Slack incoming-webhook settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

/// Posts notifications to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    config: SlackConfig,
    host: String,
    client: reqwest::Client,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl SlackNotifier {
    /// Create a notifier that labels messages with this host's name.
    pub fn new(config: SlackConfig) -> Self {
        Self::with_host(config, hostname())
    }

    /// Create a notifier with an explicit host label.
    pub fn with_host(config: SlackConfig, host: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            host: host.into(),
            client,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Wait for every delivery spawned so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while pending.join_next().await.is_some() {}
    }

    /// Deliveries spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Message text as posted: log events carry a host and level prefix,
    /// change reports are posted as they are.
    pub fn text(&self, level: NotifyLevel, message: &str, fields: &[(String, String)]) -> String {
        let body = render(message, fields);
        match level {
            NotifyLevel::Info => body,
            _ => format!("[{}] {}: {}", self.host, level.tag(), body),
        }
    }

    /// Webhook request body.
    pub fn payload(&self, level: NotifyLevel, text: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "attachments": [{ "color": level.color(), "text": text }],
        });
        let optional = [
            ("channel", &self.config.channel),
            ("username", &self.config.username),
            ("icon_emoji", &self.config.icon_emoji),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                payload[key] = serde_json::Value::from(value);
            }
        }
        payload
    }
}

impl Notifier for SlackNotifier {
    fn emit(&self, level: NotifyLevel, message: &str, fields: &[(String, String)]) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let body = self.payload(level, &self.text(level, message, fields));
        let client = self.client.clone();
        let url = self.config.webhook_url.clone();

        let delivery = async move {
            let result = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(target: DELIVERY_TARGET, error = %e, "failed to send to Slack");
            }
        };

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn_on(delivery, &runtime);
    }
}

/// Forwards WARN and ERROR events to a [`Notifier`].
pub struct NotifyLayer {
    notifier: Arc<dyn Notifier>,
}

impl NotifyLayer {
    /// Create a layer feeding `notifier`.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl<S: Subscriber> Layer<S> for NotifyLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = match *meta.level() {
            Level::ERROR => NotifyLevel::Error,
            Level::WARN => NotifyLevel::Warn,
            _ => return,
        };
        if meta.target() == DELIVERY_TARGET {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        self.notifier.emit(level, &fields.message, &fields.fields);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

/// This host's name, or `unknown`.
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
