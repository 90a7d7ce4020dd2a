//! Daemon settings.
//!
//! Settings are read once at startup from a JSON file, or a YAML file when
//! the path ends in `.yaml` or `.yml`:
//!
//! ```json
//! {
//!   "config_source": "https://cfg.example.com/tunnels.json",
//!   "physical_iface": "em2",
//!   "default_src_iface": "em0",
//!   "fetch_interval": 30,
//!   "log_level": "INFO"
//! }
//! ```

use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fetch::DocumentSource;
use crate::notify::SlackConfig;
use crate::resolve::SourceDefaults;
use crate::util::ifname;

/// Fetch interval used when none (or a non-positive one) is configured.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Environment variable overriding `slack_webhook_url`.
pub const SLACK_WEBHOOK_ENV: &str = "SLACK_WEBHOOK_URL";

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse `DEBUG|INFO|WARN|ERROR`, case-insensitively. Empty is INFO.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" | "" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Directive for `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

/// Contents of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// URL or path of the desired-state document.
    pub config_source: String,
    /// Interface carrying the VLANs.
    pub physical_iface: String,
    pub slack_webhook_url: Option<String>,
    pub slack_channel: Option<String>,
    pub slack_username: Option<String>,
    pub slack_icon_emoji: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    /// Seconds between periodic passes.
    pub fetch_interval: Option<i64>,
    pub default_src_addr: Option<String>,
    pub default_src_iface: Option<String>,
    /// Path of the `ifconfig` binary.
    pub ifconfig_path: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Settings {
    /// Load and check settings, applying environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Settings(format!("failed to read {}: {}", path.display(), e))
        })?;

        let settings = Self::parse(path, &text)?.with_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings text; the format follows the file extension.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if yaml {
            Ok(serde_yaml::from_str(text)?)
        } else {
            Ok(serde_json::from_str(text)?)
        }
    }

    /// Apply environment overrides looked up through `var`.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = var(SLACK_WEBHOOK_ENV).filter(|u| !u.trim().is_empty()) {
            self.slack_webhook_url = Some(url);
        }
        self
    }

    /// Check required fields and literal values.
    pub fn validate(&self) -> Result<()> {
        if self.config_source.trim().is_empty() {
            return Err(Error::Settings("config_source is required".into()));
        }
        if self.physical_iface.trim().is_empty() {
            return Err(Error::Settings("physical_iface is required".into()));
        }
        ifname::validate(self.physical_iface.trim())
            .map_err(|e| Error::Settings(format!("physical_iface: {}", e)))?;
        if let Some(iface) = non_empty(&self.default_src_iface) {
            ifname::validate(iface)
                .map_err(|e| Error::Settings(format!("default_src_iface: {}", e)))?;
        }
        self.default_src_addr()?;
        Ok(())
    }

    /// The physical interface name.
    pub fn physical_iface(&self) -> &str {
        self.physical_iface.trim()
    }

    /// Where to fetch the desired state from.
    pub fn document_source(&self) -> DocumentSource {
        DocumentSource::parse(&self.config_source)
    }

    /// Interval between periodic passes.
    pub fn fetch_interval(&self) -> Duration {
        match self.fetch_interval {
            Some(secs) if secs > 0 => Duration::from_secs(secs.unsigned_abs()),
            _ => DEFAULT_FETCH_INTERVAL,
        }
    }

    /// Configured log level, or `Err` with the unrecognized value.
    pub fn log_level(&self) -> std::result::Result<LogLevel, String> {
        let raw = self.log_level.as_deref().unwrap_or_default();
        LogLevel::parse(raw).ok_or_else(|| raw.to_string())
    }

    /// Log file path, if file logging is configured.
    pub fn log_file(&self) -> Option<&str> {
        non_empty(&self.log_file)
    }

    /// Path of the `ifconfig` binary.
    pub fn ifconfig_path(&self) -> &str {
        non_empty(&self.ifconfig_path).unwrap_or("ifconfig")
    }

    fn default_src_addr(&self) -> Result<Option<IpAddr>> {
        non_empty(&self.default_src_addr)
            .map(|s| {
                s.parse()
                    .map_err(|_| Error::Settings(format!("invalid default_src_addr `{}`", s)))
            })
            .transpose()
    }

    /// Fallbacks for tunnels without `src_addr`.
    pub fn source_defaults(&self) -> Result<SourceDefaults> {
        Ok(SourceDefaults {
            interface: non_empty(&self.default_src_iface).map(str::to_string),
            address: self.default_src_addr()?,
        })
    }

    /// Slack settings, if a webhook is configured.
    pub fn slack(&self) -> Option<SlackConfig> {
        let webhook_url = non_empty(&self.slack_webhook_url)?.to_string();
        Some(SlackConfig {
            webhook_url,
            channel: non_empty(&self.slack_channel).map(str::to_string),
            username: non_empty(&self.slack_username).map(str::to_string),
            icon_emoji: non_empty(&self.slack_icon_emoji).map(str::to_string),
        })
    }
}
