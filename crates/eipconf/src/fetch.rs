//! Desired-state document retrieval.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Timeout for fetching the document over HTTP.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the desired-state document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// An `http://` or `https://` URL.
    Url(String),
    /// A local file.
    Path(PathBuf),
}

impl DocumentSource {
    /// Select the source kind from the string's scheme.
    ///
    /// `http(s)://` is fetched over HTTP, `file://` and anything without a
    /// scheme is a local path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            Self::Url(s.to_string())
        } else if let Some(path) = s.strip_prefix("file://") {
            Self::Path(PathBuf::from(path))
        } else {
            Self::Path(PathBuf::from(s))
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetches the document and splits it into raw entries.
#[derive(Debug, Clone)]
pub struct Fetcher {
    source: DocumentSource,
    client: reqwest::Client,
}

impl Fetcher {
    /// Create a fetcher for `source`.
    pub fn new(source: DocumentSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("eipconfd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { source, client })
    }

    /// Get the source.
    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    /// Fetch the document.
    ///
    /// Any failure, including a body that is not a JSON array, is reported
    /// as [`Error::Fetch`]. Individual entries are not inspected here.
    pub async fn fetch(&self) -> Result<Vec<serde_json::Value>> {
        self.fetch_inner().await.map_err(|e| Error::Fetch {
            location: self.source.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_inner(&self) -> Result<Vec<serde_json::Value>> {
        let body = match &self.source {
            DocumentSource::Url(url) => {
                let response = self.client.get(url).send().await?.error_for_status()?;
                response.bytes().await?.to_vec()
            }
            DocumentSource::Path(path) => tokio::fs::read(path).await?,
        };
        let entries = parse_document(&body)?;
        tracing::debug!(source = %self.source, entries = entries.len(), "fetched desired state");
        Ok(entries)
    }
}

/// Split a document into its entries.
pub fn parse_document(body: &[u8]) -> Result<Vec<serde_json::Value>> {
    match serde_json::from_slice(body)? {
        serde_json::Value::Array(entries) => Ok(entries),
        other => Err(Error::Parse(format!(
            "expected a JSON array of tunnels, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
