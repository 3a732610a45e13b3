use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Settings;
use crate::error::{PipelineError, PipelineResult};

/// Where pipelines get raw dataset text from.
///
/// One call is one attempt: implementations never retry. A non-success HTTP status maps
/// to `FetchFailure::Status`, anything that prevents a response maps to
/// `FetchFailure::Cause`.
#[allow(async_fn_in_trait)]
pub trait DataSource {
    async fn fetch_text(&self, location: &str) -> PipelineResult<String>;
}

/// HTTP(S) client for remote datasets plus a reader for static assets under the data root.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    data_root: PathBuf,
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl Fetcher {
    pub fn new(settings: &Settings) -> PipelineResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(settings.user_agent.clone());
        if let Some(t) = settings.http_timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, data_root: settings.data_root.clone() })
    }

    /// Static asset path for a non-HTTP location. `file://` prefixes are stripped and
    /// relative paths resolve against the data root.
    pub fn resolve_path(&self, location: &str) -> PathBuf {
        let raw = location.strip_prefix("file://").unwrap_or(location);
        let p = Path::new(raw);
        if p.is_absolute() { p.to_path_buf() } else { self.data_root.join(p) }
    }
}

impl DataSource for Fetcher {
    async fn fetch_text(&self, location: &str) -> PipelineResult<String> {
        if is_remote(location) {
            debug!(target: "vaxboard::fetch", location, "[FETCH] GET");
            let resp = self
                .client
                .get(location)
                .send()
                .await
                .map_err(|e| PipelineError::fetch_cause(location, e))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(PipelineError::fetch_status(location, status.as_u16()));
            }
            let text = resp.text().await.map_err(|e| PipelineError::fetch_cause(location, e))?;
            debug!(target: "vaxboard::fetch", location, bytes = text.len(), "[FETCH] done");
            Ok(text)
        } else {
            let path = self.resolve_path(location);
            debug!(target: "vaxboard::fetch", path = %path.display(), "[FETCH] static asset");
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PipelineError::fetch_cause(location, e))
        }
    }
}

/// Datasets held in memory, keyed by location. Unknown locations answer 404.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    assets: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self { Self::default() }

    pub fn with<L: Into<String>, T: Into<String>>(mut self, location: L, text: T) -> Self {
        self.insert(location, text);
        self
    }

    pub fn insert<L: Into<String>, T: Into<String>>(&mut self, location: L, text: T) {
        self.assets.insert(location.into(), text.into());
    }
}

impl DataSource for MemorySource {
    async fn fetch_text(&self, location: &str) -> PipelineResult<String> {
        self.assets
            .get(location)
            .cloned()
            .ok_or_else(|| PipelineError::fetch_status(location, 404))
    }
}
