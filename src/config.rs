//!
//! vaxboard runtime settings
//! -------------------------
//! Settings come from environment variables and may be overridden by command-line flags:
//!
//! - `VAXBOARD_DASHBOARD` / `--dashboard <path>`: dashboard definition (JSON). When unset
//!   the bundled `dashboards/covid.json` is used.
//! - `VAXBOARD_DATA_ROOT` / `--data-root <dir>`: base directory for static CSV assets.
//! - `VAXBOARD_HTTP_TIMEOUT_SECS`: optional whole-request timeout for remote datasets.
//! - `VAXBOARD_USER_AGENT`: user agent sent with remote requests.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pipeline::charts::Dashboard;

pub const DEFAULT_DASHBOARD: &str = include_str!("../dashboards/covid.json");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub dashboard: Option<PathBuf>,
    pub data_root: PathBuf,
    pub http_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            dashboard: None,
            data_root: PathBuf::from("."),
            http_timeout: None,
            user_agent: format!("vaxboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn parse_secs(v: &str) -> Option<Duration> {
    match v.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(Duration::from_secs(n)),
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        if let Some(v) = args[i].strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(v.to_string());
        }
        i += 1;
    }
    None
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build settings from an arbitrary variable lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(p) = lookup("VAXBOARD_DASHBOARD").filter(|v| !v.trim().is_empty()) {
            s.dashboard = Some(PathBuf::from(p));
        }
        if let Some(p) = lookup("VAXBOARD_DATA_ROOT").filter(|v| !v.trim().is_empty()) {
            s.data_root = PathBuf::from(p);
        }
        if let Some(v) = lookup("VAXBOARD_HTTP_TIMEOUT_SECS") {
            s.http_timeout = parse_secs(&v);
        }
        if let Some(ua) = lookup("VAXBOARD_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            s.user_agent = ua;
        }
        s
    }

    /// Apply `--dashboard` and `--data-root` overrides (either `--flag value` or `--flag=value`).
    pub fn with_args(mut self, args: &[String]) -> Self {
        if let Some(p) = flag_value(args, "--dashboard") {
            self.dashboard = Some(PathBuf::from(p));
        }
        if let Some(p) = flag_value(args, "--data-root") {
            self.data_root = PathBuf::from(p);
        }
        self
    }

    pub fn load_dashboard(&self) -> Result<Dashboard> {
        match &self.dashboard {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read dashboard '{}'", path.display()))?;
                Dashboard::from_json(&text).with_context(|| format!("invalid dashboard '{}'", path.display()))
            }
            None => Dashboard::from_json(DEFAULT_DASHBOARD).context("invalid bundled dashboard"),
        }
    }
}
