//! Unified pipeline error model.
//! Every stage (fetch, parse, schema validation, dataframe work, dashboard loading)
//! reports through `PipelineError`. Chart runners decide per variant whether to degrade or propagate.

use std::fmt::{Display, Formatter};

use polars::prelude::PolarsError;
use thiserror::Error;

/// Cause of a failed fetch: either the server answered with a non-success status,
/// or the request never completed (transport, DNS, local file I/O).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Status(u16),
    Cause(String),
}

impl Display for FetchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "HTTP {}", code),
            FetchFailure::Cause(c) => f.write_str(c),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("fetch of '{location}' failed: {failure}")]
    Fetch { location: String, failure: FetchFailure },
    #[error("parse error: {message}")]
    Parse { message: String },
    #[error("required column '{missing_column}' not found")]
    Schema { missing_column: String },
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("dataframe error: {message}")]
    Frame { message: String },
}

impl PipelineError {
    pub fn fetch_status<S: Into<String>>(location: S, status: u16) -> Self {
        PipelineError::Fetch { location: location.into(), failure: FetchFailure::Status(status) }
    }
    pub fn fetch_cause<S: Into<String>, C: Display>(location: S, cause: C) -> Self {
        PipelineError::Fetch { location: location.into(), failure: FetchFailure::Cause(cause.to_string()) }
    }
    pub fn parse<S: Into<String>>(msg: S) -> Self { PipelineError::Parse { message: msg.into() } }
    pub fn schema<S: Into<String>>(column: S) -> Self { PipelineError::Schema { missing_column: column.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { PipelineError::Config { message: msg.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            PipelineError::Fetch { .. } => "fetch_error",
            PipelineError::Parse { .. } => "parse_error",
            PipelineError::Schema { .. } => "schema_error",
            PipelineError::Config { .. } => "config_error",
            PipelineError::Frame { .. } => "frame_error",
        }
    }

    /// Fetch and parse failures are data-availability problems: the chart renders empty
    /// and siblings carry on. Everything else is a mismatch between code and data.
    pub fn is_degradable(&self) -> bool {
        matches!(self, PipelineError::Fetch { .. } | PipelineError::Parse { .. })
    }

    /// HTTP status carried by a fetch failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            PipelineError::Fetch { failure: FetchFailure::Status(s), .. } => Some(*s),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Parse { message: err.to_string() }
    }
}

impl From<PolarsError> for PipelineError {
    fn from(err: PolarsError) -> Self {
        PipelineError::Frame { message: err.to_string() }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
