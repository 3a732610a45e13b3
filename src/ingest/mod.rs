//!
//! vaxboard ingestion
//! ------------------
//! Turns a dataset location into a validated `Table`: fetch the raw text (HTTP or static
//! asset), parse it according to the declared format, then apply the dataset's schema.
//!
//! Fetch and parse failures surface as `PipelineError::Fetch` / `PipelineError::Parse`;
//! deciding whether to degrade is left to the chart runner.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineResult;
use crate::table::{Schema, Table};

pub mod csv;
pub mod fetch;
pub mod json;

pub use csv::parse_csv;
pub use fetch::{DataSource, Fetcher, MemorySource};
pub use json::{flatten_series, json_to_table};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceFormat {
    #[default]
    Csv,
    Json,
    /// Array of entities, each with a nested array of observations under `field`.
    JsonSeries { field: String },
}

/// One dataset a chart reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub location: String,
    #[serde(default)]
    pub format: SourceFormat,
    #[serde(default)]
    pub schema: Schema,
}

impl SourceSpec {
    pub fn csv<S: Into<String>>(location: S) -> Self {
        SourceSpec { location: location.into(), format: SourceFormat::Csv, schema: Schema::new() }
    }

    pub fn json_series<S: Into<String>, F: Into<String>>(location: S, field: F) -> Self {
        SourceSpec {
            location: location.into(),
            format: SourceFormat::JsonSeries { field: field.into() },
            schema: Schema::new(),
        }
    }
}

/// Parse already-fetched text according to `format`.
pub fn parse_source(text: &str, format: &SourceFormat) -> PipelineResult<Table> {
    match format {
        SourceFormat::Csv => parse_csv(text),
        SourceFormat::Json => json_to_table(&serde_json::from_str(text)?),
        SourceFormat::JsonSeries { field } => flatten_series(&serde_json::from_str(text)?, field),
    }
}

/// Fetch, parse and validate one dataset.
pub async fn load_table<D: DataSource>(source: &D, spec: &SourceSpec) -> PipelineResult<Table> {
    let text = source.fetch_text(&spec.location).await?;
    let table = parse_source(&text, &spec.format)?;
    debug!(target: "vaxboard::ingest", location = %spec.location, rows = table.len(), "[INGEST] loaded");
    spec.schema.apply(table)
}
