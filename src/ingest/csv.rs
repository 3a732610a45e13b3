//! Naive delimited-text reader.
//!
//! Lines are split on `\n` and fields on `,` with no quoting support: a comma inside a
//! quoted field splits the field. The dashboard datasets never quote commas, and several
//! charts rely on the lenient column-count handling below, so the behavior is kept as is.

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::table::{Table, Value};
use crate::tprintln;

/// Parse CSV text into a table of string columns keyed by the trimmed header names.
///
/// Rows shorter than the header get nulls for the missing trailing columns; extra
/// trailing fields are ignored. Blank fields are null. A header the frame cannot hold
/// (a repeated column name) is a parse error.
pub fn parse_csv(text: &str) -> PipelineResult<Table> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::parse("CSV text is empty: no header line"));
    }
    let mut lines = trimmed.split('\n');
    let header = lines.next().unwrap_or_default();
    let columns: Vec<String> = header.split(',').map(|h| h.trim().to_string()).collect();
    tprintln!("[CSV] header={:?}", columns);
    let records: Vec<Vec<Value>> = lines
        .map(|line| line.split(',').map(|f| Value::from_text(f.trim())).collect())
        .collect();
    let table = Table::from_records(columns, records).map_err(|e| PipelineError::parse(e.to_string()))?;
    debug!(target: "vaxboard::ingest", columns = table.columns().len(), rows = table.len(), "[CSV] parsed");
    Ok(table)
}
