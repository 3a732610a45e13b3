use chrono::NaiveDate;
use polars::prelude::{Column, DataType, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{cell, Table, Value};
use crate::error::PipelineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Float64,
    Int64,
    Date,
}

/// Parse the leading `YYYY-MM-DD` of a date or timestamp string.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: ColumnType,
}

/// Declared columns of one dataset. Columns present in the data but not declared are
/// passed through untouched; declared columns must exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self { Schema::default() }

    pub fn field<S: Into<String>>(mut self, name: S, dtype: ColumnType) -> Self {
        self.fields.push(Field { name: name.into(), dtype });
        self
    }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Validate `table` against the declared fields and cast their columns.
    ///
    /// A table without any columns comes from a degraded source and is returned as is;
    /// the chart renders empty instead of failing on a schema it never received.
    pub fn apply(&self, table: Table) -> PipelineResult<Table> {
        if table.columns().is_empty() {
            return Ok(table);
        }
        for f in &self.fields {
            table.require_column(&f.name)?;
        }
        debug!(target: "vaxboard::schema", fields = self.fields.len(), rows = table.len(), "[SCHEMA] apply");
        let mut frame = table.into_frame();
        for f in &self.fields {
            let cast = coerce(frame.column(&f.name)?, f.dtype)?;
            frame.with_column(cast)?;
        }
        Ok(Table::from_frame(frame))
    }
}

/// Numeric casts are non-strict: text that does not parse becomes null.
fn coerce(column: &Column, dtype: ColumnType) -> PipelineResult<Column> {
    Ok(match dtype {
        ColumnType::Float64 => column.cast(&DataType::Float64)?,
        ColumnType::Int64 => column.cast(&DataType::Float64)?.cast(&DataType::Int64)?,
        ColumnType::String => rewrite(column, |v| v.to_text()),
        ColumnType::Date => rewrite(column, |v| {
            v.as_str().and_then(parse_date).map(|d| d.format("%Y-%m-%d").to_string())
        }),
    })
}

fn rewrite<F>(column: &Column, f: F) -> Column
where
    F: Fn(Value) -> Option<String>,
{
    let data: Vec<Option<String>> = (0..column.len()).map(|i| f(cell(column, i))).collect();
    Series::new(column.name().clone(), data).into()
}
