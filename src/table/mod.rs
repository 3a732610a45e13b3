//!
//! vaxboard table model
//! --------------------
//! In-memory tabular data shared by every pipeline stage. A `Table` wraps a polars
//! `DataFrame`: parsers build string columns, schemas cast declared columns, and the
//! aggregation and join stages run polars' lazy engine over the frame.
//!
//! Rows are a read-only view for per-record logic. Each `Row` carries every column of
//! its table, so a value missing in the source is `Value::Null`, never omitted.

use std::sync::Arc;

use polars::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{PipelineError, PipelineResult};

pub mod schema;

pub use schema::{parse_date, ColumnType, Field, Schema};

/// A single cell: a string, a number (after parse), or absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Num(f64),
    Str(String),
}

impl Value {
    /// Empty strings are treated as missing, the same way a blank CSV field is.
    pub fn from_text(s: &str) -> Value {
        if s.is_empty() { Value::Null } else { Value::Str(s.to_string()) }
    }

    /// Cell view of a polars value. Strings stay strings; every numeric type becomes `Num`.
    pub fn from_any(v: AnyValue<'_>) -> Value {
        match v {
            AnyValue::Null => Value::Null,
            AnyValue::String(s) => Value::from_text(s),
            AnyValue::StringOwned(s) => Value::from_text(s.as_str()),
            AnyValue::Boolean(b) => Value::Str(b.to_string()),
            AnyValue::Float64(n) => Value::Num(n),
            AnyValue::Float32(n) => Value::Num(n as f64),
            AnyValue::Int64(n) => Value::Num(n as f64),
            AnyValue::Int32(n) => Value::Num(n as f64),
            AnyValue::UInt64(n) => Value::Num(n as f64),
            AnyValue::UInt32(n) => Value::Num(n as f64),
            other => Value::from_text(&other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the cell. Strings are parsed; non-finite results count as missing.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Value::Num(n) => *n,
            Value::Str(s) => s.trim().parse::<f64>().ok()?,
            Value::Null => return None,
        };
        if v.is_finite() { Some(v) } else { None }
    }

    /// Text view of the cell, rendering numbers the way they were most likely written.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Str(s) => Some(s.clone()),
            Value::Num(n) => Some(format_number(*n)),
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 { format!("{}", n as i64) } else { format!("{}", n) }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Num(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// Cell `i` of `column`; out-of-range reads are null.
pub(crate) fn cell(column: &Column, i: usize) -> Value {
    column.get(i).map(Value::from_any).unwrap_or(Value::Null)
}

/// Ascending sort on `n` keys, nulls first, stable.
pub(crate) fn ascending(n: usize) -> SortMultipleOptions {
    SortMultipleOptions {
        descending: vec![false; n],
        nulls_last: vec![false; n],
        maintain_order: true,
        multithreaded: true,
        limit: None,
    }
}

/// Build one column from cells. A column holding only numbers (and nulls) becomes
/// Float64; anything else becomes a String column with numbers rendered as text.
fn column_from_values(name: &str, values: Vec<Value>) -> Column {
    let has_num = values.iter().any(|v| matches!(v, Value::Num(_)));
    let has_str = values.iter().any(|v| matches!(v, Value::Str(_)));
    if has_num && !has_str {
        let data: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Value::Num(n) => Some(*n),
                _ => None,
            })
            .collect();
        Series::new(name.into(), data).into()
    } else {
        let data: Vec<Option<String>> = values.iter().map(Value::to_text).collect();
        Series::new(name.into(), data).into()
    }
}

/// One record of a table, keyed by the table's column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] { &self.columns }

    pub fn values(&self) -> &[Value] { &self.values }

    /// Cell for `column`, or `None` when the table has no such column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn str(&self, column: &str) -> Option<&str> { self.get(column).and_then(Value::as_str) }

    pub fn num(&self, column: &str) -> Option<f64> { self.get(column).and_then(Value::as_f64) }

    /// Text of a key-like column; numeric keys are rendered without a trailing `.0`.
    pub fn key(&self, column: &str) -> Option<String> { self.get(column).and_then(Value::to_text) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|c| c.as_str()).zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A dataframe plus its column names in order.
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
    columns: Arc<[String]>,
}

impl Default for Table {
    fn default() -> Self { Table::empty() }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool { self.columns == other.columns && self.rows() == other.rows() }
}

impl Table {
    /// A table with neither columns nor rows; what a degraded source yields.
    pub fn empty() -> Self { Table::from_frame(DataFrame::empty()) }

    pub fn from_frame(frame: DataFrame) -> Self {
        let columns: Vec<String> = frame.get_column_names().iter().map(|c| c.to_string()).collect();
        Table { frame, columns: columns.into() }
    }

    /// Build a table from positional records. Short records are padded with nulls and
    /// extra trailing values are dropped, so every row matches the header.
    pub fn from_records<I, S>(columns: I, records: Vec<Vec<Value>>) -> PipelineResult<Table>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut cells: Vec<Vec<Value>> = names.iter().map(|_| Vec::with_capacity(records.len())).collect();
        for mut record in records {
            record.resize(names.len(), Value::Null);
            for (slot, v) in cells.iter_mut().zip(record) {
                slot.push(v);
            }
        }
        let cols: Vec<Column> = names.iter().zip(cells).map(|(n, vals)| column_from_values(n, vals)).collect();
        Ok(Table::from_frame(DataFrame::new(cols)?))
    }

    pub fn frame(&self) -> &DataFrame { &self.frame }

    pub fn into_frame(self) -> DataFrame { self.frame }

    pub fn columns(&self) -> &[String] { &self.columns }

    /// Materialize every row, in frame order.
    pub fn rows(&self) -> Vec<Row> {
        let cols = self.frame.get_columns();
        (0..self.frame.height())
            .map(|i| Row { columns: Arc::clone(&self.columns), values: cols.iter().map(|c| cell(c, i)).collect() })
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Row> { self.rows().into_iter() }

    pub fn len(&self) -> usize { self.frame.height() }

    pub fn is_empty(&self) -> bool { self.frame.height() == 0 }

    pub fn has_column(&self, column: &str) -> bool { self.columns.iter().any(|c| c == column) }

    pub fn require_column(&self, column: &str) -> PipelineResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| PipelineError::schema(column))
    }

    pub fn require_columns(&self, columns: &[&str]) -> PipelineResult<()> {
        for c in columns {
            self.require_column(c)?;
        }
        Ok(())
    }

    /// Narrow the table to `columns`, in the given order. Duplicates are kept once.
    pub fn select(&self, columns: &[&str]) -> PipelineResult<Table> {
        let mut names: Vec<&str> = Vec::with_capacity(columns.len());
        for c in columns {
            self.require_column(c)?;
            if !names.contains(c) {
                names.push(c);
            }
        }
        Ok(Table::from_frame(self.frame.select(names)?))
    }

    /// Rows for which `keep` returns true, in their original order.
    pub fn filter<F>(&self, mut keep: F) -> PipelineResult<Table>
    where
        F: FnMut(&Row) -> bool,
    {
        let mask: Vec<bool> = self.rows().iter().map(|r| keep(r)).collect();
        let mask = Series::new("mask".into(), mask);
        Ok(Table::from_frame(self.frame.filter(mask.bool()?)?))
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;
    fn into_iter(self) -> Self::IntoIter { self.iter() }
}
