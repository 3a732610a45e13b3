//! Grouping and summary statistics.
//!
//! Rows are keyed in Rust (year of a date, numeric band, raw category) and the keyed
//! frame is reduced with polars' lazy `group_by`/`agg`. Ordinal keys (years, bands) come
//! back ascending, categories in first-appearance order.
//!
//! Zero-fill is the uniform convention: an empty group averages to 0, a rate without a
//! usable population is 0, and a missing period contributes a 0 delta. Charts stay
//! renderable instead of showing gaps.

use std::collections::HashMap;

use chrono::Datelike;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineResult;
use crate::table::{ascending, cell, format_number, parse_date, Row, Table};

const GROUP: &str = "__group";
const ORD: &str = "__ord";
const DATE: &str = "__date";
const ROW: &str = "__row";
const SEEN: &str = "__seen";
const VALUE: &str = "__value";

/// How rows are partitioned before reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum GroupBy {
    /// Calendar year of a date column.
    Year { column: String },
    /// Fixed-width numeric band `[k, k + width)` with `k = floor(v / width) * width`.
    Band { column: String, width: f64 },
    /// Raw value of a column.
    Category { column: String },
}

impl GroupBy {
    pub fn column(&self) -> &str {
        match self {
            GroupBy::Year { column } | GroupBy::Band { column, .. } | GroupBy::Category { column } => column,
        }
    }

    fn key_of(&self, row: &Row) -> Option<GroupKey> {
        match self {
            GroupBy::Year { column } => row.str(column).and_then(parse_date).map(|d| GroupKey::Year(d.year())),
            GroupBy::Band { column, width } => row.num(column).map(|v| GroupKey::Band(bucket(v, *width))),
            GroupBy::Category { column } => row.key(column).map(GroupKey::Category),
        }
    }

    /// Day number used to order rows inside a year group; other groupings keep row order.
    fn day_of(&self, row: &Row) -> Option<i32> {
        match self {
            GroupBy::Year { column } => row.str(column).and_then(parse_date).map(|d| d.num_days_from_ce()),
            _ => None,
        }
    }
}

/// Lower bound of the half-open bucket containing `v`.
pub fn bucket(v: f64, width: f64) -> f64 {
    if width <= 0.0 { v } else { (v / width).floor() * width }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    Year(i32),
    Band(f64),
    Category(String),
}

impl GroupKey {
    pub fn label(&self) -> String {
        match self {
            GroupKey::Year(y) => y.to_string(),
            GroupKey::Band(b) => format_number(*b),
            GroupKey::Category(c) => c.clone(),
        }
    }

    fn ordinal(&self) -> Option<f64> {
        match self {
            GroupKey::Year(y) => Some(*y as f64),
            GroupKey::Band(b) => Some(*b),
            GroupKey::Category(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: GroupKey,
    pub rows: Table,
}

/// Reductions selectable from chart configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    #[default]
    Mean,
    Sum,
    Count,
    /// Last present value; within a year group the one with the latest date.
    Last,
}

impl Statistic {
    fn expr(&self, value: Expr) -> Expr {
        match self {
            Statistic::Mean => value.mean(),
            Statistic::Sum => value.sum(),
            Statistic::Count => value.count().cast(DataType::Float64),
            Statistic::Last => value.drop_nulls().last(),
        }
    }
}

/// Helper columns assigning every row of a table to its group.
struct Keyed {
    columns: Vec<Column>,
    labels: Vec<Option<String>>,
    values: Vec<Option<f64>>,
    keys: HashMap<String, GroupKey>,
}

fn keyed<F>(table: &Table, by: &GroupBy, value: F) -> Keyed
where
    F: Fn(&Row) -> Option<f64>,
{
    let rows = table.rows();
    let mut labels: Vec<Option<String>> = Vec::with_capacity(rows.len());
    let mut ords: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut days: Vec<Option<i32>> = Vec::with_capacity(rows.len());
    let mut values: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut keys: HashMap<String, GroupKey> = HashMap::new();
    for r in &rows {
        match by.key_of(r) {
            Some(k) => {
                let label = k.label();
                ords.push(k.ordinal());
                keys.entry(label.clone()).or_insert(k);
                labels.push(Some(label));
            }
            None => {
                ords.push(None);
                labels.push(None);
            }
        }
        days.push(by.day_of(r));
        values.push(value(r));
    }
    let ids: Vec<i64> = (0..rows.len() as i64).collect();
    let columns = vec![
        Series::new(GROUP.into(), labels.clone()).into(),
        Series::new(ORD.into(), ords).into(),
        Series::new(DATE.into(), days).into(),
        Series::new(ROW.into(), ids).into(),
        Series::new(VALUE.into(), values.clone()).into(),
    ];
    Keyed { columns, labels, values, keys }
}

/// Run `aggs` per group over the keyed frame. The output has one row per group, ordered
/// by ordinal key and then by first appearance.
fn summarize(keyed: &Keyed, aggs: Vec<Expr>) -> PipelineResult<DataFrame> {
    let mut exprs = aggs;
    exprs.push(col(ORD).first().alias(ORD));
    exprs.push(col(ROW).min().alias(SEEN));
    let out = DataFrame::new(keyed.columns.clone())?
        .sort([DATE, ROW], ascending(2))?
        .lazy()
        .filter(col(GROUP).is_not_null())
        .group_by([col(GROUP)])
        .agg(exprs)
        .collect()?;
    Ok(out.sort([ORD, SEEN], ascending(2))?)
}

fn group_key(out: &DataFrame, keyed: &Keyed, i: usize) -> PipelineResult<Option<(String, GroupKey)>> {
    let Some(label) = cell(out.column(GROUP)?, i).to_text() else { return Ok(None) };
    Ok(keyed.keys.get(&label).cloned().map(|k| (label, k)))
}

fn number(out: &DataFrame, column: &str, i: usize) -> PipelineResult<Option<f64>> {
    Ok(cell(out.column(column)?, i).as_f64())
}

/// Partition `table` by `by`. Rows whose group value is missing or does not parse are
/// left out; rows keep their order inside a group.
pub fn group_by(table: &Table, by: &GroupBy) -> PipelineResult<Vec<Group>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    table.require_column(by.column())?;
    let keyed = keyed(table, by, |_| None);
    let order = summarize(&keyed, Vec::new())?;
    let frame = table.frame().hstack(&keyed.columns)?;
    let originals: Vec<Expr> = table.columns().iter().map(|c| col(c.as_str())).collect();
    let mut groups = Vec::with_capacity(order.height());
    for i in 0..order.height() {
        let Some((label, key)) = group_key(&order, &keyed, i)? else { continue };
        let rows = frame
            .clone()
            .lazy()
            .filter(col(GROUP).eq(lit(label.as_str())))
            .select(originals.clone())
            .collect()?;
        groups.push(Group { key, rows: Table::from_frame(rows) });
    }
    let skipped = keyed.labels.iter().filter(|l| l.is_none()).count();
    debug!(target: "vaxboard::aggregate", groups = groups.len(), skipped, "[GROUP] partitioned");
    Ok(groups)
}

/// `stat` over the values `value` extracts from each row, per group of `by`.
///
/// A group whose rows carry no value reduces to `None` for `Mean` and `Last` and to 0
/// for `Sum` and `Count`; callers decide how to fill.
pub fn aggregate<F>(table: &Table, by: &GroupBy, stat: Statistic, value: F) -> PipelineResult<Vec<(GroupKey, Option<f64>)>>
where
    F: Fn(&Row) -> Option<f64>,
{
    if table.is_empty() {
        return Ok(Vec::new());
    }
    table.require_column(by.column())?;
    let keyed = keyed(table, by, value);
    let out = summarize(&keyed, vec![stat.expr(col(VALUE)).alias(VALUE)])?;
    let mut result = Vec::with_capacity(out.height());
    for i in 0..out.height() {
        let Some((_, key)) = group_key(&out, &keyed, i)? else { continue };
        result.push((key, number(&out, VALUE, i)?));
    }
    debug!(target: "vaxboard::aggregate", groups = result.len(), ?stat, "[AGG] reduced");
    Ok(result)
}

/// `stat` of `value_column` for each of `years`, grouping on the year of `date_column`.
/// Years without rows are `None`.
pub fn reduce_per_year(
    table: &Table,
    date_column: &str,
    value_column: &str,
    years: &[i32],
    stat: Statistic,
) -> PipelineResult<Vec<Option<f64>>> {
    if table.is_empty() {
        return Ok(vec![None; years.len()]);
    }
    table.require_column(value_column)?;
    let by = GroupBy::Year { column: date_column.to_string() };
    let per_year = aggregate(table, &by, stat, |r| r.num(value_column))?;
    Ok(years
        .iter()
        .map(|y| per_year.iter().find(|(k, _)| *k == GroupKey::Year(*y)).and_then(|(_, v)| *v))
        .collect())
}

/// Per-period increments of an already-cumulative series.
///
/// Each output is `latest(period) - latest(previous period)`, starting from 0. Negative
/// increments (downward data corrections) clamp to 0. A period without an observation
/// (`None`) yields 0 and carries the previous cumulative value forward.
pub fn period_deltas(latest: &[Option<f64>]) -> Vec<f64> {
    let mut previous = 0.0;
    latest
        .iter()
        .map(|v| match v {
            Some(cur) => {
                let d = cur - previous;
                previous = *cur;
                d.max(0.0)
            }
            None => 0.0,
        })
        .collect()
}

/// `raw / population * scale`, or 0 when either input is missing or population is not positive.
pub fn per_capita(raw: Option<f64>, population: Option<f64>, scale: f64) -> f64 {
    match (raw, population) {
        (Some(r), Some(p)) if p > 0.0 => {
            let v = r / p * scale;
            if v.is_finite() { v } else { 0.0 }
        }
        _ => 0.0,
    }
}

/// Five-number summary with clipped Tukey fences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxStats {
    pub min: f64,
    pub lower_fence: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_fence: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl BoxStats {
    /// Values of `values` lying outside the fences.
    pub fn outliers(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .copied()
            .filter(|v| *v < self.lower_fence || *v > self.upper_fence)
            .collect()
    }
}

/// One box of a box plot: its group, summary and the values beyond its fences.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBox {
    pub key: GroupKey,
    pub stats: BoxStats,
    pub outliers: Vec<f64>,
}

fn box_exprs() -> Vec<Expr> {
    let v = || col(VALUE);
    vec![
        v().min().alias("min"),
        v().quantile(lit(0.25), QuantileMethod::Linear).alias("q1"),
        v().quantile(lit(0.5), QuantileMethod::Linear).alias("median"),
        v().quantile(lit(0.75), QuantileMethod::Linear).alias("q3"),
        v().max().alias("max"),
        v().mean().alias("mean"),
        v().count().cast(DataType::Int64).alias("count"),
    ]
}

/// Quartiles, fences and outliers of `value_column` per group of `by`.
///
/// Quartiles interpolate linearly at position `(n - 1) * p`. Fences sit at
/// `Q1 - 1.5 * IQR` and `Q3 + 1.5 * IQR` but never beyond the observed minimum and
/// maximum. Groups without a finite value produce no box.
pub fn box_stats_by(table: &Table, by: &GroupBy, value_column: &str) -> PipelineResult<Vec<GroupBox>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    table.require_columns(&[by.column(), value_column])?;
    let keyed = keyed(table, by, |r| r.num(value_column));
    let out = summarize(&keyed, box_exprs())?;
    let mut boxes = Vec::with_capacity(out.height());
    for i in 0..out.height() {
        let Some((label, key)) = group_key(&out, &keyed, i)? else { continue };
        let count = number(&out, "count", i)?.unwrap_or(0.0) as usize;
        let (Some(min), Some(q1), Some(median), Some(q3), Some(max)) = (
            number(&out, "min", i)?,
            number(&out, "q1", i)?,
            number(&out, "median", i)?,
            number(&out, "q3", i)?,
            number(&out, "max", i)?,
        ) else {
            continue;
        };
        if count == 0 {
            continue;
        }
        let iqr = q3 - q1;
        let stats = BoxStats {
            min,
            lower_fence: (q1 - 1.5 * iqr).max(min),
            q1,
            median,
            q3,
            upper_fence: (q3 + 1.5 * iqr).min(max),
            max,
            mean: number(&out, "mean", i)?.unwrap_or(0.0),
            count,
        };
        let members: Vec<f64> = keyed
            .labels
            .iter()
            .zip(&keyed.values)
            .filter(|(l, _)| l.as_deref() == Some(label.as_str()))
            .filter_map(|(_, v)| *v)
            .collect();
        boxes.push(GroupBox { key, outliers: stats.outliers(&members), stats });
    }
    debug!(target: "vaxboard::aggregate", boxes = boxes.len(), "[BOX] summarized");
    Ok(boxes)
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod aggregate_tests;
