//! Key joins and entity filters.
//!
//! Every join drops an entity that is missing on either side: incomplete pairs are never
//! represented with nulls. The drop is logged at debug level and is not an error.

use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use tracing::debug;

use crate::error::PipelineResult;
use crate::table::{ascending, cell, parse_date, Row, Table};
use crate::tprintln;

const KEY: &str = "__key";
const DATE: &str = "__date";
const ROW: &str = "__row";
const FIRST: &str = "__first";
const ORDER: &str = "__order";
const LEFT_ROW: &str = "__left_row";
const RIGHT_ROW: &str = "__right_row";

/// One entity present on both sides of a join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub key: String,
    pub left: Row,
    pub right: Row,
}

/// First row per key value.
pub(crate) fn index_first(table: &Table, key_column: &str) -> HashMap<String, Row> {
    let mut idx: HashMap<String, Row> = HashMap::with_capacity(table.len());
    for r in table {
        if let Some(k) = r.key(key_column) {
            idx.entry(k).or_insert(r);
        }
    }
    idx
}

/// `(key, row index)` of the first row of every key in `rows`, as a frame for joining.
fn first_rows(rows: &[Row], key_column: &str, row_column: &str) -> PipelineResult<DataFrame> {
    let keys: Vec<Option<String>> = rows.iter().map(|r| r.key(key_column)).collect();
    let ids: Vec<i64> = (0..rows.len() as i64).collect();
    let frame = DataFrame::new(vec![Series::new(KEY.into(), keys).into(), Series::new(row_column.into(), ids).into()])?;
    Ok(frame
        .lazy()
        .filter(col(KEY).is_not_null())
        .group_by([col(KEY)])
        .agg([col(row_column).min()])
        .collect()?)
}

fn index_at(frame: &DataFrame, column: &str, i: usize) -> PipelineResult<Option<usize>> {
    Ok(cell(frame.column(column)?, i).as_f64().map(|v| v as usize))
}

/// Pair rows of `left` and `right` for every key in `allowed`.
///
/// When a side holds several rows for one key the first one wins, so time series should
/// be reduced with [`latest_by`] beforehand. Output order follows `allowed`; repeated
/// allow-list entries are emitted once.
pub fn join<S: AsRef<str>>(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: &str,
    allowed: &[S],
) -> PipelineResult<Vec<JoinedRow>> {
    if left.is_empty() || right.is_empty() {
        debug!(target: "vaxboard::join", left_rows = left.len(), right_rows = right.len(), "[JOIN] empty side, nothing to pair");
        return Ok(Vec::new());
    }
    left.require_column(left_key)?;
    right.require_column(right_key)?;
    let mut seen: HashSet<&str> = HashSet::new();
    let wanted: Vec<String> = allowed
        .iter()
        .map(|k| k.as_ref())
        .filter(|k| seen.insert(*k))
        .map(str::to_string)
        .collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    let lrows = left.rows();
    let rrows = right.rows();
    let order: Vec<i64> = (0..wanted.len() as i64).collect();
    let allow = DataFrame::new(vec![Series::new(KEY.into(), wanted.clone()).into(), Series::new(ORDER.into(), order).into()])?;
    let paired = allow
        .join(&first_rows(&lrows, left_key, LEFT_ROW)?, [KEY], [KEY], JoinType::Inner.into(), None)?
        .join(&first_rows(&rrows, right_key, RIGHT_ROW)?, [KEY], [KEY], JoinType::Inner.into(), None)?
        .sort([ORDER], ascending(1))?;

    let mut out: Vec<JoinedRow> = Vec::with_capacity(paired.height());
    for i in 0..paired.height() {
        let Some(key) = cell(paired.column(KEY)?, i).to_text() else { continue };
        let (Some(l), Some(r)) = (index_at(&paired, LEFT_ROW, i)?, index_at(&paired, RIGHT_ROW, i)?) else { continue };
        let (Some(left), Some(right)) = (lrows.get(l), rrows.get(r)) else { continue };
        out.push(JoinedRow { key, left: left.clone(), right: right.clone() });
    }
    let paired_keys: HashSet<&str> = out.iter().map(|p| p.key.as_str()).collect();
    for k in wanted.iter().filter(|k| !paired_keys.contains(k.as_str())) {
        debug!(target: "vaxboard::join", key = %k, "[JOIN] dropping incomplete entity");
    }
    tprintln!("[JOIN] allowed={} paired={}", allowed.len(), out.len());
    Ok(out)
}

/// Keep only rows whose `key_column` value is in `allowed`.
pub fn filter_keys<S: AsRef<str>>(table: &Table, key_column: &str, allowed: &[S]) -> PipelineResult<Table> {
    if table.is_empty() {
        return Ok(table.clone());
    }
    table.require_column(key_column)?;
    let set: HashSet<&str> = allowed.iter().map(|s| s.as_ref()).collect();
    table.filter(|r| r.key(key_column).map(|k| set.contains(k.as_str())).unwrap_or(false))
}

/// Reduce a time series to one row per key.
///
/// Rows are sorted by parsed date (undated rows first) and then by position, and the
/// last row of every key wins: the latest dated row, ties going to the later row. Rows
/// with a missing or malformed date only win when a key has no dated row, and without a
/// date column the last row per key wins. Keys keep their first-appearance order and
/// rows without a key are dropped.
pub fn latest_by(table: &Table, key_column: &str, date_column: Option<&str>) -> PipelineResult<Table> {
    if table.is_empty() {
        return Ok(table.clone());
    }
    table.require_column(key_column)?;
    if let Some(dc) = date_column {
        table.require_column(dc)?;
    }
    let rows = table.rows();
    let keys: Vec<Option<String>> = rows.iter().map(|r| r.key(key_column)).collect();
    let days: Vec<Option<i32>> = rows
        .iter()
        .map(|r| date_column.and_then(|dc| r.str(dc)).and_then(parse_date).map(|d| chrono::Datelike::num_days_from_ce(&d)))
        .collect();
    let ids: Vec<i64> = (0..rows.len() as i64).collect();
    let keyed = table.frame().hstack(&[
        Series::new(KEY.into(), keys).into(),
        Series::new(DATE.into(), days).into(),
        Series::new(ROW.into(), ids).into(),
    ])?;

    let originals: Vec<Expr> = table.columns().iter().map(|c| col(c.as_str())).collect();
    let mut aggs: Vec<Expr> = originals.iter().map(|e| e.clone().last()).collect();
    aggs.push(col(ROW).min().alias(FIRST));
    let reduced = keyed
        .sort([DATE, ROW], ascending(2))?
        .lazy()
        .filter(col(KEY).is_not_null())
        .group_by([col(KEY)])
        .agg(aggs)
        .sort_by_exprs([col(FIRST)], ascending(1))
        .select(originals)
        .collect()?;
    debug!(target: "vaxboard::join", input = table.len(), keys = reduced.height(), "[LATEST] reduced");
    Ok(Table::from_frame(reduced))
}

#[cfg(test)]
#[path = "join_tests.rs"]
mod join_tests;
