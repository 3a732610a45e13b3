//!
//! Chart pipelines
//! ---------------
//! Each dashboard chart is one `ChartSpec`: plain data naming its datasets, key columns,
//! grouping and statistic. Every spec runs the same stages (ingest, join/filter,
//! aggregate, reshape) and produces a `ChartOutput`.
//!
//! Specs only describe work; `super::run_chart` applies the degrade policy.

use std::collections::HashMap;

use futures_util::future::try_join;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::aggregate::{
    aggregate, box_stats_by, group_by, per_capita, period_deltas, reduce_per_year, GroupBy, GroupKey, Statistic,
};
use super::join::{filter_keys, index_first, join, latest_by, JoinedRow};
use super::reshape::{stack, BoxGroup, ChartData, ChartOutput, EntityRecord, StackedChart};
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::{load_table, DataSource, SourceSpec};
use crate::table::{format_number, parse_date, Row, Table, Value};

fn default_scale() -> f64 { 1.0 }
fn default_true() -> bool { true }
fn default_rate_label() -> String { "rate".to_string() }

/// Rows of `table` per value of `key_column`.
fn partition(table: &Table, key_column: &str) -> PipelineResult<HashMap<String, Table>> {
    let groups = group_by(table, &GroupBy::Category { column: key_column.to_string() })?;
    Ok(groups.into_iter().map(|g| (g.key.label(), g.rows)).collect())
}

/// Drop rows missing any of `columns`.
fn require_present(table: Table, columns: &[String]) -> PipelineResult<Table> {
    if columns.is_empty() {
        return Ok(table);
    }
    for c in columns {
        table.require_column(c)?;
    }
    table.filter(|r| columns.iter().all(|c| r.get(c).is_some_and(|v| !v.is_null())))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub members: Vec<String>,
}

/// Mean of each region's members' latest metric; a member without data counts as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalAverage {
    pub source: SourceSpec,
    pub key_column: String,
    #[serde(default)]
    pub date_column: Option<String>,
    pub metric: String,
    pub regions: Vec<Region>,
    #[serde(default)]
    pub statistic: Statistic,
}

impl RegionalAverage {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        table.require_column(&self.metric)?;
        let latest = latest_by(&table, &self.key_column, self.date_column.as_deref())?;
        let by_key = index_first(&latest, &self.key_column);
        let members: Vec<Vec<Value>> = self
            .regions
            .iter()
            .flat_map(|region| {
                region.members.iter().map(|m| {
                    let v = by_key.get(m.as_str()).and_then(|r| r.num(&self.metric)).unwrap_or(0.0);
                    vec![Value::from_text(&region.name), Value::Num(v)]
                })
            })
            .collect();
        let members = Table::from_records(["region", "value"], members)?;
        let per_region =
            aggregate(&members, &GroupBy::Category { column: "region".into() }, self.statistic, |r| r.num("value"))?;
        let mut chart = ChartData::new(self.regions.iter().map(|r| r.name.clone()).collect());
        let data = self
            .regions
            .iter()
            .map(|region| {
                per_region
                    .iter()
                    .find(|(k, _)| k.label() == region.name)
                    .and_then(|(_, v)| *v)
                    .unwrap_or(0.0)
            })
            .collect();
        chart.push(self.metric.clone(), data);
        Ok(ChartOutput::Series(chart))
    }
}

/// Latest metrics per entity (choropleth fill, proportional symbols). Missing metric
/// values become 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPerEntity {
    pub source: SourceSpec,
    pub key_column: String,
    #[serde(default)]
    pub date_column: Option<String>,
    pub metrics: Vec<String>,
    #[serde(default)]
    pub name_column: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    /// Rows missing any of these columns are left out before the latest row is picked.
    #[serde(default)]
    pub require: Vec<String>,
}

impl LatestPerEntity {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(ChartOutput::Records(Vec::new()));
        }
        for m in &self.metrics {
            table.require_column(m)?;
        }
        let table = match &self.allowed {
            Some(keys) => filter_keys(&table, &self.key_column, keys)?,
            None => table,
        };
        let table = require_present(table, &self.require)?;
        let latest = latest_by(&table, &self.key_column, self.date_column.as_deref())?;
        let records = latest
            .iter()
            .filter_map(|r| {
                let mut rec = EntityRecord::new(r.key(&self.key_column)?);
                for m in &self.metrics {
                    rec.values.insert(m.clone(), r.num(m).unwrap_or(0.0));
                }
                rec.name = self.name_column.as_deref().and_then(|c| r.key(c));
                Some(rec)
            })
            .collect();
        Ok(ChartOutput::Records(records))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub label: String,
    pub column: String,
    /// Column subtracted from `column` (e.g. vaccinated minus fully vaccinated).
    #[serde(default)]
    pub minus: Option<String>,
}

/// Per-date metrics of one entity, optionally as a stacked layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub source: SourceSpec,
    pub key_column: String,
    pub entity: String,
    pub date_column: String,
    pub series: Vec<SeriesSpec>,
    #[serde(default)]
    pub stacked: bool,
}

impl TimeSeries {
    fn empty(&self) -> ChartOutput {
        if self.stacked { ChartOutput::Stacked(StackedChart::default()) } else { ChartOutput::Series(ChartData::default()) }
    }

    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(self.empty());
        }
        table.require_columns(&[&self.key_column, &self.date_column])?;
        for s in &self.series {
            table.require_column(&s.column)?;
            if let Some(m) = &s.minus {
                table.require_column(m)?;
            }
        }
        let rows = table.rows();
        let mut points: Vec<(chrono::NaiveDate, &Row)> = rows
            .iter()
            .filter(|r| r.key(&self.key_column).as_deref() == Some(self.entity.as_str()))
            .filter_map(|r| r.str(&self.date_column).and_then(parse_date).map(|d| (d, r)))
            .collect();
        if points.is_empty() {
            warn!(target: "vaxboard::chart", entity = %self.entity, "no observations for entity");
            return Ok(self.empty());
        }
        points.sort_by_key(|(d, _)| *d);
        let mut chart = ChartData::new(points.iter().map(|(d, _)| d.format("%Y-%m-%d").to_string()).collect());
        for s in &self.series {
            let data = points
                .iter()
                .map(|(_, r)| {
                    let v = r.num(&s.column).unwrap_or(0.0);
                    match &s.minus {
                        Some(m) => (v - r.num(m).unwrap_or(0.0)).max(0.0),
                        None => v,
                    }
                })
                .collect();
            chart.push(s.label.clone(), data);
        }
        Ok(if self.stacked { ChartOutput::Stacked(stack(&chart)) } else { ChartOutput::Series(chart) })
    }
}

/// One side of a two-dataset chart: a table with a join key and an optional date column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSide {
    pub source: SourceSpec,
    pub key_column: String,
    #[serde(default)]
    pub date_column: Option<String>,
}

impl JoinSide {
    /// One row per key: the latest by date when a date column is configured.
    fn reduce(&self, table: &Table) -> PipelineResult<Table> {
        match &self.date_column {
            Some(dc) => latest_by(table, &self.key_column, Some(dc)),
            None => Ok(table.clone()),
        }
    }
}

/// Yearly increments of a cumulative counter per entity, for entities present in both
/// the snapshot and the series (deaths per year next to vaccination coverage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyDelta {
    pub snapshot: JoinSide,
    pub series: JoinSide,
    pub cumulative_column: String,
    pub entities: Vec<String>,
    pub years: Vec<i32>,
}

impl YearlyDelta {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let date_column = self
            .series
            .date_column
            .as_deref()
            .ok_or_else(|| PipelineError::config("yearly_delta series needs a date_column"))?;
        let (snapshot, series) =
            try_join(load_table(src, &self.snapshot.source), load_table(src, &self.series.source)).await?;
        if snapshot.is_empty() || series.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        series.require_column(&self.cumulative_column)?;
        let pairs = join(
            &self.snapshot.reduce(&snapshot)?,
            &self.series.reduce(&series)?,
            &self.snapshot.key_column,
            &self.series.key_column,
            &self.entities,
        )?;
        if pairs.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        let parts = partition(&series, &self.series.key_column)?;
        let mut chart = ChartData::new(self.years.iter().map(|y| y.to_string()).collect());
        for p in &pairs {
            let Some(part) = parts.get(&p.key) else { continue };
            let latest = reduce_per_year(part, date_column, &self.cumulative_column, &self.years, Statistic::Last)?;
            chart.push(p.key.clone(), period_deltas(&latest));
        }
        Ok(ChartOutput::Series(chart))
    }
}

/// A time-series side of a paired chart: which metric to average and how to label it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSide {
    #[serde(flatten)]
    pub side: JoinSide,
    pub metric: String,
    pub label: String,
}

/// Yearly means of one metric from each of two datasets, per entity (grouped bars).
/// Years without data are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedYearlyMean {
    pub left: MetricSide,
    pub right: MetricSide,
    pub entities: Vec<String>,
    pub years: Vec<i32>,
    #[serde(default)]
    pub statistic: Statistic,
}

impl PairedYearlyMean {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let (Some(ldate), Some(rdate)) = (self.left.side.date_column.as_deref(), self.right.side.date_column.as_deref()) else {
            return Err(PipelineError::config("paired_yearly_mean sides need a date_column"));
        };
        let (left, right) =
            try_join(load_table(src, &self.left.side.source), load_table(src, &self.right.side.source)).await?;
        if left.is_empty() || right.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        left.require_column(&self.left.metric)?;
        right.require_column(&self.right.metric)?;
        let pairs = join(
            &self.left.side.reduce(&left)?,
            &self.right.side.reduce(&right)?,
            &self.left.side.key_column,
            &self.right.side.key_column,
            &self.entities,
        )?;
        if pairs.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        let lparts = partition(&left, &self.left.side.key_column)?;
        let rparts = partition(&right, &self.right.side.key_column)?;

        let per_year = |part: Option<&Table>, date: &str, metric: &str| -> PipelineResult<Vec<f64>> {
            let empty = Table::empty();
            let reduced = reduce_per_year(part.unwrap_or(&empty), date, metric, &self.years, self.statistic)?;
            Ok(reduced.into_iter().map(|v| v.unwrap_or(0.0)).collect())
        };
        let mut lmeans: Vec<Vec<f64>> = Vec::with_capacity(pairs.len());
        let mut rmeans: Vec<Vec<f64>> = Vec::with_capacity(pairs.len());
        for p in &pairs {
            lmeans.push(per_year(lparts.get(&p.key), ldate, &self.left.metric)?);
            rmeans.push(per_year(rparts.get(&p.key), rdate, &self.right.metric)?);
        }
        let mut chart = ChartData::new(pairs.iter().map(|p| p.key.clone()).collect());
        for (yi, year) in self.years.iter().enumerate() {
            chart.push(format!("{} ({})", self.left.label, year), lmeans.iter().map(|m| m[yi]).collect());
            chart.push(format!("{} ({})", self.right.label, year), rmeans.iter().map(|m| m[yi]).collect());
        }
        Ok(ChartOutput::Series(chart))
    }
}

/// Mean per-capita rate per fixed-width band of another column (life expectancy bands).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandedRate {
    pub source: SourceSpec,
    pub band_column: String,
    pub width: f64,
    pub numerator: String,
    pub denominator: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_true")]
    pub positive_only: bool,
    #[serde(default = "default_rate_label")]
    pub label: String,
    /// Optional entity allow-list applied to `key_column` before banding.
    #[serde(default)]
    pub key_column: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    #[serde(default)]
    pub statistic: Statistic,
}

impl BandedRate {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        table.require_columns(&[&self.band_column, &self.numerator, &self.denominator])?;
        let table = match (&self.key_column, &self.allowed) {
            (Some(kc), Some(keys)) => filter_keys(&table, kc, keys)?,
            (None, Some(_)) => return Err(PipelineError::config("banded_rate allow-list needs a key_column")),
            _ => table,
        };
        let rate = |r: &Row| per_capita(r.num(&self.numerator), r.num(&self.denominator), self.scale);
        let base = if self.positive_only { table.filter(|r| rate(r) > 0.0)? } else { table };
        let by = GroupBy::Band { column: self.band_column.clone(), width: self.width };
        let bands = aggregate(&base, &by, self.statistic, |r| Some(rate(r)))?;
        let mut chart = ChartData::new(bands.iter().map(|(k, _)| k.label()).collect());
        chart.push(self.label.clone(), bands.iter().map(|(_, v)| v.unwrap_or(0.0)).collect());
        if chart.labels.is_empty() {
            return Ok(ChartOutput::Series(ChartData::default()));
        }
        Ok(ChartOutput::Series(chart))
    }
}

/// Box statistics of one column per fixed-width band of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxPlot {
    pub source: SourceSpec,
    pub band_column: String,
    pub width: f64,
    pub value_column: String,
    /// Rows missing any of these columns are left out before grouping.
    #[serde(default)]
    pub require: Vec<String>,
}

impl BoxPlot {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(ChartOutput::Boxes(Vec::new()));
        }
        table.require_columns(&[&self.band_column, &self.value_column])?;
        let kept = require_present(table, &self.require)?;
        let by = GroupBy::Band { column: self.band_column.clone(), width: self.width };
        let boxes = box_stats_by(&kept, &by, &self.value_column)?
            .into_iter()
            .filter_map(|b| {
                let GroupKey::Band(start) = b.key else { return None };
                Some(BoxGroup {
                    label: format!("{}-{}", format_number(start), format_number(start + self.width)),
                    stats: b.stats,
                    outliers: b.outliers,
                })
            })
            .collect();
        Ok(ChartOutput::Boxes(boxes))
    }
}

/// Latest per-capita rate per entity from a single dataset, plus extra metrics
/// (socioeconomic and gender/health factor charts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerCapita {
    pub source: SourceSpec,
    pub key_column: String,
    #[serde(default)]
    pub date_column: Option<String>,
    pub numerator: String,
    pub denominator: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub extra: Vec<String>,
    #[serde(default)]
    pub name_column: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub positive_only: bool,
    #[serde(default = "default_rate_label")]
    pub rate_label: String,
}

impl PerCapita {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(ChartOutput::Records(Vec::new()));
        }
        table.require_columns(&[&self.key_column, &self.numerator, &self.denominator])?;
        for c in &self.extra {
            table.require_column(c)?;
        }
        let table = match &self.allowed {
            Some(keys) => filter_keys(&table, &self.key_column, keys)?,
            None => table,
        };
        // Reduce over rows that carry a real rate, so a trailing row without data does
        // not hide an entity's last usable observation.
        let rated = if self.positive_only {
            table.filter(|r| per_capita(r.num(&self.numerator), r.num(&self.denominator), self.scale) > 0.0)?
        } else {
            table
        };
        let latest = latest_by(&rated, &self.key_column, self.date_column.as_deref())?;
        let mut records = Vec::with_capacity(latest.len());
        for r in &latest {
            let Some(key) = r.key(&self.key_column) else { continue };
            let mut rec = EntityRecord::new(key)
                .with_value(self.rate_label.clone(), per_capita(r.num(&self.numerator), r.num(&self.denominator), self.scale));
            for c in &self.extra {
                rec.values.insert(c.clone(), r.num(c).unwrap_or(0.0));
            }
            rec.name = self.name_column.as_deref().and_then(|c| r.key(c));
            records.push(rec);
        }
        Ok(ChartOutput::Records(records))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// A column on one side of a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub side: Side,
    pub column: String,
}

impl ColumnRef {
    pub fn left<S: Into<String>>(column: S) -> Self { ColumnRef { side: Side::Left, column: column.into() } }
    pub fn right<S: Into<String>>(column: S) -> Self { ColumnRef { side: Side::Right, column: column.into() } }

    fn row<'a>(&self, pair: &'a JoinedRow) -> &'a Row {
        match self.side {
            Side::Left => &pair.left,
            Side::Right => &pair.right,
        }
    }

    fn num(&self, pair: &JoinedRow) -> Option<f64> { self.row(pair).num(&self.column) }

    fn check(&self, left: &Table, right: &Table) -> PipelineResult<()> {
        match self.side {
            Side::Left => left.require_column(&self.column).map(|_| ()),
            Side::Right => right.require_column(&self.column).map(|_| ()),
        }
    }
}

/// Per-capita rate whose ingredients may come from two datasets joined by key, carrying
/// extra metrics from either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateJoin {
    pub left: JoinSide,
    pub right: JoinSide,
    pub numerator: ColumnRef,
    pub denominator: ColumnRef,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub extra: Vec<ColumnRef>,
    #[serde(default)]
    pub name: Option<ColumnRef>,
    /// Entities to keep, in output order. Defaults to every key of the left side.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub positive_only: bool,
    #[serde(default = "default_rate_label")]
    pub rate_label: String,
}

impl RateJoin {
    /// With `positive_only`, the rows of `side` whose own rate ingredients already rule
    /// out a positive rate are dropped, so reducing to the latest row per key lands on
    /// the latest row that can still be rated.
    fn rated(&self, side: Side, table: &Table) -> PipelineResult<Table> {
        let num = (self.numerator.side == side).then_some(self.numerator.column.as_str());
        let den = (self.denominator.side == side).then_some(self.denominator.column.as_str());
        if !self.positive_only || (num.is_none() && den.is_none()) {
            return Ok(table.clone());
        }
        table.filter(|r| {
            num.map_or(true, |c| r.num(c).is_some_and(|v| v * self.scale > 0.0))
                && den.map_or(true, |c| r.num(c).is_some_and(|v| v > 0.0))
        })
    }

    /// Join, compute rates and apply the `> 0` filter over already-loaded tables.
    pub fn records(&self, left: &Table, right: &Table) -> PipelineResult<Vec<EntityRecord>> {
        if left.is_empty() || right.is_empty() {
            return Ok(Vec::new());
        }
        self.numerator.check(left, right)?;
        self.denominator.check(left, right)?;
        for c in self.extra.iter().chain(self.name.iter()) {
            c.check(left, right)?;
        }
        let left = self.left.reduce(&self.rated(Side::Left, left)?)?;
        let right = self.right.reduce(&self.rated(Side::Right, right)?)?;
        let allowed: Vec<String> = match &self.allowed {
            Some(keys) => keys.clone(),
            None => {
                left.require_column(&self.left.key_column)?;
                left.iter().filter_map(|r| r.key(&self.left.key_column)).collect()
            }
        };
        let pairs = join(&left, &right, &self.left.key_column, &self.right.key_column, &allowed)?;
        let mut out = Vec::with_capacity(pairs.len());
        for p in &pairs {
            let rate = per_capita(self.numerator.num(p), self.denominator.num(p), self.scale);
            if self.positive_only && rate <= 0.0 {
                debug!(target: "vaxboard::chart", key = %p.key, "[RATE] excluded: no positive rate");
                continue;
            }
            let mut rec = EntityRecord::new(p.key.clone()).with_value(self.rate_label.clone(), rate);
            for c in &self.extra {
                rec.values.insert(c.column.clone(), c.num(p).unwrap_or(0.0));
            }
            rec.name = self.name.as_ref().and_then(|c| c.row(p).key(&c.column));
            out.push(rec);
        }
        Ok(out)
    }

    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let (left, right) = try_join(load_table(src, &self.left.source), load_table(src, &self.right.source)).await?;
        Ok(ChartOutput::Records(self.records(&left, &right)?))
    }
}

/// One record per (category, date) for an allow-list of categories (age-group heatmap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryHeatmap {
    pub source: SourceSpec,
    pub category_column: String,
    pub date_column: String,
    pub value_column: String,
    pub categories: Vec<String>,
}

impl CategoryHeatmap {
    async fn run<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        let table = load_table(src, &self.source).await?;
        if table.is_empty() {
            return Ok(ChartOutput::Records(Vec::new()));
        }
        table.require_columns(&[&self.category_column, &self.date_column, &self.value_column])?;
        let kept = filter_keys(&table, &self.category_column, &self.categories)?;
        let parts = partition(&kept, &self.category_column)?;
        let mut records = Vec::new();
        for cat in &self.categories {
            let Some(part) = parts.get(cat) else { continue };
            let mut dated: Vec<(chrono::NaiveDate, f64)> = part
                .iter()
                .filter_map(|r| r.str(&self.date_column).and_then(parse_date).map(|d| (d, r.num(&self.value_column).unwrap_or(0.0))))
                .collect();
            dated.sort_by_key(|(d, _)| *d);
            for (d, v) in dated {
                let mut rec = EntityRecord::new(cat.clone()).with_value(self.value_column.clone(), v);
                rec.group = Some(d.format("%Y-%m-%d").to_string());
                records.push(rec);
            }
        }
        Ok(ChartOutput::Records(records))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    RegionalAverage(RegionalAverage),
    LatestPerEntity(LatestPerEntity),
    TimeSeries(TimeSeries),
    YearlyDelta(YearlyDelta),
    PairedYearlyMean(PairedYearlyMean),
    BandedRate(BandedRate),
    BoxPlot(BoxPlot),
    PerCapita(PerCapita),
    RateJoin(RateJoin),
    CategoryHeatmap(CategoryHeatmap),
}

impl ChartSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ChartSpec::RegionalAverage(_) => "regional_average",
            ChartSpec::LatestPerEntity(_) => "latest_per_entity",
            ChartSpec::TimeSeries(_) => "time_series",
            ChartSpec::YearlyDelta(_) => "yearly_delta",
            ChartSpec::PairedYearlyMean(_) => "paired_yearly_mean",
            ChartSpec::BandedRate(_) => "banded_rate",
            ChartSpec::BoxPlot(_) => "box_plot",
            ChartSpec::PerCapita(_) => "per_capita",
            ChartSpec::RateJoin(_) => "rate_join",
            ChartSpec::CategoryHeatmap(_) => "category_heatmap",
        }
    }

    /// What the chart renders when its data could not be obtained.
    pub fn empty_output(&self) -> ChartOutput {
        match self {
            ChartSpec::TimeSeries(t) => t.empty(),
            ChartSpec::RegionalAverage(_)
            | ChartSpec::YearlyDelta(_)
            | ChartSpec::PairedYearlyMean(_)
            | ChartSpec::BandedRate(_) => ChartOutput::Series(ChartData::default()),
            ChartSpec::BoxPlot(_) => ChartOutput::Boxes(Vec::new()),
            ChartSpec::LatestPerEntity(_)
            | ChartSpec::PerCapita(_)
            | ChartSpec::RateJoin(_)
            | ChartSpec::CategoryHeatmap(_) => ChartOutput::Records(Vec::new()),
        }
    }

    pub async fn execute<D: DataSource>(&self, src: &D) -> PipelineResult<ChartOutput> {
        match self {
            ChartSpec::RegionalAverage(c) => c.run(src).await,
            ChartSpec::LatestPerEntity(c) => c.run(src).await,
            ChartSpec::TimeSeries(c) => c.run(src).await,
            ChartSpec::YearlyDelta(c) => c.run(src).await,
            ChartSpec::PairedYearlyMean(c) => c.run(src).await,
            ChartSpec::BandedRate(c) => c.run(src).await,
            ChartSpec::BoxPlot(c) => c.run(src).await,
            ChartSpec::PerCapita(c) => c.run(src).await,
            ChartSpec::RateJoin(c) => c.run(src).await,
            ChartSpec::CategoryHeatmap(c) => c.run(src).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedChart {
    pub name: String,
    pub chart: ChartSpec,
}

/// A set of independent charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub charts: Vec<NamedChart>,
}

impl Dashboard {
    pub fn from_json(text: &str) -> PipelineResult<Dashboard> {
        serde_json::from_str(text).map_err(|e| PipelineError::config(e.to_string()))
    }
}

#[cfg(test)]
#[path = "charts_tests.rs"]
mod charts_tests;
