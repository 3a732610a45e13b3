//! Chart-ready output shapes handed to the rendering sink.

use std::collections::BTreeMap;

use serde::Serialize;

use super::aggregate::BoxStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
}

/// Labels plus parallel numeric series, one value per label in each dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartData {
    pub fn new(labels: Vec<String>) -> Self { ChartData { labels, datasets: Vec::new() } }

    pub fn push<S: Into<String>>(&mut self, label: S, data: Vec<f64>) {
        debug_assert_eq!(data.len(), self.labels.len());
        self.datasets.push(Dataset { label: label.into(), data });
    }

    pub fn is_empty(&self) -> bool { self.labels.is_empty() || self.datasets.is_empty() }

    pub fn dataset(&self, label: &str) -> Option<&Dataset> { self.datasets.iter().find(|d| d.label == label) }
}

/// One entity (optionally per group) with named values; the map/heatmap form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub values: BTreeMap<String, f64>,
}

impl EntityRecord {
    pub fn new<S: Into<String>>(entity: S) -> Self {
        EntityRecord { entity: entity.into(), name: None, group: None, values: BTreeMap::new() }
    }

    pub fn with_value<S: Into<String>>(mut self, name: S, v: f64) -> Self {
        self.values.insert(name.into(), v);
        self
    }

    pub fn value(&self, name: &str) -> Option<f64> { self.values.get(name).copied() }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxGroup {
    pub label: String,
    pub stats: BoxStats,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedSeries {
    pub key: String,
    /// `[y0, y1]` per label: baseline and top of this layer.
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StackedChart {
    pub labels: Vec<String>,
    pub series: Vec<StackedSeries>,
}

/// Stack the datasets of `chart` on a zero baseline, in dataset order.
pub fn stack(chart: &ChartData) -> StackedChart {
    let mut baseline = vec![0.0; chart.labels.len()];
    let series = chart
        .datasets
        .iter()
        .map(|ds| {
            let points = baseline
                .iter_mut()
                .enumerate()
                .map(|(i, y0)| {
                    let y1 = *y0 + ds.data.get(i).copied().unwrap_or(0.0);
                    let p = [*y0, y1];
                    *y0 = y1;
                    p
                })
                .collect();
            StackedSeries { key: ds.label.clone(), points }
        })
        .collect();
    StackedChart { labels: chart.labels.clone(), series }
}

/// Result of one chart pipeline, tagged by shape for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum ChartOutput {
    Series(ChartData),
    Records(Vec<EntityRecord>),
    Boxes(Vec<BoxGroup>),
    Stacked(StackedChart),
}

impl ChartOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            ChartOutput::Series(c) => c.is_empty(),
            ChartOutput::Records(r) => r.is_empty(),
            ChartOutput::Boxes(b) => b.is_empty(),
            ChartOutput::Stacked(s) => s.series.is_empty() || s.labels.is_empty(),
        }
    }
}
