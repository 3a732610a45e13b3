//!
//! vaxboard pipeline
//! -----------------
//! Stages shared by every chart: key joins and filters (`join`), grouping and statistics
//! (`aggregate`), output shapes (`reshape`) and the per-chart configurations that wire
//! them together (`charts`).
//!
//! Error policy at the chart boundary: fetch and parse failures degrade the chart to
//! its empty output with a logged warning; schema and configuration errors propagate.
//! Charts of a dashboard run concurrently and never share mutable state, so one failing
//! chart leaves its siblings untouched.

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PipelineResult;
use crate::ingest::DataSource;

pub mod aggregate;
pub mod charts;
pub mod join;
pub mod reshape;

pub use charts::{ChartSpec, Dashboard, NamedChart};
pub use reshape::{ChartData, ChartOutput, Dataset, EntityRecord};

/// Run one chart, downgrading data-availability failures to an empty output.
pub async fn run_chart<D: DataSource>(source: &D, name: &str, spec: &ChartSpec) -> PipelineResult<ChartOutput> {
    debug!(target: "vaxboard::chart", chart = name, kind = spec.kind(), "[CHART] start");
    match spec.execute(source).await {
        Ok(out) => {
            debug!(target: "vaxboard::chart", chart = name, empty = out.is_empty(), "[CHART] done");
            Ok(out)
        }
        Err(e) if e.is_degradable() => {
            warn!(target: "vaxboard::chart", chart = name, code = e.code_str(), error = %e, "chart data unavailable, rendering empty");
            Ok(spec.empty_output())
        }
        Err(e) => Err(e),
    }
}

/// Result of one chart of a dashboard run.
#[derive(Debug, Clone, Serialize)]
pub struct ChartOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ChartOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChartOutcome {
    fn from_result(name: &str, res: PipelineResult<ChartOutput>) -> Self {
        match res {
            Ok(out) => ChartOutcome { name: name.to_string(), output: Some(out), error: None },
            Err(e) => ChartOutcome { name: name.to_string(), output: None, error: Some(e.to_string()) },
        }
    }

    pub fn is_ok(&self) -> bool { self.error.is_none() }
}

/// Run every chart of `dashboard` concurrently. Outcomes keep the dashboard order.
pub async fn run_dashboard<D: DataSource>(source: &D, dashboard: &Dashboard) -> Vec<ChartOutcome> {
    let runs = dashboard.charts.iter().map(|c| async move {
        let res = run_chart(source, &c.name, &c.chart).await;
        if let Err(e) = &res {
            warn!(target: "vaxboard::chart", chart = %c.name, code = e.code_str(), error = %e, "chart failed");
        }
        ChartOutcome::from_result(&c.name, res)
    });
    join_all(runs).await
}
