//! Hand-off to the rendering side.
//!
//! A sink is an ordinary value owned by the caller; there is no global registry of live
//! charts. Redrawing a chart means handing its new output to the sink again.

use std::io::Write;

use anyhow::Result;

use crate::pipeline::{ChartOutcome, ChartOutput};

pub trait ChartSink {
    fn accept(&mut self, name: &str, output: &ChartOutput) -> Result<()>;

    /// Report a chart that produced no output because its pipeline failed.
    fn reject(&mut self, name: &str, error: &str) -> Result<()>;

    fn deliver(&mut self, outcome: &ChartOutcome) -> Result<()> {
        match (&outcome.output, &outcome.error) {
            (Some(out), _) => self.accept(&outcome.name, out),
            (None, Some(err)) => self.reject(&outcome.name, err),
            (None, None) => Ok(()),
        }
    }
}

/// Writes one JSON object per chart: `{"chart": name, "shape": .., "data": ..}` or
/// `{"chart": name, "error": ..}`.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self { Self { out } }

    pub fn into_inner(self) -> W { self.out }
}

impl<W: Write> ChartSink for JsonLinesSink<W> {
    fn accept(&mut self, name: &str, output: &ChartOutput) -> Result<()> {
        let mut v = serde_json::to_value(output)?;
        if let Some(obj) = v.as_object_mut() {
            obj.insert("chart".into(), serde_json::Value::String(name.to_string()));
        }
        serde_json::to_writer(&mut self.out, &v)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn reject(&mut self, name: &str, error: &str) -> Result<()> {
        serde_json::to_writer(&mut self.out, &serde_json::json!({"chart": name, "error": error}))?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}
