use std::io::Write;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use vaxboard::config::Settings;
use vaxboard::ingest::Fetcher;
use vaxboard::pipeline::run_dashboard;
use vaxboard::sink::{ChartSink, JsonLinesSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging; stdout is reserved for chart output
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    let settings = Settings::from_env().with_args(&args);
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "vaxboard",
        "vaxboard starting: RUST_LOG='{}', dashboard={}, data_root='{}'",
        rust_log,
        settings.dashboard.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<bundled>".to_string()),
        settings.data_root.display()
    );

    let dashboard = settings.load_dashboard()?;
    let fetcher = Fetcher::new(&settings)?;
    let outcomes = run_dashboard(&fetcher, &dashboard).await;

    let stdout = std::io::stdout();
    let mut sink = JsonLinesSink::new(stdout.lock());
    for o in &outcomes {
        sink.deliver(o)?;
    }
    sink.into_inner().flush()?;

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(target: "vaxboard", charts = outcomes.len(), failed, "dashboard complete");
    if failed > 0 {
        anyhow::bail!("{} of {} charts failed", failed, outcomes.len());
    }
    Ok(())
}
