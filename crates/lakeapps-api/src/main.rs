//! Binary entrypoint for the Lakeapps API server.
use anyhow::Context;
use lakeapps_api::{run, AppState};
use lakeapps_core::Settings;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LAKEAPPS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::load()
        .map_err(anyhow::Error::msg)
        .context("failed to load configuration")?;
    if settings.host.is_none() {
        tracing::warn!("DATABRICKS_HOST is not set; platform calls will report a configuration error");
    }

    let state = AppState::new(settings).context("failed to create metrics registry")?;
    run(state).await
}
