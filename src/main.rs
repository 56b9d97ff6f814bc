use anyhow::Result;
use kariba_forecaster::{api, config, service, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }
    init_tracing();

    let cfg = Config::load()?;
    info!(csv = %cfg.data.lake_csv.display(), "loading lake history and training ensemble");

    let app_state = service::AppState::new(cfg.clone()).await?;
    let summary = app_state.lake.summary();
    info!(
        model_id = %summary.model_id,
        rows = summary.training_rows,
        intercept = summary.meta_weights.intercept,
        "ensemble ready"
    );

    let app = api::router(app_state.clone(), &cfg);
    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - the API will be reachable from the network");
    }

    info!(%addr, "starting Kariba forecaster");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
