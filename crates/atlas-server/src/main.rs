//! Control-plane process bootstrap: load configuration, initialize
//! logging, wire the runtime graph, and idle until shutdown. No HTTP
//! router is built here — wiring a transport onto this core is left to
//! whichever binary embeds it.

mod config;
mod errors;
mod state;

use atlas_core::logging::{self, LogFormat};
use config::AppConfig;
use state::AppState;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    logging::init_logging(logging::LoggingConfig {
        level: config.logging.level.clone(),
        format: match config.logging.format.as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        },
        ..Default::default()
    })?;

    info!("starting atlas control plane");

    let state = AppState::new(config.clone()).await?;
    info!(
        bind = %format!("{}:{}", config.server.host, config.server.port),
        sagas_enabled = config.saga.sagas_enabled,
        "control plane ready"
    );

    // The bind address is reserved for whichever transport layer is
    // wired onto this core; until then, run until asked to stop.
    let _ = &state;
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    Ok(())
}
