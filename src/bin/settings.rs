use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use voicebridge::adapters::{list_input_devices, JsonConfigStore};
use voicebridge::client::HttpApiClient;
use voicebridge::domain::AppConfig;
use voicebridge::infrastructure::init_logging;
use voicebridge::ports::ConfigStore;
use voicebridge::settings::{router, SettingsState};

const SETTINGS_PORT_ENV: &str = "VOICEBRIDGE_SETTINGS_PORT";
const DEFAULT_SETTINGS_PORT: u16 = 5555;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = JsonConfigStore::new().context("failed to locate the configuration directory")?;
    let _log_guard = init_logging(&store.logs_dir(), "info", false)?;

    let config = store.load().unwrap_or_else(|_| AppConfig::default());
    let api = HttpApiClient::for_port(config.server_port, config.auth_key.clone())
        .context("failed to build the service client")?;

    let state = SettingsState::new(
        Arc::new(store),
        Arc::new(api),
        Arc::new(list_input_devices),
    );

    let port = match env::var(SETTINGS_PORT_ENV) {
        Ok(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("{SETTINGS_PORT_ENV} is not a valid port: {raw}"))?,
        Err(_) => DEFAULT_SETTINGS_PORT,
    };
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Settings application listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
