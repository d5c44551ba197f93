//! Local settings application: a small HTTP surface over the configuration
//! store, with best-effort propagation to a running transcription service.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{AppConfig, ConfigPatch, DomainError};
use crate::ports::{AudioDevice, ConfigStore, TranscriptionApi};
use crate::server::routes::ApiError;

type DeviceLister = dyn Fn() -> Result<Vec<AudioDevice>, DomainError> + Send + Sync;

/// How the running service relates to the configuration just saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// The service accepted the new configuration.
    Running,
    /// The service is up but must be restarted to apply the change.
    RestartNeeded,
    /// No service answered on the configured port.
    NotRunning,
}

#[derive(Clone)]
pub struct SettingsState {
    store: Arc<dyn ConfigStore>,
    api: Arc<dyn TranscriptionApi>,
    devices: Arc<DeviceLister>,
}

impl SettingsState {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        api: Arc<dyn TranscriptionApi>,
        devices: Arc<DeviceLister>,
    ) -> Self {
        Self {
            store,
            api,
            devices,
        }
    }

    /// Current configuration, falling back to defaults before first save.
    fn current_config(&self) -> Result<AppConfig, DomainError> {
        match self.store.load() {
            Ok(config) => Ok(config),
            Err(DomainError::ConfigMissing(_)) => Ok(AppConfig::default()),
            Err(err) => Err(err),
        }
    }
}

pub fn router(state: SettingsState) -> Router {
    Router::new()
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/microphones", get(list_microphones))
        .with_state(state)
}

#[derive(Serialize)]
struct UpdateResponse {
    status: &'static str,
    server_status: ServerStatus,
    config: AppConfig,
}

async fn get_config(State(state): State<SettingsState>) -> Result<Json<AppConfig>, ApiError> {
    Ok(Json(state.current_config()?))
}

async fn list_microphones(
    State(state): State<SettingsState>,
) -> Result<Json<Vec<AudioDevice>>, ApiError> {
    Ok(Json((state.devices)()?))
}

async fn update_config(
    State(state): State<SettingsState>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let current = state.current_config()?;
    let updated = patch.apply(current.clone())?;
    state.store.save(&updated)?;
    info!(model = %updated.model, device = %updated.device, "Configuration saved");

    let server_status = if updated.server_port != current.server_port {
        // The service keeps listening on its old port until restarted.
        ServerStatus::RestartNeeded
    } else {
        match state.api.push_config(&updated).await {
            Ok(()) => ServerStatus::Running,
            Err(err) => {
                warn!(%err, "Could not reach the transcription service");
                ServerStatus::NotRunning
            }
        }
    };

    Ok(Json(UpdateResponse {
        status: "success",
        server_status,
        config: updated,
    }))
}
