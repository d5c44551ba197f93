//! Service bootstrap: wires the configuration store, the Whisper engine,
//! and the HTTP server together.

use std::env;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{JsonConfigStore, WhisperTranscriber};
use crate::domain::{AppConfig, DomainError};
use crate::infrastructure::init_logging;
use crate::ports::{ConfigStore, Transcriber};
use crate::server::{AppState, TranscriptionServer};

pub const PORT_ENV: &str = "VOICEBRIDGE_PORT";

/// A fully wired transcription service, ready to serve.
pub struct ServiceController {
    state: AppState,
    port: u16,
    // Keeps the non-blocking log writer alive for the process lifetime.
    _log_guard: Option<WorkerGuard>,
}

impl ServiceController {
    /// Load configuration, initialize logging, and load the model.
    ///
    /// A missing configuration file is replaced with defaults and saved; a
    /// corrupt one is a fatal error, to avoid silently discarding whatever
    /// the user had written there.
    pub async fn bootstrap() -> Result<Self, DomainError> {
        let store = JsonConfigStore::new()?;
        let config = match store.load() {
            Ok(config) => config,
            Err(DomainError::ConfigMissing(path)) => {
                let defaults = AppConfig::default();
                store.save(&defaults)?;
                info!(path = %path.display(), "Created default configuration");
                defaults
            }
            Err(err) => return Err(err),
        };
        config.validate()?;

        let log_guard = init_logging(&store.logs_dir(), "info", true)?;
        info!(config = %store.config_path().display(), "Starting transcription service");

        let port = match env::var(PORT_ENV) {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                DomainError::Validation(format!("{PORT_ENV} is not a valid port: {raw}"))
            })?,
            Err(_) => config.server_port,
        };

        let models_dir = store.models_dir();
        let transcriber = Arc::new(WhisperTranscriber::new(config.device, 0));

        let model_path = models_dir.join(config.model.file_name());
        transcriber.load_model(&model_path, config.device).await?;
        info!(model = %config.model, device = %config.device, "Model loaded");

        let state = AppState::new(transcriber, Arc::new(store), config, models_dir);
        Ok(Self {
            state,
            port,
            _log_guard: log_guard,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the HTTP server and run until it exits.
    pub async fn run(self) -> Result<(), DomainError> {
        let server = TranscriptionServer::start(self.state, self.port).await?;

        let _ = tokio::signal::ctrl_c().await;
        warn!("Interrupt received, shutting down");
        server.shutdown().await;
        Ok(())
    }
}
