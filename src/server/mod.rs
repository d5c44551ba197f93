//! Local HTTP surface of the transcription service.

pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{AppConfig, DomainError, WhisperModel};
use crate::ports::{ConfigStore, Transcriber};

/// Shared state behind every route handler.
#[derive(Clone)]
pub struct AppState {
    pub transcriber: Arc<dyn Transcriber>,
    pub store: Arc<dyn ConfigStore>,
    pub config: Arc<RwLock<AppConfig>>,
    pub models_dir: PathBuf,
}

impl AppState {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        store: Arc<dyn ConfigStore>,
        config: AppConfig,
        models_dir: PathBuf,
    ) -> Self {
        Self {
            transcriber,
            store,
            config: Arc::new(RwLock::new(config)),
            models_dir,
        }
    }

    /// Resolve the weights file for a model.
    pub fn model_path(&self, model: WhisperModel) -> PathBuf {
        self.models_dir.join(model.file_name())
    }

    /// Validate, persist, and apply a full configuration document.
    ///
    /// The model is reloaded in place when the model or device changed (or
    /// when no model is loaded at all). Returns whether a reload happened.
    /// Reload failures are request-scoped: the configuration is already
    /// persisted and takes full effect on the next service start.
    pub async fn apply_config(&self, new: AppConfig) -> Result<bool, DomainError> {
        new.validate()?;

        let old = self.config.read().clone();
        self.store.save(&new)?;

        let needs_reload = new.model != old.model
            || new.device != old.device
            || !self.transcriber.is_model_loaded();

        if needs_reload {
            info!(model = %new.model, device = %new.device, "Reloading model for new configuration");
            // The in-memory config advances only once the reload succeeds,
            // so /health keeps reporting the model actually loaded.
            self.transcriber
                .load_model(&self.model_path(new.model), new.device)
                .await?;
        }

        *self.config.write() = new;
        Ok(needs_reload)
    }
}

/// A running transcription server with a graceful-shutdown handle.
pub struct TranscriptionServer {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl TranscriptionServer {
    /// Bind 127.0.0.1:`port` and start serving.
    ///
    /// Binding fails when the port is taken; the port must be free at
    /// service start.
    pub async fn start(state: AppState, port: u16) -> Result<Self, DomainError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DomainError::Network(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DomainError::Network(e.to_string()))?;

        info!(addr = %local_addr, "Transcription service listening");

        let router = routes::router(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = result {
                error!(%err, "Server error");
            }
        });

        Ok(Self {
            shutdown: shutdown_tx,
            handle,
            local_addr,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait for in-flight requests to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
        info!("Transcription service stopped");
    }
}
