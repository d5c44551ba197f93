use async_trait::async_trait;

use crate::domain::{AppConfig, DomainError, HealthStatus, TranscriptionResult};

/// Client-side port for the transcription service's HTTP surface.
///
/// The relay and the settings app talk to the service through this seam so
/// tests can run against an in-process fake.
#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    /// Probe the service's health endpoint.
    async fn health(&self) -> Result<HealthStatus, DomainError>;

    /// Upload one audio payload for transcription.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        mime_type: &str,
    ) -> Result<TranscriptionResult, DomainError>;

    /// Push a new configuration to the running service.
    async fn push_config(&self, config: &AppConfig) -> Result<(), DomainError>;
}
