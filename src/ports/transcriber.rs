use std::path::Path;

use async_trait::async_trait;

use crate::domain::{AudioBuffer, ComputeDevice, DomainError, TranscriptionResult};

/// Port for transcription operations.
///
/// The service holds exactly one implementation for its whole lifetime; the
/// model behind it is loaded once at startup and replaced only through an
/// explicit reload.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio to text.
    ///
    /// Silence yields an empty (or near-empty) string, not an error.
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptionResult, DomainError>;

    /// Load model weights from the given path onto the given device,
    /// replacing any loaded model.
    async fn load_model(&self, path: &Path, device: ComputeDevice) -> Result<(), DomainError>;

    /// Check if a model is currently loaded.
    fn is_model_loaded(&self) -> bool;

    /// The compute device the current model runs on.
    fn device(&self) -> ComputeDevice;
}
