use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::domain::{AudioBuffer, ComputeDevice, DomainError, TranscriptionResult};
use crate::ports::Transcriber;

/// Transcriber implementation backed by whisper.cpp via whisper-rs.
///
/// The loaded context is the single owned model resource of the service
/// process; it is replaced wholesale on reload and never mutated in place.
pub struct WhisperTranscriber {
    context: RwLock<Option<Arc<WhisperContext>>>,
    device: RwLock<ComputeDevice>,
    threads: u32,
}

impl WhisperTranscriber {
    /// Create a transcriber without a loaded model.
    ///
    /// `threads` of 0 auto-detects (cores - 1).
    pub fn new(device: ComputeDevice, threads: u32) -> Self {
        let actual_threads = if threads == 0 {
            std::thread::available_parallelism()
                .map(|p| std::cmp::max(1, p.get() as u32 - 1))
                .unwrap_or(1)
        } else {
            threads
        };

        info!(device = %device, threads = actual_threads, "WhisperTranscriber created");

        Self {
            context: RwLock::new(None),
            device: RwLock::new(device),
            threads: actual_threads,
        }
    }

    /// Convert i16 samples to f32 (whisper expects f32 in [-1, 1]).
    fn convert_samples(samples: &[i16]) -> Vec<f32> {
        samples.iter().map(|&s| s as f32 / 32768.0).collect()
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptionResult, DomainError> {
        let context = self.context.read().clone();
        let ctx = context
            .ok_or_else(|| DomainError::ServiceUnavailable("no model loaded".to_string()))?;

        if audio.sample_rate() != 16_000 {
            return Err(DomainError::UnsupportedFormat(format!(
                "expected 16kHz audio, got {}Hz",
                audio.sample_rate()
            )));
        }

        if audio.is_empty() {
            return Ok(TranscriptionResult {
                text: String::new(),
                language: None,
                duration_ms: 0,
            });
        }

        let samples = Self::convert_samples(audio.samples());
        let threads = self.threads;

        debug!(
            samples = samples.len(),
            duration_secs = audio.duration_secs(),
            threads = threads,
            "Starting transcription"
        );

        let start = std::time::Instant::now();

        // Inference is CPU/GPU-bound; run it off the async runtime.
        let result = tokio::task::spawn_blocking(move || {
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

            params.set_n_threads(threads as i32);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            params.set_suppress_non_speech_tokens(true);

            let mut state = ctx.create_state().map_err(|e| {
                DomainError::Transcription(format!("failed to create whisper state: {e}"))
            })?;

            state
                .full(params, &samples)
                .map_err(|e| DomainError::Transcription(format!("inference failed: {e}")))?;

            let num_segments = state
                .full_n_segments()
                .map_err(|e| DomainError::Transcription(format!("failed to get segments: {e}")))?;

            let mut text = String::new();
            for i in 0..num_segments {
                if let Ok(segment_text) = state.full_get_segment_text(i) {
                    text.push_str(&segment_text);
                }
            }

            let language = state
                .full_lang_id_from_state()
                .ok()
                .and_then(|id| whisper_rs::get_lang_str(id).map(|s| s.to_string()));

            Ok::<(String, Option<String>), DomainError>((text.trim().to_string(), language))
        })
        .await
        .map_err(|e| DomainError::Transcription(format!("task join error: {e}")))??;

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            text_len = result.0.len(),
            duration_ms = duration_ms,
            language = ?result.1,
            "Transcription complete"
        );

        Ok(TranscriptionResult {
            text: result.0,
            language: result.1,
            duration_ms,
        })
    }

    async fn load_model(&self, path: &Path, device: ComputeDevice) -> Result<(), DomainError> {
        if !path.exists() {
            return Err(DomainError::ModelNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        info!(path = ?path, device = %device, "Loading whisper model");

        let path_str = path.to_string_lossy().to_string();
        let use_gpu = device == ComputeDevice::Gpu;

        let ctx = tokio::task::spawn_blocking(move || {
            let mut ctx_params = WhisperContextParameters::default();
            ctx_params.use_gpu(use_gpu);
            WhisperContext::new_with_params(&path_str, ctx_params)
                .map_err(|e| DomainError::ServiceUnavailable(format!("failed to load model: {e}")))
        })
        .await
        .map_err(|e| DomainError::ServiceUnavailable(format!("task join error: {e}")))??;

        *self.context.write() = Some(Arc::new(ctx));
        *self.device.write() = device;

        info!(path = ?path, "Whisper model loaded");
        Ok(())
    }

    fn is_model_loaded(&self) -> bool {
        self.context.read().is_some()
    }

    fn device(&self) -> ComputeDevice {
        *self.device.read()
    }
}
