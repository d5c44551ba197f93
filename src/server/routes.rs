use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use super::AppState;
use crate::codec::{self, WAV_MIME};
use crate::domain::{AppConfig, DomainError, HealthStatus};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/transcribe", post(transcribe))
        .route("/config", get(get_config).post(update_config))
        .with_state(state)
}

/// Request-scoped error with an HTTP status.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "missing or invalid authorization".to_string(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let status = match &err {
            DomainError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DomainError::ServiceUnavailable(_) | DomainError::ModelNotFound(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct TranscribeResponse {
    success: bool,
    transcription: String,
    language: Option<String>,
    duration_ms: u64,
}

#[derive(Serialize)]
struct UpdateConfigResponse {
    status: &'static str,
    message: String,
    reloaded: bool,
}

/// Liveness/readiness probe. Never touches audio; fails fast with 503 when
/// no model is loaded.
async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    if !state.transcriber.is_model_loaded() {
        return Err(DomainError::ServiceUnavailable("model not loaded".to_string()).into());
    }

    let model = state.config.read().model;
    Ok(Json(HealthStatus {
        status: "healthy".to_string(),
        device: state.transcriber.device().to_string(),
        model: model.to_string(),
    }))
}

async fn get_config(State(state): State<AppState>) -> Json<AppConfig> {
    Json(state.config.read().clone())
}

async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<AppConfig>,
) -> Result<Json<UpdateConfigResponse>, ApiError> {
    let reloaded = state.apply_config(config).await?;
    Ok(Json(UpdateConfigResponse {
        status: "success",
        message: "configuration updated".to_string(),
        reloaded,
    }))
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let auth_key = state.config.read().auth_key.clone();
    let Some(key) = auth_key else {
        return Ok(());
    };

    let expected = format!("Bearer {key}");
    match headers.get(axum::http::header::AUTHORIZATION) {
        Some(value) if value.to_str().is_ok_and(|v| v == expected) => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

/// Transcribe one uploaded audio payload.
///
/// The multipart field `audio` must declare `audio/wav` and decode as 16 kHz
/// mono 16-bit PCM. The model is never invoked for a payload that fails
/// these checks; decode and inference failures stay request-scoped.
async fn transcribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    check_auth(&state, &headers)?;

    if !state.transcriber.is_model_loaded() {
        return Err(DomainError::ServiceUnavailable("model not loaded".to_string()).into());
    }

    let mut file_name: Option<String> = None;
    let mut audio_bytes: Option<Vec<u8>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "Multipart error");
                return Err(ApiError::bad_request("invalid multipart payload"));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "audio" => {
                let mime = field.content_type().unwrap_or("").to_string();
                if mime != WAV_MIME {
                    warn!(mime = %mime, "Rejected audio content type");
                    return Err(DomainError::UnsupportedFormat(format!(
                        "expected {WAV_MIME}, got {mime:?}"
                    ))
                    .into());
                }
                file_name = field.file_name().map(|v| v.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("invalid audio payload"))?;
                audio_bytes = Some(bytes.to_vec());
            }
            _ => {
                // Drain unknown fields.
                let _ = field.bytes().await;
            }
        }
    }

    let audio_bytes = audio_bytes.ok_or_else(|| ApiError::bad_request("missing audio field"))?;
    if audio_bytes.is_empty() {
        return Err(ApiError::bad_request("empty audio payload"));
    }

    info!(
        file = file_name.as_deref().unwrap_or("unknown"),
        bytes = audio_bytes.len(),
        "Transcription request"
    );

    let buffer = codec::decode_wav(&audio_bytes)?;
    let result = state.transcriber.transcribe(&buffer).await?;

    Ok(Json(TranscribeResponse {
        success: true,
        transcription: result.text,
        language: result.language,
        duration_ms: result.duration_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use crate::domain::{
        AudioBuffer, ComputeDevice, DomainError, TranscriptionResult, WhisperModel,
    };
    use crate::ports::{ConfigStore, Transcriber};

    struct MockTranscriber {
        loaded: AtomicBool,
        calls: AtomicUsize,
        fail_next: AtomicBool,
        fail_next_load: AtomicBool,
    }

    impl MockTranscriber {
        fn new(loaded: bool) -> Arc<Self> {
            Arc::new(Self {
                loaded: AtomicBool::new(loaded),
                calls: AtomicUsize::new(0),
                fail_next: AtomicBool::new(false),
                fail_next_load: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(
            &self,
            _audio: &AudioBuffer,
        ) -> Result<TranscriptionResult, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(DomainError::Transcription("inference blew up".to_string()));
            }
            Ok(TranscriptionResult {
                text: "hello world".to_string(),
                language: Some("en".to_string()),
                duration_ms: 42,
            })
        }

        async fn load_model(
            &self,
            _path: &Path,
            _device: ComputeDevice,
        ) -> Result<(), DomainError> {
            if self.fail_next_load.swap(false, Ordering::SeqCst) {
                return Err(DomainError::ModelNotFound("weights missing".to_string()));
            }
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_model_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }

        fn device(&self) -> ComputeDevice {
            ComputeDevice::Cpu
        }
    }

    #[derive(Default)]
    struct MemoryConfigStore {
        saved: Mutex<Option<AppConfig>>,
    }

    impl ConfigStore for MemoryConfigStore {
        fn load(&self) -> Result<AppConfig, DomainError> {
            self.saved
                .lock()
                .clone()
                .ok_or_else(|| DomainError::ConfigMissing(PathBuf::from("memory")))
        }

        fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
            *self.saved.lock() = Some(config.clone());
            Ok(())
        }

        fn config_path(&self) -> PathBuf {
            PathBuf::from("memory/config.json")
        }

        fn data_dir(&self) -> PathBuf {
            PathBuf::from("memory")
        }

        fn logs_dir(&self) -> PathBuf {
            PathBuf::from("memory/logs")
        }
    }

    fn test_state(
        loaded: bool,
        config: AppConfig,
    ) -> (AppState, Arc<MockTranscriber>, Arc<MemoryConfigStore>) {
        let transcriber = MockTranscriber::new(loaded);
        let store = Arc::new(MemoryConfigStore::default());
        let state = AppState::new(
            transcriber.clone(),
            store.clone(),
            config,
            PathBuf::from("/tmp/models"),
        );
        (state, transcriber, store)
    }

    const BOUNDARY: &str = "test-boundary";

    fn multipart_request(mime: &str, payload: &[u8], auth: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"audio\"; filename=\"recording.wav\"\r\n",
        );
        body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = auth {
            builder = builder.header("authorization", token);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn wav_payload(num_samples: usize) -> Vec<u8> {
        let mut buffer = AudioBuffer::with_capacity(16_000, num_samples);
        buffer.push_samples(&vec![0i16; num_samples]);
        codec::encode_wav(&buffer).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_without_model() {
        let (state, _, _) = test_state(false, AppConfig::default());
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_with_model() {
        let (state, _, _) = test_state(true, AppConfig::default());
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["device"], "cpu");
        assert_eq!(json["model"], "base");
    }

    #[tokio::test]
    async fn test_transcribe_success() {
        let (state, transcriber, _) = test_state(true, AppConfig::default());
        let response = router(state)
            .oneshot(multipart_request(WAV_MIME, &wav_payload(32_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["transcription"], "hello world");
        assert_eq!(json["language"], "en");
        assert_eq!(transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_transcribe_rejects_unsupported_mime_without_invoking_model() {
        let (state, transcriber, _) = test_state(true, AppConfig::default());
        let response = router(state)
            .oneshot(multipart_request("audio/webm", &wav_payload(16_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(transcriber.calls(), 0);
    }

    #[tokio::test]
    async fn test_transcribe_rejects_empty_payload() {
        let (state, transcriber, _) = test_state(true, AppConfig::default());
        let response = router(state)
            .oneshot(multipart_request(WAV_MIME, &[], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(transcriber.calls(), 0);
    }

    #[tokio::test]
    async fn test_transcribe_missing_audio_field() {
        let (state, _, _) = test_state(true, AppConfig::default());
        let body = format!("--{BOUNDARY}--\r\n");
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transcribe_corrupt_audio_is_request_scoped() {
        let (state, transcriber, _) = test_state(true, AppConfig::default());
        let app = router(state);

        // Corrupt payload: right MIME, garbage bytes. 500-class, model never
        // invoked.
        let response = app
            .clone()
            .oneshot(multipart_request(WAV_MIME, b"not a wav at all", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(transcriber.calls(), 0);

        // The process keeps serving: a valid follow-up request succeeds.
        let response = app
            .oneshot(multipart_request(WAV_MIME, &wav_payload(16_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_transcribe_inference_failure_is_request_scoped() {
        let (state, transcriber, _) = test_state(true, AppConfig::default());
        transcriber.fail_next.store(true, Ordering::SeqCst);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(multipart_request(WAV_MIME, &wav_payload(16_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = app
            .oneshot(multipart_request(WAV_MIME, &wav_payload(16_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_transcribe_requires_auth_when_configured() {
        let config = AppConfig {
            auth_key: Some("sekrit".to_string()),
            ..AppConfig::default()
        };
        let (state, transcriber, _) = test_state(true, config);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(multipart_request(WAV_MIME, &wav_payload(16_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(transcriber.calls(), 0);

        let response = app
            .oneshot(multipart_request(
                WAV_MIME,
                &wav_payload(16_000),
                Some("Bearer sekrit"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_config() {
        let (state, _, _) = test_state(true, AppConfig::default());
        let response = router(state)
            .oneshot(Request::get("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["model"], "base");
        assert_eq!(json["device"], "gpu");
        assert_eq!(json["server_port"], 8000);
    }

    #[tokio::test]
    async fn test_update_config_persists_and_reloads() {
        let (state, transcriber, store) = test_state(true, AppConfig::default());

        let new_config = AppConfig {
            model: WhisperModel::Small,
            ..AppConfig::default()
        };
        let request = Request::post("/config")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&new_config).unwrap()))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["reloaded"], true);
        assert_eq!(store.load().unwrap().model, WhisperModel::Small);
        assert!(transcriber.is_model_loaded());
    }

    #[tokio::test]
    async fn test_update_config_unchanged_model_skips_reload() {
        let (state, _, _) = test_state(true, AppConfig::default());

        let request = Request::post("/config")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_vec(&AppConfig::default()).unwrap(),
            ))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["reloaded"], false);
    }

    #[tokio::test]
    async fn test_update_config_reload_failure_keeps_old_model_serving() {
        let (state, transcriber, _) = test_state(true, AppConfig::default());
        transcriber.fail_next_load.store(true, Ordering::SeqCst);
        let app = router(state);

        let new_config = AppConfig {
            model: WhisperModel::Small,
            ..AppConfig::default()
        };
        let request = Request::post("/config")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&new_config).unwrap()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // Health keeps reporting the model that is actually loaded.
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["model"], "base");

        // The failed reload is request-scoped: transcription still works.
        let response = app
            .oneshot(multipart_request(WAV_MIME, &wav_payload(16_000), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid_port() {
        let (state, _, store) = test_state(true, AppConfig::default());

        let bad = serde_json::json!({
            "model": "base",
            "device": "cpu",
            "server_port": 0,
        });
        let request = Request::post("/config")
            .header("content-type", "application/json")
            .body(Body::from(bad.to_string()))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(store.load().is_err());
    }
}
