use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::domain::{AppConfig, DomainError, HealthStatus, TranscriptionResult};
use crate::ports::TranscriptionApi;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const CONFIG_TIMEOUT: Duration = Duration::from_secs(5);
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

/// reqwest-backed client for the transcription service.
///
/// Every call carries its own deadline; a slow transcription must not make
/// a health probe hang.
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: Url,
    auth_key: Option<String>,
}

#[derive(Deserialize)]
struct TranscribeBody {
    transcription: String,
    language: Option<String>,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpApiClient {
    pub fn new(base_url: Url, auth_key: Option<String>) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| DomainError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            auth_key,
        })
    }

    pub fn for_port(port: u16, auth_key: Option<String>) -> Result<Self, DomainError> {
        let base_url = Url::parse(&format!("http://127.0.0.1:{port}/"))
            .map_err(|err| DomainError::Network(err.to_string()))?;
        Self::new(base_url, auth_key)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DomainError> {
        self.base_url
            .join(path)
            .map_err(|err| DomainError::Network(err.to_string()))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn map_send_error(action: &str, timeout: Duration, err: reqwest::Error) -> DomainError {
        if err.is_timeout() {
            DomainError::Timeout {
                action: action.to_string(),
                after: timeout,
            }
        } else {
            DomainError::Network(err.to_string())
        }
    }

    async fn error_from_response(response: reqwest::Response) -> DomainError {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("service returned {status}"),
        };
        match status {
            StatusCode::SERVICE_UNAVAILABLE => DomainError::ServiceUnavailable(message),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => DomainError::UnsupportedFormat(message),
            StatusCode::UNPROCESSABLE_ENTITY => DomainError::Validation(message),
            _ => DomainError::Transcription(message),
        }
    }
}

#[async_trait]
impl TranscriptionApi for HttpApiClient {
    async fn health(&self) -> Result<HealthStatus, DomainError> {
        let response = self
            .client
            .get(self.endpoint("health")?)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| Self::map_send_error("health", HEALTH_TIMEOUT, err))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|err| DomainError::Network(err.to_string()))
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        mime_type: &str,
    ) -> Result<TranscriptionResult, DomainError> {
        let part = Part::bytes(audio)
            .file_name("recording.wav")
            .mime_str(mime_type)
            .map_err(|err| DomainError::Network(err.to_string()))?;
        let form = Form::new().part("audio", part);

        let response = self
            .authorize(self.client.post(self.endpoint("transcribe")?))
            .timeout(TRANSCRIBE_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|err| Self::map_send_error("transcribe", TRANSCRIBE_TIMEOUT, err))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body = response
            .json::<TranscribeBody>()
            .await
            .map_err(|err| DomainError::Network(err.to_string()))?;
        debug!(chars = body.transcription.len(), "Transcription received");
        Ok(TranscriptionResult {
            text: body.transcription,
            language: body.language,
            duration_ms: body.duration_ms,
        })
    }

    async fn push_config(&self, config: &AppConfig) -> Result<(), DomainError> {
        let response = self
            .client
            .post(self.endpoint("config")?)
            .timeout(CONFIG_TIMEOUT)
            .json(config)
            .send()
            .await
            .map_err(|err| Self::map_send_error("push_config", CONFIG_TIMEOUT, err))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }
}
