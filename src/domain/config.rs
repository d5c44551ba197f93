use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Whisper model size. Maps 1:1 onto the ggml model files shipped for
/// whisper.cpp (`ggml-<id>.bin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhisperModel {
    #[serde(rename = "tiny")]
    Tiny,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "large-v3")]
    LargeV3,
    #[serde(rename = "large-v3-turbo")]
    LargeV3Turbo,
}

impl WhisperModel {
    /// All selectable models, in ascending size order.
    pub const ALL: [WhisperModel; 6] = [
        WhisperModel::Tiny,
        WhisperModel::Base,
        WhisperModel::Small,
        WhisperModel::Medium,
        WhisperModel::LargeV3,
        WhisperModel::LargeV3Turbo,
    ];

    /// Stable identifier used in the config file and model file names.
    pub fn id(&self) -> &'static str {
        match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Medium => "medium",
            WhisperModel::LargeV3 => "large-v3",
            WhisperModel::LargeV3Turbo => "large-v3-turbo",
        }
    }

    /// Parse a model from its identifier.
    pub fn from_id(s: &str) -> Result<Self, DomainError> {
        Self::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown model: {s}")))
    }

    /// File name of the ggml weights for this model.
    pub fn file_name(&self) -> String {
        format!("ggml-{}.bin", self.id())
    }
}

impl std::fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Compute device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Gpu,
    Cpu,
}

impl ComputeDevice {
    pub fn id(&self) -> &'static str {
        match self {
            ComputeDevice::Gpu => "gpu",
            ComputeDevice::Cpu => "cpu",
        }
    }

    pub fn from_id(s: &str) -> Result<Self, DomainError> {
        match s {
            "gpu" => Ok(ComputeDevice::Gpu),
            "cpu" => Ok(ComputeDevice::Cpu),
            other => Err(DomainError::Validation(format!("unknown device: {other}"))),
        }
    }
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Application configuration, persisted as a single JSON file shared by the
/// transcription service and the settings app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Active Whisper model.
    pub model: WhisperModel,
    /// Compute device the model is loaded on.
    pub device: ComputeDevice,
    /// Port the transcription service binds on 127.0.0.1.
    pub server_port: u16,
    /// Capture device identifier. Opaque to the service; only the recorder
    /// client interprets it.
    pub microphone: String,
    /// Optional bearer token required on /transcribe when set.
    pub auth_key: Option<String>,
    /// Optional cloud-fallback API key. Stored for external tooling; the
    /// local service never uses it.
    pub openai_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: WhisperModel::Base,
            device: ComputeDevice::Gpu,
            server_port: 8000,
            microphone: "default".to_string(),
            auth_key: None,
            openai_api_key: None,
        }
    }
}

impl AppConfig {
    /// Check the invariants the settings surface must enforce before
    /// persisting. Enumeration fields are already constrained by their types;
    /// only the port needs a range check.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.server_port == 0 {
            return Err(DomainError::Validation(
                "server_port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial configuration update accepted by the settings app. Enumeration
/// fields arrive as raw strings so invalid values surface as a Validation
/// error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub model: Option<String>,
    pub device: Option<String>,
    pub server_port: Option<u16>,
    pub microphone: Option<String>,
    pub auth_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl ConfigPatch {
    /// Apply the patch on top of an existing configuration, validating every
    /// supplied field.
    pub fn apply(self, base: AppConfig) -> Result<AppConfig, DomainError> {
        let mut config = base;

        if let Some(model) = self.model {
            config.model = WhisperModel::from_id(&model)?;
        }
        if let Some(device) = self.device {
            config.device = ComputeDevice::from_id(&device)?;
        }
        if let Some(port) = self.server_port {
            config.server_port = port;
        }
        if let Some(microphone) = self.microphone {
            config.microphone = microphone;
        }
        if let Some(auth_key) = self.auth_key {
            config.auth_key = if auth_key.is_empty() {
                None
            } else {
                Some(auth_key)
            };
        }
        if let Some(api_key) = self.openai_api_key {
            config.openai_api_key = if api_key.is_empty() {
                None
            } else {
                Some(api_key)
            };
        }

        config.validate()?;
        Ok(config)
    }
}
