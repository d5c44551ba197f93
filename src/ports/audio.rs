use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AudioBuffer, DomainError};

/// Input audio device information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Unique device identifier.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the system default device.
    pub is_default: bool,
}

/// Port for microphone capture.
///
/// At most one capture may be active per implementation at a time.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Open the input device and start accumulating audio.
    ///
    /// Fails with `AlreadyRecording` when a capture is active,
    /// `NoMicrophone` when no input device exists, and `PermissionDenied`
    /// when the device cannot be opened.
    async fn start(&self) -> Result<(), DomainError>;

    /// Stop capturing and return the accumulated buffer
    /// (PCM 16-bit mono at 16 kHz).
    async fn stop(&self) -> Result<AudioBuffer, DomainError>;

    /// List available input devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>, DomainError>;

    /// Select an input device by ID, or the system default if None.
    fn select_device(&self, device_id: Option<&str>) -> Result<(), DomainError>;
}
