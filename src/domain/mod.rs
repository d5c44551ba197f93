pub mod config;
pub mod error;
pub mod session;
pub mod transcription;

pub use config::{AppConfig, ComputeDevice, ConfigPatch, WhisperModel};
pub use error::DomainError;
pub use session::{AtomicSessionState, SessionEvent, SessionState};
pub use transcription::{AudioBuffer, HealthStatus, TranscriptionResult};
