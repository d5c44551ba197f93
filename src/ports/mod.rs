pub mod api;
pub mod audio;
pub mod config;
pub mod transcriber;

pub use api::TranscriptionApi;
pub use audio::{AudioCapture, AudioDevice};
pub use config::ConfigStore;
pub use transcriber::Transcriber;
