pub mod audio_cpal;
pub mod config_store;
pub mod whisper;

pub use audio_cpal::{list_input_devices, CpalCapture};
pub use config_store::JsonConfigStore;
pub use whisper::WhisperTranscriber;
