//! Local speech-to-text: a Whisper-backed transcription service on
//! localhost, a settings application over its configuration store, and a
//! recorder client that drives the capture/transcribe/display cycle.

#![forbid(unsafe_code)]

pub mod adapters;
pub mod app;
pub mod client;
pub mod codec;
pub mod domain;
pub mod infrastructure;
pub mod ports;
pub mod server;
pub mod settings;
