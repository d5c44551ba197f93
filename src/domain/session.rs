use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Recording session state machine.
///
/// State transitions:
/// - Idle -> RequestingMicrophone (user trigger, after the server health
///   probe succeeds; an unreachable server goes straight to Error)
/// - RequestingMicrophone -> Recording (capture started)
/// - RequestingMicrophone -> Error (permission denied, no device)
/// - Recording -> Processing (user stop, duration >= minimum)
/// - Recording -> Idle (user stop, recording too short; discarded locally)
/// - Processing -> DisplayingResult (transcription returned)
/// - Processing -> Error (any request failure)
/// - DisplayingResult -> Idle (copy or dismiss)
/// - Error -> Idle (dismiss or timeout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    /// No active capture.
    Idle = 0,
    /// Waiting on the microphone permission/open call.
    RequestingMicrophone = 1,
    /// Actively accumulating audio.
    Recording = 2,
    /// Encoding the payload and waiting on the transcribe request.
    Processing = 3,
    /// Showing recognized text to the user.
    DisplayingResult = 4,
    /// Showing a failure message.
    Error = 5,
}

impl SessionState {
    /// A new capture cycle may only begin from Idle.
    #[must_use]
    pub fn can_begin(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Stopping is only meaningful while recording.
    #[must_use]
    pub fn can_finish(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Dismissal applies to the two terminal-display states.
    #[must_use]
    pub fn can_dismiss(&self) -> bool {
        matches!(self, SessionState::DisplayingResult | SessionState::Error)
    }
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::RequestingMicrophone,
            2 => SessionState::Recording,
            3 => SessionState::Processing,
            4 => SessionState::DisplayingResult,
            _ => SessionState::Error,
        }
    }
}

impl From<SessionState> for u8 {
    fn from(state: SessionState) -> Self {
        state as u8
    }
}

/// Atomic wrapper for SessionState for lock-free reads.
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.into()))
    }

    pub fn load(&self) -> SessionState {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state.into(), Ordering::Release);
    }

    /// Compare and swap, returns true if successful.
    pub fn compare_exchange(&self, current: SessionState, new: SessionState) -> bool {
        self.0
            .compare_exchange(
                current.into(),
                new.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for AtomicSessionState {
    fn default() -> Self {
        Self::new(SessionState::Idle)
    }
}

/// Events emitted by a recording session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Session state changed.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Recording was shorter than the minimum and discarded locally.
    TooShort { duration_secs: f32 },
    /// Transcription completed.
    ResultReady { text: String },
    /// Recognized text was placed on the clipboard.
    Copied,
    /// A failure was surfaced to the user.
    Failed { message: String },
}
