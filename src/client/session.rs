use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::relay::{Action, ActionResponse, RelayHandle};
use crate::codec::{self, WAV_MIME};
use crate::domain::{AtomicSessionState, DomainError, SessionEvent, SessionState};
use crate::ports::AudioCapture;

/// Tunables for a recording session.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Recordings shorter than this are discarded without upload.
    pub min_duration_secs: f32,
    /// How long the Error state is shown before returning to Idle.
    pub error_display: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            min_duration_secs: 1.0,
            error_display: Duration::from_secs(5),
        }
    }
}

/// One capture-transcribe-display cycle, driven by user triggers.
///
/// Holds the state machine documented on [`SessionState`]. All service
/// traffic goes through the relay; the session itself never opens sockets.
pub struct RecordingSession {
    state: Arc<AtomicSessionState>,
    capture: Arc<dyn AudioCapture>,
    relay: RelayHandle,
    events: broadcast::Sender<SessionEvent>,
    policy: SessionPolicy,
    last_result: Mutex<Option<String>>,
}

impl RecordingSession {
    pub fn new(capture: Arc<dyn AudioCapture>, relay: RelayHandle, policy: SessionPolicy) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Arc::new(AtomicSessionState::default()),
            capture,
            relay,
            events,
            policy,
            last_result: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn transition(&self, from: SessionState, to: SessionState) {
        self.state.store(to);
        self.emit(SessionEvent::StateChanged { from, to });
    }

    /// Surface a failure, then return to Idle after the display window.
    fn fail(&self, from: SessionState, message: String) {
        self.state.store(SessionState::Error);
        self.report_failure(from, message);
    }

    /// Like `fail`, but only when the session is still in `from`. Used where
    /// the state has not been claimed and a concurrent trigger may have
    /// advanced it.
    fn try_fail(&self, from: SessionState, message: String) -> bool {
        if !self.state.compare_exchange(from, SessionState::Error) {
            return false;
        }
        self.report_failure(from, message);
        true
    }

    fn report_failure(&self, from: SessionState, message: String) {
        warn!(%message, "Session failed");
        self.emit(SessionEvent::StateChanged {
            from,
            to: SessionState::Error,
        });
        self.emit(SessionEvent::Failed { message });

        let state = self.state.clone();
        let events = self.events.clone();
        let delay = self.policy.error_display;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if state.compare_exchange(SessionState::Error, SessionState::Idle) {
                let _ = events.send(SessionEvent::StateChanged {
                    from: SessionState::Error,
                    to: SessionState::Idle,
                });
            }
        });
    }

    /// Start a capture cycle: probe the service, then open the microphone.
    ///
    /// The health probe runs first so an unreachable service fails the
    /// session without ever touching the microphone.
    pub async fn begin(&self) -> Result<(), DomainError> {
        if !self.state.load().can_begin() {
            return Err(DomainError::SessionStateTransition {
                from: self.state.load(),
                to: SessionState::RequestingMicrophone,
            });
        }

        // The probe runs while the session is still Idle; the microphone
        // state is only entered once the service is known to be up.
        let reachable = matches!(
            self.relay.dispatch(Action::CheckServerStatus).await,
            Ok(ActionResponse::ServerStatus { success: true, .. })
        );
        if !reachable {
            let message = "transcription service is not available".to_string();
            self.try_fail(SessionState::Idle, message.clone());
            return Err(DomainError::ServiceUnavailable(message));
        }

        if let Err(err) = self.relay.dispatch(Action::ShowRecordingWindow).await {
            debug!(%err, "Recording window request failed");
        }

        if !self.state.compare_exchange(SessionState::Idle, SessionState::RequestingMicrophone) {
            return Err(DomainError::SessionStateTransition {
                from: self.state.load(),
                to: SessionState::RequestingMicrophone,
            });
        }
        self.emit(SessionEvent::StateChanged {
            from: SessionState::Idle,
            to: SessionState::RequestingMicrophone,
        });
        match self.capture.start().await {
            Ok(()) => {
                info!("Recording started");
                self.transition(SessionState::RequestingMicrophone, SessionState::Recording);
                Ok(())
            }
            Err(err) => {
                self.fail(SessionState::RequestingMicrophone, err.to_string());
                Err(err)
            }
        }
    }

    /// Stop recording and transcribe the captured audio.
    ///
    /// Returns `Ok(None)` when the recording was below the minimum duration
    /// and was discarded without contacting the service.
    pub async fn finish(&self) -> Result<Option<String>, DomainError> {
        if !self.state.compare_exchange(SessionState::Recording, SessionState::Processing) {
            return Err(DomainError::NotRecording);
        }

        let buffer = match self.capture.stop().await {
            Ok(buffer) => buffer,
            Err(err) => {
                self.fail(SessionState::Recording, err.to_string());
                return Err(err);
            }
        };

        let duration_secs = buffer.duration_secs();
        if duration_secs < self.policy.min_duration_secs {
            info!(duration_secs, "Recording too short, discarding");
            self.state.store(SessionState::Idle);
            self.emit(SessionEvent::TooShort { duration_secs });
            self.emit(SessionEvent::StateChanged {
                from: SessionState::Recording,
                to: SessionState::Idle,
            });
            return Ok(None);
        }

        self.emit(SessionEvent::StateChanged {
            from: SessionState::Recording,
            to: SessionState::Processing,
        });

        let result = self.transcribe(buffer).await;
        match result {
            Ok(text) => {
                *self.last_result.lock() = Some(text.clone());
                self.transition(SessionState::Processing, SessionState::DisplayingResult);
                self.emit(SessionEvent::ResultReady { text: text.clone() });
                Ok(Some(text))
            }
            Err(err) => {
                self.fail(SessionState::Processing, err.to_string());
                Err(err)
            }
        }
    }

    async fn transcribe(&self, buffer: crate::domain::AudioBuffer) -> Result<String, DomainError> {
        let wav = codec::encode_wav(&buffer)?;
        let response = self
            .relay
            .dispatch(Action::TranscribeAudio {
                audio_base64: BASE64.encode(&wav),
                mime_type: WAV_MIME.to_string(),
            })
            .await?;

        match response {
            ActionResponse::Transcription { text, .. } => Ok(text),
            other => Err(DomainError::Network(format!(
                "unexpected relay response: {other:?}"
            ))),
        }
    }

    /// Copy the displayed result to the clipboard and return to Idle.
    pub fn copy_result(&self) -> Result<(), DomainError> {
        if self.state.load() != SessionState::DisplayingResult {
            return Err(DomainError::SessionStateTransition {
                from: self.state.load(),
                to: SessionState::Idle,
            });
        }

        let text = self
            .last_result
            .lock()
            .clone()
            .unwrap_or_default();
        let mut clipboard =
            arboard::Clipboard::new().map_err(|err| DomainError::Io(err.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|err| DomainError::Io(err.to_string()))?;

        self.emit(SessionEvent::Copied);
        self.transition(SessionState::DisplayingResult, SessionState::Idle);
        Ok(())
    }

    /// Dismiss the result or error display and return to Idle.
    pub fn dismiss(&self) -> Result<(), DomainError> {
        let current = self.state.load();
        if !current.can_dismiss() {
            return Err(DomainError::SessionStateTransition {
                from: current,
                to: SessionState::Idle,
            });
        }
        self.transition(current, SessionState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::client::relay;
    use crate::codec::SAMPLE_RATE;
    use crate::domain::{AppConfig, AudioBuffer, HealthStatus, TranscriptionResult};
    use crate::ports::{AudioDevice, TranscriptionApi};

    struct MockCapture {
        recording: AtomicBool,
        start_calls: AtomicUsize,
        samples: usize,
    }

    impl MockCapture {
        fn new(samples: usize) -> Arc<Self> {
            Arc::new(Self {
                recording: AtomicBool::new(false),
                start_calls: AtomicUsize::new(0),
                samples,
            })
        }
    }

    #[async_trait]
    impl AudioCapture for MockCapture {
        async fn start(&self) -> Result<(), DomainError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.recording.swap(true, Ordering::SeqCst) {
                return Err(DomainError::AlreadyRecording);
            }
            Ok(())
        }

        async fn stop(&self) -> Result<AudioBuffer, DomainError> {
            if !self.recording.swap(false, Ordering::SeqCst) {
                return Err(DomainError::NotRecording);
            }
            let mut buffer = AudioBuffer::with_capacity(SAMPLE_RATE, self.samples);
            buffer.push_samples(&vec![100i16; self.samples]);
            Ok(buffer)
        }

        fn list_devices(&self) -> Result<Vec<AudioDevice>, DomainError> {
            Ok(vec![])
        }

        fn select_device(&self, _device_id: Option<&str>) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct MockApi {
        healthy: bool,
        transcribe_calls: AtomicUsize,
    }

    impl MockApi {
        fn new(healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy,
                transcribe_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TranscriptionApi for MockApi {
        async fn health(&self) -> Result<HealthStatus, DomainError> {
            if self.healthy {
                Ok(HealthStatus {
                    status: "healthy".to_string(),
                    device: "cpu".to_string(),
                    model: "base".to_string(),
                })
            } else {
                Err(DomainError::Network("connection refused".to_string()))
            }
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _mime_type: &str,
        ) -> Result<TranscriptionResult, DomainError> {
            self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(TranscriptionResult {
                text: "hello world".to_string(),
                language: Some("en".to_string()),
                duration_ms: 5,
            })
        }

        async fn push_config(&self, _config: &AppConfig) -> Result<(), DomainError> {
            Ok(())
        }
    }

    /// Dead service that takes a while to answer the health probe.
    struct SlowDeadApi;

    #[async_trait]
    impl TranscriptionApi for SlowDeadApi {
        async fn health(&self) -> Result<HealthStatus, DomainError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(DomainError::Network("connection refused".to_string()))
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _mime_type: &str,
        ) -> Result<TranscriptionResult, DomainError> {
            Err(DomainError::Network("connection refused".to_string()))
        }

        async fn push_config(&self, _config: &AppConfig) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn session(
        capture: Arc<MockCapture>,
        api: Arc<MockApi>,
        policy: SessionPolicy,
    ) -> RecordingSession {
        RecordingSession::new(capture, relay::spawn(api), policy)
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let capture = MockCapture::new(2 * SAMPLE_RATE as usize);
        let api = MockApi::new(true);
        let session = session(capture, api.clone(), SessionPolicy::default());

        session.begin().await.unwrap();
        assert_eq!(session.state(), SessionState::Recording);

        let text = session.finish().await.unwrap();
        assert_eq!(text.as_deref(), Some("hello world"));
        assert_eq!(session.state(), SessionState::DisplayingResult);
        assert_eq!(api.transcribe_calls.load(Ordering::SeqCst), 1);

        session.dismiss().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_short_recording_discarded_without_upload() {
        // Half a second of audio against a one second minimum.
        let capture = MockCapture::new(SAMPLE_RATE as usize / 2);
        let api = MockApi::new(true);
        let session = session(capture, api.clone(), SessionPolicy::default());
        let mut events = session.subscribe();

        session.begin().await.unwrap();
        let text = session.finish().await.unwrap();
        assert!(text.is_none());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(api.transcribe_calls.load(Ordering::SeqCst), 0);

        let mut saw_too_short = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::TooShort { .. }) {
                saw_too_short = true;
            }
        }
        assert!(saw_too_short);
    }

    #[tokio::test]
    async fn test_dead_server_never_requests_microphone() {
        let capture = MockCapture::new(SAMPLE_RATE as usize);
        let api = MockApi::new(false);
        let session = session(capture.clone(), api, SessionPolicy::default());

        let result = session.begin().await;
        assert!(matches!(result, Err(DomainError::ServiceUnavailable(_))));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(capture.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_state_stays_idle_during_health_probe() {
        let capture = MockCapture::new(SAMPLE_RATE as usize);
        let session = Arc::new(RecordingSession::new(
            capture,
            relay::spawn(Arc::new(SlowDeadApi)),
            SessionPolicy::default(),
        ));
        let mut events = session.subscribe();

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.begin().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Mid-probe the session has not left Idle.
        assert_eq!(session.state(), SessionState::Idle);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(DomainError::ServiceUnavailable(_))));
        assert_eq!(session.state(), SessionState::Error);

        // The failure transition reports leaving Idle, not a microphone state.
        match events.recv().await.unwrap() {
            SessionEvent::StateChanged { from, to } => {
                assert_eq!(from, SessionState::Idle);
                assert_eq!(to, SessionState::Error);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_state_returns_to_idle_after_display_window() {
        let capture = MockCapture::new(SAMPLE_RATE as usize);
        let api = MockApi::new(false);
        let policy = SessionPolicy {
            error_display: Duration::from_millis(10),
            ..SessionPolicy::default()
        };
        let session = session(capture, api, policy);

        let _ = session.begin().await;
        assert_eq!(session.state(), SessionState::Error);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_begin_rejected_while_recording() {
        let capture = MockCapture::new(2 * SAMPLE_RATE as usize);
        let api = MockApi::new(true);
        let session = session(capture, api, SessionPolicy::default());

        session.begin().await.unwrap();
        let result = session.begin().await;
        assert!(matches!(
            result,
            Err(DomainError::SessionStateTransition { .. })
        ));
        assert_eq!(session.state(), SessionState::Recording);
    }

    #[tokio::test]
    async fn test_finish_without_recording() {
        let capture = MockCapture::new(SAMPLE_RATE as usize);
        let api = MockApi::new(true);
        let session = session(capture, api, SessionPolicy::default());

        let result = session.finish().await;
        assert!(matches!(result, Err(DomainError::NotRecording)));
    }

    #[tokio::test]
    async fn test_dismiss_requires_display_state() {
        let capture = MockCapture::new(SAMPLE_RATE as usize);
        let api = MockApi::new(true);
        let session = session(capture, api, SessionPolicy::default());

        assert!(session.dismiss().is_err());
    }
}
