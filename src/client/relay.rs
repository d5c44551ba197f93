use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::DomainError;
use crate::ports::TranscriptionApi;

/// Actions the recorder front end may dispatch through the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    ShowRecordingWindow,
    CheckServerStatus,
    TranscribeAudio {
        audio_base64: String,
        mime_type: String,
    },
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::ShowRecordingWindow => "show_recording_window",
            Action::CheckServerStatus => "check_server_status",
            Action::TranscribeAudio { .. } => "transcribe_audio",
        }
    }

    /// Deadline for a round trip of this action, queue wait included.
    fn deadline(&self) -> Duration {
        match self {
            Action::ShowRecordingWindow => Duration::from_secs(2),
            Action::CheckServerStatus => Duration::from_secs(5),
            Action::TranscribeAudio { .. } => Duration::from_secs(130),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionResponse {
    WindowShown,
    ServerStatus {
        success: bool,
        device: Option<String>,
        model: Option<String>,
    },
    Transcription {
        text: String,
        language: Option<String>,
    },
}

struct RelayRequest {
    action: Action,
    reply: oneshot::Sender<Result<ActionResponse, DomainError>>,
}

/// Cloneable dispatch handle for the relay task.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayRequest>,
}

impl RelayHandle {
    /// Dispatch an action and wait for its response within the action's
    /// deadline.
    pub async fn dispatch(&self, action: Action) -> Result<ActionResponse, DomainError> {
        let deadline = action.deadline();
        self.dispatch_within(action, deadline).await
    }

    async fn dispatch_within(
        &self,
        action: Action,
        deadline: Duration,
    ) -> Result<ActionResponse, DomainError> {
        let label = action.label();
        debug!(action = label, "Dispatching relay action");

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RelayRequest {
                action,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DomainError::Network("relay is no longer running".to_string()))?;

        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DomainError::Network(
                "relay dropped the response".to_string(),
            )),
            Err(_) => Err(DomainError::Timeout {
                action: label.to_string(),
                after: deadline,
            }),
        }
    }
}

/// Spawn the relay task over a service API client.
///
/// Each request is handled on its own task so a long transcription does not
/// block a status probe queued behind it.
pub fn spawn(api: Arc<dyn TranscriptionApi>) -> RelayHandle {
    let (tx, mut rx) = mpsc::channel::<RelayRequest>(16);

    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let api = api.clone();
            tokio::spawn(async move {
                let result = handle_action(api.as_ref(), request.action).await;
                if request.reply.send(result).is_err() {
                    debug!("Relay caller went away before the response");
                }
            });
        }
        debug!("Relay channel closed, shutting down");
    });

    RelayHandle { tx }
}

async fn handle_action(
    api: &dyn TranscriptionApi,
    action: Action,
) -> Result<ActionResponse, DomainError> {
    match action {
        Action::ShowRecordingWindow => Ok(ActionResponse::WindowShown),
        Action::CheckServerStatus => match api.health().await {
            Ok(status) => Ok(ActionResponse::ServerStatus {
                success: true,
                device: Some(status.device),
                model: Some(status.model),
            }),
            // An unreachable or unready service is a normal answer here,
            // not a failure of the probe itself.
            Err(err) => {
                warn!(%err, "Service status probe failed");
                Ok(ActionResponse::ServerStatus {
                    success: false,
                    device: None,
                    model: None,
                })
            }
        },
        Action::TranscribeAudio {
            audio_base64,
            mime_type,
        } => {
            let audio = BASE64
                .decode(audio_base64.as_bytes())
                .map_err(|_| DomainError::Validation("invalid base64 audio".to_string()))?;
            let result = api.transcribe(audio, &mime_type).await?;
            Ok(ActionResponse::Transcription {
                text: result.text,
                language: result.language,
            })
        }
    }
}
