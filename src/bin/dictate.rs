use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use voicebridge::adapters::{CpalCapture, JsonConfigStore};
use voicebridge::client::{relay, HttpApiClient, RecordingSession, SessionPolicy};
use voicebridge::domain::{AppConfig, SessionState};
use voicebridge::infrastructure::init_logging;
use voicebridge::ports::{AudioCapture, ConfigStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = JsonConfigStore::new().context("failed to locate the configuration directory")?;
    let _log_guard = init_logging(&store.logs_dir(), "info", false)?;

    let config = store.load().unwrap_or_else(|_| AppConfig::default());
    let api = HttpApiClient::for_port(config.server_port, config.auth_key.clone())
        .context("failed to build the service client")?;

    let capture = Arc::new(CpalCapture::new().context("failed to start the capture thread")?);
    if config.microphone != "default" {
        capture.select_device(Some(&config.microphone))?;
    }

    let session = Arc::new(RecordingSession::new(
        capture,
        relay::spawn(Arc::new(api)),
        SessionPolicy::default(),
    ));

    println!("voicebridge dictation (service on port {})", config.server_port);
    println!("Press Enter to start recording, Enter again to stop, Ctrl-D to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(_line) = lines.next_line().await? {
        match session.state() {
            SessionState::Idle => {
                if let Err(err) = session.begin().await {
                    eprintln!("could not start recording: {err}");
                    continue;
                }
                println!("Recording... press Enter to stop.");
            }
            SessionState::Recording => match session.finish().await {
                Ok(Some(text)) => {
                    println!("{text}");
                    if let Err(err) = session.copy_result() {
                        warn!(%err, "Clipboard unavailable");
                        session.dismiss().ok();
                    } else {
                        println!("(copied to clipboard)");
                    }
                }
                Ok(None) => println!("Recording too short, discarded."),
                Err(err) => eprintln!("transcription failed: {err}"),
            },
            state => {
                // Error display waits out its timer on its own.
                warn!(?state, "Busy, ignoring input");
            }
        }
    }

    Ok(())
}
