use anyhow::Context;

use voicebridge::app::ServiceController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let controller = ServiceController::bootstrap()
        .await
        .context("failed to start the transcription service")?;
    controller.run().await?;
    Ok(())
}
