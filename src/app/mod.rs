use crate::config::Config;
use crate::engine::FfmpegSpawner;
use crate::pipeline::MixerMachine;
use crate::sources::SourceManager;
use anyhow::Result;
use tracing::{error, info};

pub async fn run_service() -> Result<()> {
    info!("Starting mixcast service");

    let config = Config::load()?;

    let spawner = FfmpegSpawner::new(config.engine.ffmpeg_path.as_deref())?;
    let sources = SourceManager::new(config.capture.clone(), config.browser.clone());
    let machine = MixerMachine::new(sources, Box::new(spawner), &config.engine);

    match config.stream.clone() {
        Some(stream) => {
            info!(
                "Auto-starting configured stream: {} -> {}",
                stream.input_url, stream.output_url
            );
            if let Err(e) = machine.start(stream).await {
                error!("Failed to start configured stream: {:#}", e);
            }
        }
        None => {
            info!("No [stream] section in config; waiting without an active pipeline");
        }
    }

    info!("mixcast is ready (ctrl-c to stop)");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    machine.stop().await?;

    Ok(())
}
