//! Reverie console host
//!
//! Runs one experience against the default audio devices and a still-frame
//! camera, reading front-end actions from stdin and printing the published
//! state as it changes.

mod commands;
mod terminal;

use commands::{Command, HELP};
use reverie_core::{
    drive_frontend, Experience, ExperienceConfig, ExperienceDeps, ExperienceError, ExperienceEvent,
    ExperienceHandle, GeminiClient, GenerativeBackend, PlaceholderBackend,
};
use reverie_voice::{
    AmbientSounds, CpalMicrophone, HostDevices, NullAmbient, OutputDevice, PlaceholderTts,
    RodioAmbient, RodioSpeaker, SilentSink, SpeechSink, StillFrameCamera, TtsBackend,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use terminal::TerminalFrontend;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Height of the fog band cleared by one `wipe`.
const WIPE_BAND: u32 = 60;
const WIPE_STEP: u32 = 20;

#[tokio::main]
async fn main() -> Result<(), ExperienceError> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[reverie] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ExperienceConfig::load()?;

    let camera_frame = std::env::var("REVERIE_CAMERA_FRAME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| config.devices.camera_frame.clone());
    // A configured frame that cannot be read is a setup mistake, not a refused camera.
    if let Some(path) = &camera_frame {
        StillFrameCamera::load(path, config.devices.camera_warmup()).await?;
    }
    match CpalMicrophone::list_input_devices() {
        Ok(inputs) => tracing::info!(?inputs, "Audio inputs available"),
        Err(e) => tracing::warn!(error = %e, "Could not list audio inputs"),
    }
    let devices = Arc::new(HostDevices::new(camera_frame, config.devices.camera_warmup()));

    let (tts, backend): (Arc<dyn TtsBackend>, Arc<dyn GenerativeBackend>) =
        match GeminiClient::from_config(&config) {
            Some(client) => {
                let client = Arc::new(client);
                (client.clone() as Arc<dyn TtsBackend>, client as Arc<dyn GenerativeBackend>)
            }
            None => {
                tracing::warn!(
                    "No GEMINI_API_KEY configured; speech falls back to captions and analysis to defaults"
                );
                (Arc::new(PlaceholderTts), Arc::new(PlaceholderBackend))
            }
        };

    let (sink, ambient): (Arc<dyn SpeechSink>, Arc<dyn AmbientSounds>) = if config.devices.audio_output {
        match OutputDevice::open_default() {
            Ok(device) => (
                Arc::new(RodioSpeaker::new(device.clone())),
                Arc::new(RodioAmbient::new(device)),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Audio output unavailable; running silent");
                (Arc::new(SilentSink::default()), Arc::new(NullAmbient))
            }
        }
    } else {
        (Arc::new(SilentSink::default()), Arc::new(NullAmbient))
    };

    let (width, height) = (config.fog.viewport_width, config.fog.viewport_height);
    let deps = ExperienceDeps {
        config,
        backend,
        tts,
        sink,
        ambient,
        devices,
    };
    let (experience, handle) = Experience::new(deps);
    let engine = tokio::spawn(experience.run());

    let render_handle = handle.clone();
    let renderer = tokio::spawn(async move {
        let mut frontend = TerminalFrontend::new();
        drive_frontend(&render_handle, &mut frontend).await;
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut wiped_rows = 0u32;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(message) => {
                println!("{}. {}", message, HELP);
                continue;
            }
        };

        let sent = match command {
            Command::Wipe => {
                let y = (wiped_rows * WIPE_BAND + WIPE_BAND / 2) % height.max(1);
                wiped_rows += 1;
                wipe_band(&handle, width, y as f32).await
            }
            Command::Click => handle.click().await,
            Command::Record => handle.send(ExperienceEvent::RecordStatus).await,
            Command::Choose(kind) => handle.send(ExperienceEvent::SelectProblem(kind)).await,
            Command::Hover(kind) => handle.send(ExperienceEvent::HoverProblem(kind)).await,
            Command::Mic => handle.send(ExperienceEvent::ToggleVoiceRecording).await,
            Command::Restart => {
                wiped_rows = 0;
                handle.send(ExperienceEvent::Restart).await
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => break,
        };
        if sent.is_err() {
            tracing::warn!("Experience stopped; exiting");
            break;
        }
    }

    let _ = handle.send(ExperienceEvent::Shutdown).await;
    drop(handle);
    let finished = engine.await;
    renderer.abort();
    match finished {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Experience task failed"),
    }
    Ok(())
}

/// Press, drag across the viewport at `y`, then nudge once more after the
/// check throttle so the final coverage is measured.
async fn wipe_band(handle: &ExperienceHandle, width: u32, y: f32) -> Result<(), ExperienceError> {
    handle.send(ExperienceEvent::PointerDown).await?;
    for x in (0..=width).step_by(WIPE_STEP as usize) {
        handle.send(ExperienceEvent::PointerMove { x: x as f32, y }).await?;
    }
    tokio::time::sleep(Duration::from_millis(310)).await;
    handle
        .send(ExperienceEvent::PointerMove { x: width as f32, y })
        .await
}
