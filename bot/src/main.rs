mod config;
mod filters;
mod media;
mod pipeline;
mod services;
mod transport;


use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::sync::mpsc;

use config::Config;
use filters::{CaptionRelay, VisionGate};
use media::{ErrorPolicy, FileSource, SourceEvent};
use pipeline::Pipeline;
use services::{ElevenLabsSpeech, HttpVision, SpeechSynthesizer, VisionDescriber};
use transport::{LoopbackTransport, Transport, TransportEvent};

/// How long the loopback transport waits before reporting a participant.
const JOIN_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    log::info!("Starting Roomcast v{}", env!("CARGO_PKG_VERSION"));
    log::info!("  Room: {}", config.url);
    log::info!(
        "  Token: {}",
        if config.token.is_empty() {
            "none"
        } else {
            "provided"
        }
    );
    log::info!("  Media file: {}", config.file.display());
    log::info!("  Vision period: {}s", config.vision_period);
    log::info!("  Vision endpoint: {}", config.vision_url);
    log::info!("  Session limit: {} minute(s)", config.duration_minutes);
    log::info!("  Error policy: {:?}", config.error_policy());

    let mut transport = LoopbackTransport::new(
        config.bot_name.clone(),
        JOIN_DELAY,
        Duration::from_secs(config.duration_minutes * 60),
    );
    let mut transport_events = transport
        .take_events()
        .expect("Transport events taken twice");

    // Receive queue: media source -> pipeline. Outgoing: pipeline -> room.
    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let pipeline = Pipeline::new(vec![
        Box::new(VisionGate::new(Duration::from_secs(config.vision_period))),
        Box::new(VisionDescriber::new(Box::new(HttpVision::new(
            config.vision_url.clone(),
        )))),
        Box::new(CaptionRelay),
        Box::new(SpeechSynthesizer::new(Box::new(ElevenLabsSpeech::new(
            config.elevenlabs_api_key.clone(),
            config.voice_id.clone(),
        )))),
    ]);

    let mut source = FileSource::new(&config.file, sink_tx, config.error_policy())?;
    let mut source_events = source.events().expect("Source events taken twice");

    let pipeline_handle = tokio::spawn(async move {
        if let Err(e) = pipeline.run(sink_rx, out_tx).await {
            log::error!("Pipeline error: {e:#}");
        }
    });

    let transport_handle = tokio::spawn(async move {
        if let Err(e) = transport.run(out_rx).await {
            log::error!("Transport error: {e:#}");
        }
    });

    // Set up signal handlers
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");

    loop {
        tokio::select! {
            Some(event) = transport_events.recv() => match event {
                TransportEvent::FirstParticipantJoined => {
                    log::info!("First participant joined, starting playback");
                    if let Err(e) = source.start() {
                        log::error!("Failed to start playback: {e}");
                        break;
                    }
                }
                TransportEvent::SessionEnded => {
                    log::info!("Call session ended");
                    break;
                }
            },
            Some(event) = source_events.recv() => match event {
                SourceEvent::EndOfStream => {
                    log::info!("Media file finished");
                    break;
                }
                SourceEvent::BackendError(detail) => {
                    log::error!("Decode backend reported: {detail}");
                    if config.error_policy() == ErrorPolicy::FailFast {
                        break;
                    }
                }
            },
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
                break;
            }
            else => break,
        }
    }

    source.stop();
    // Dropping the source releases the graph and with it the last receive
    // queue sender, so the pipeline drains and both tasks wind down.
    drop(source);

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = pipeline_handle.await;
        let _ = transport_handle.await;
    })
    .await;
    if drained.is_err() {
        log::warn!("Pipeline did not drain within 5s, exiting anyway");
    }

    log::info!("Roomcast shutting down");
    Ok(())
}
