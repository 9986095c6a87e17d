//! Playback lifecycle for the media file source.
//!
//! [`FileSource`] owns the decode graph built by the `graph` module and
//! walks it through an explicit state machine:
//!
//! ```text
//! (constructor) -> Built -> Playing -> Stopped
//!                                  \-> Error
//! ```
//!
//! Construction either yields a fully wired graph or a
//! [`MediaError::Configuration`] and no graph at all. Backend failures
//! reported on the graph's message bus during playback are logged with their
//! diagnostic detail and surfaced to the owner as [`SourceEvent`]s; the
//! configured [`ErrorPolicy`] decides whether playback survives them.

use common::{Frame, MediaError};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::graph;
use super::stats::SourceStats;

/// How often the bus watcher polls the graph's message bus.
const BUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often emitted-frame statistics are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(3);

/// Bounded wait for the graph to reach Null during teardown.
const TEARDOWN_TIMEOUT_SECS: u64 = 2;

/// Playback lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Graph wired, not yet started.
    Built,
    /// Graph running; frames flow to the sink queue.
    Playing,
    /// Graph torn down cleanly (explicit stop or end of stream).
    Stopped,
    /// Graph torn down after an unrecoverable backend error.
    Error,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Built => "built",
            Self::Playing => "playing",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// What to do when the decode backend reports an error during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Tear the graph down and surface the error. The default: a silently
    /// dead media stream is worse than a stopped bot.
    #[default]
    FailFast,
    /// Log and surface the error but keep the graph in its current state.
    BestEffort,
}

/// Status events surfaced to the source's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The file played to its end; the graph has been torn down.
    EndOfStream,
    /// The decode backend reported an error. Under
    /// [`ErrorPolicy::FailFast`] the graph is already torn down when this
    /// arrives.
    BackendError(String),
}

/// Decodes a local media file into normalized frames on the sink queue.
#[derive(Debug)]
pub struct FileSource {
    pipeline: gst::Pipeline,
    state: Arc<Mutex<PlaybackState>>,
    stats: SourceStats,
    sinks: Arc<Mutex<Vec<gst_app::AppSink>>>,
    stop_flag: Arc<AtomicBool>,
    events: Option<mpsc::UnboundedReceiver<SourceEvent>>,
}

impl FileSource {
    /// Build the decode graph for `path`, emitting frames into `sink`.
    ///
    /// The graph is wired but idle until [`start`](Self::start) is called.
    /// Must run inside a tokio runtime (the bus watcher is spawned here).
    ///
    /// # Errors
    ///
    /// [`MediaError::Configuration`] when the file does not exist or the
    /// decode backend cannot be initialized; no graph exists afterwards.
    pub fn new(
        path: impl AsRef<Path>,
        sink: mpsc::UnboundedSender<Frame>,
        policy: ErrorPolicy,
    ) -> Result<Self, MediaError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MediaError::Configuration(format!(
                "media file not found: {}",
                path.display()
            )));
        }
        let location = path.to_str().ok_or_else(|| {
            MediaError::Configuration(format!("media path is not valid UTF-8: {}", path.display()))
        })?;

        graph::initialize()?;

        log::info!("Building decode graph for: {}", path.display());
        let (pipeline, decodebin) = graph::build(location)?;

        let stats = SourceStats::new();
        let sinks = Arc::new(Mutex::new(Vec::new()));
        graph::connect_stream_discovery(&pipeline, &decodebin, sink, &stats, Arc::clone(&sinks));

        let bus = pipeline.bus().ok_or_else(|| {
            MediaError::Configuration("decode graph has no message bus".to_string())
        })?;

        let state = Arc::new(Mutex::new(PlaybackState::Built));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(watch_bus(
            bus,
            pipeline.clone(),
            Arc::clone(&state),
            Arc::clone(&stop_flag),
            event_tx,
            policy,
            stats.clone(),
        ));

        Ok(Self {
            pipeline,
            state,
            stats,
            sinks,
            stop_flag,
            events: Some(event_rx),
        })
    }

    /// Take the status event receiver. Yields `Some` exactly once.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<SourceEvent>> {
        self.events.take()
    }

    /// Current lifecycle state.
    #[allow(dead_code)] // Part of public API for state queries
    pub fn state(&self) -> PlaybackState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PlaybackState::Error)
    }

    /// Transition the graph to playing.
    ///
    /// A no-op when already playing. Fails once the graph has been torn
    /// down (stopped or errored).
    pub fn start(&self) -> Result<(), MediaError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| MediaError::Backend("playback state lock poisoned".to_string()))?;

        match *state {
            PlaybackState::Playing => {
                log::debug!("start() called while already playing");
                return Ok(());
            }
            PlaybackState::Built => {}
            PlaybackState::Stopped | PlaybackState::Error => {
                return Err(MediaError::Backend(format!(
                    "cannot start playback from {} state",
                    *state
                )));
            }
        }

        log::info!("Starting playback");
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MediaError::Backend(format!("failed to start decode graph: {e}")))?;
        *state = PlaybackState::Playing;
        Ok(())
    }

    /// Tear the graph down with a bounded wait. Idempotent.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);

        if let Ok(mut state) = self.state.lock() {
            if matches!(*state, PlaybackState::Stopped | PlaybackState::Error) {
                return;
            }
            *state = PlaybackState::Stopped;
        }

        log::info!("Stopping playback");

        // Detach the sink callbacks so no frames are produced mid-teardown.
        if let Ok(mut sinks) = self.sinks.lock() {
            for sink in sinks.drain(..) {
                sink.set_callbacks(gst_app::AppSinkCallbacks::builder().build());
            }
        }

        teardown(&self.pipeline);

        log::info!(
            "Playback stopped after {} audio / {} video frames",
            self.stats.audio_frames(),
            self.stats.video_frames()
        );
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Set the graph to Null, wait out the transition, and drain the bus.
fn teardown(pipeline: &gst::Pipeline) {
    match pipeline.set_state(gst::State::Null) {
        Ok(_) => {
            let (result, current, pending) =
                pipeline.state(Some(gst::ClockTime::from_seconds(TEARDOWN_TIMEOUT_SECS)));
            match result {
                Ok(_) => log::debug!("Graph final state: current={current:?}, pending={pending:?}"),
                Err(e) => log::warn!("Graph did not settle during teardown: {e:?}"),
            }
        }
        Err(e) => log::warn!("Failed to set graph state to Null: {e}"),
    }

    if let Some(bus) = pipeline.bus() {
        while bus.pop().is_some() {}
    }
}

/// Poll the graph's message bus until playback ends.
///
/// All messages are drained every tick; errors and end-of-stream are acted
/// on, everything else is discarded. Periodically logs emitted-frame stats
/// while frames are flowing.
async fn watch_bus(
    bus: gst::Bus,
    pipeline: gst::Pipeline,
    state: Arc<Mutex<PlaybackState>>,
    stop_flag: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SourceEvent>,
    policy: ErrorPolicy,
    mut stats: SourceStats,
) {
    let mut ticker = tokio::time::interval(BUS_POLL_INTERVAL);

    loop {
        ticker.tick().await;
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    log::error!(
                        "Decode backend error: {} (debug: {:?})",
                        err.error(),
                        err.debug()
                    );
                    let detail = err.error().to_string();
                    match policy {
                        ErrorPolicy::FailFast => {
                            teardown(&pipeline);
                            set_state(&state, PlaybackState::Error);
                            let _ = events.send(SourceEvent::BackendError(detail));
                            stop_flag.store(true, Ordering::Relaxed);
                        }
                        ErrorPolicy::BestEffort => {
                            let _ = events.send(SourceEvent::BackendError(detail));
                        }
                    }
                }
                gst::MessageView::Eos(_) => {
                    log::info!("Playback reached end of stream");
                    teardown(&pipeline);
                    set_state(&state, PlaybackState::Stopped);
                    let _ = events.send(SourceEvent::EndOfStream);
                    stop_flag.store(true, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        stats.maybe_log(STATS_INTERVAL);
    }
}

fn set_state(state: &Arc<Mutex<PlaybackState>>, next: PlaybackState) {
    if let Ok(mut s) = state.lock() {
        *s = next;
    }
}
