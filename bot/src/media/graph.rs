//! GStreamer decode-graph construction.
//!
//! The static part of the graph is `filesrc ! decodebin`; everything past
//! the demuxer is attached dynamically as elementary streams are discovered.
//! Each discovered stream gets its own normalizer chain ending in an appsink
//! whose callback hands frames to the bot over an unbounded channel.

use anyhow::{Context, Result, anyhow};
use common::{
    AUDIO_CHANNELS, AUDIO_SAMPLE_RATE, AudioFrame, Frame, ImageFrame, MediaError, VIDEO_HEIGHT,
    VIDEO_WIDTH,
};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::stats::SourceStats;

/// Initialize GStreamer. Idempotent, safe to call per source instance.
pub(super) fn initialize() -> Result<(), MediaError> {
    gst::init()
        .map_err(|e| MediaError::Configuration(format!("GStreamer init failed: {e}")))?;

    static LOGGED: std::sync::Once = std::sync::Once::new();
    LOGGED.call_once(|| {
        log::info!("GStreamer initialized");
    });
    Ok(())
}

/// The media kinds the bot feeds into a call.
///
/// Stream discovery resolves a pad's negotiated caps to one of these exactly
/// once; any other kind is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    /// Classify a caps structure name like `audio/x-raw` or `video/x-h264`.
    pub fn from_caps_name(name: &str) -> Option<Self> {
        if name.starts_with("audio/") {
            Some(Self::Audio)
        } else if name.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Build the static part of the decode graph: `filesrc ! decodebin`.
///
/// Returns the graph plus the demuxer element, so the caller can register
/// stream discovery before playback starts.
pub(super) fn build(location: &str) -> Result<(gst::Pipeline, gst::Element), MediaError> {
    let pipeline = gst::Pipeline::new();

    let source = gst::ElementFactory::make("filesrc")
        .property("location", location)
        .build()
        .map_err(|e| MediaError::Configuration(format!("failed to create filesrc: {e}")))?;

    let decodebin = gst::ElementFactory::make("decodebin")
        .build()
        .map_err(|e| MediaError::Configuration(format!("failed to create decodebin: {e}")))?;

    pipeline
        .add_many([&source, &decodebin])
        .map_err(|e| MediaError::Configuration(format!("failed to assemble decode graph: {e}")))?;
    source
        .link(&decodebin)
        .map_err(|e| MediaError::Configuration(format!("failed to link decode graph: {e}")))?;

    Ok((pipeline, decodebin))
}

/// Register the demuxer's stream-discovery callback.
///
/// Runs on the decode backend's thread whenever `decodebin` exposes a new
/// elementary stream. The first audio stream and the first video stream each
/// get a normalizer chain; further streams of an already-attached kind are
/// ignored, as is anything that is neither audio nor video. This callback is
/// the only writer that mutates the graph after construction.
pub(super) fn connect_stream_discovery(
    pipeline: &gst::Pipeline,
    decodebin: &gst::Element,
    sender: mpsc::UnboundedSender<Frame>,
    stats: &SourceStats,
    sinks: Arc<Mutex<Vec<gst_app::AppSink>>>,
) {
    let pipeline_weak = pipeline.downgrade();
    let audio_attached = Arc::new(AtomicBool::new(false));
    let video_attached = Arc::new(AtomicBool::new(false));
    let audio_frames = stats.audio_handle();
    let video_frames = stats.video_handle();

    decodebin.connect_pad_added(move |_dbin, src_pad| {
        let caps = src_pad
            .current_caps()
            .unwrap_or_else(|| src_pad.query_caps(None));
        let Some(structure) = caps.structure(0) else {
            return;
        };
        let name = structure.name();

        let Some(kind) = StreamKind::from_caps_name(name) else {
            log::debug!("Ignoring stream of unsupported kind: {}", name);
            return;
        };
        let Some(pipeline) = pipeline_weak.upgrade() else {
            return;
        };

        let attached = match kind {
            StreamKind::Audio => &audio_attached,
            StreamKind::Video => &video_attached,
        };
        if attached.swap(true, Ordering::SeqCst) {
            log::warn!(
                "Ignoring additional {} stream ({}); one is already attached",
                kind.label(),
                name
            );
            return;
        }

        let counter = match kind {
            StreamKind::Audio => Arc::clone(&audio_frames),
            StreamKind::Video => Arc::clone(&video_frames),
        };

        match attach_chain(&pipeline, src_pad, kind, sender.clone(), counter, &sinks) {
            Ok(()) => log::info!("Attached {} stream: {}", kind.label(), name),
            Err(e) => log::error!("Failed to attach {} chain: {e:#}", kind.label()),
        }
    });
}

/// Instantiate and link the normalizer chain for one discovered stream.
///
/// The chain is `queue ! convert ! refit ! capsfilter ! appsink`, where
/// convert/refit are `audioconvert`/`audioresample` for audio and
/// `videoconvert`/`videoscale` for video. The new elements are synced to the
/// parent graph's state before the demuxer pad is linked, so a late-attached
/// chain does not stall a graph that is already playing.
fn attach_chain(
    pipeline: &gst::Pipeline,
    src_pad: &gst::Pad,
    kind: StreamKind,
    sender: mpsc::UnboundedSender<Frame>,
    counter: Arc<AtomicU64>,
    sinks: &Arc<Mutex<Vec<gst_app::AppSink>>>,
) -> Result<()> {
    let (convert, refit, caps) = match kind {
        StreamKind::Audio => (make("audioconvert")?, make("audioresample")?, audio_caps()),
        StreamKind::Video => (make("videoconvert")?, make("videoscale")?, video_caps()),
    };

    let queue = make("queue")?;
    let capsfilter = make("capsfilter")?;
    capsfilter.set_property("caps", &caps);

    let appsink = gst_app::AppSink::builder().build();
    install_sample_callback(&appsink, kind, sender, counter);

    let elements = [
        &queue,
        &convert,
        &refit,
        &capsfilter,
        appsink.upcast_ref::<gst::Element>(),
    ];
    pipeline
        .add_many(elements)
        .context("failed to add normalizer chain to graph")?;
    gst::Element::link_many(elements).context("failed to link normalizer chain")?;
    for element in elements {
        element
            .sync_state_with_parent()
            .context("failed to sync chain state with graph")?;
    }

    let sink_pad = queue
        .static_pad("sink")
        .context("queue element has no sink pad")?;
    src_pad
        .link(&sink_pad)
        .map_err(|e| anyhow!("failed to link demuxer pad: {e:?}"))?;

    if let Ok(mut sinks) = sinks.lock() {
        sinks.push(appsink);
    }
    Ok(())
}

/// Wire the appsink's new-sample callback to the frame channel.
///
/// The callback fires on decode-thread context. It copies the mapped buffer
/// into a frame and sends it without blocking; the channel is unbounded and
/// a closed channel (bot shutting down) is not an error worth surfacing to
/// the decoder, so the callback always returns flow-continue.
fn install_sample_callback(
    appsink: &gst_app::AppSink,
    kind: StreamKind,
    sender: mpsc::UnboundedSender<Frame>,
    counter: Arc<AtomicU64>,
) {
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                let data = map.as_slice().to_vec();

                let frame = match kind {
                    StreamKind::Audio => Frame::Audio(AudioFrame::new(data)),
                    StreamKind::Video => {
                        Frame::Image(ImageFrame::new(data, VIDEO_WIDTH, VIDEO_HEIGHT))
                    }
                };

                counter.fetch_add(1, Ordering::Relaxed);
                let _ = sender.send(frame);
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

fn make(factory: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .with_context(|| format!("failed to create {factory} element"))
}

fn audio_caps() -> gst::Caps {
    gst::Caps::builder("audio/x-raw")
        .field("format", "S16LE")
        .field("rate", AUDIO_SAMPLE_RATE as i32)
        .field("channels", AUDIO_CHANNELS as i32)
        .field("layout", "interleaved")
        .build()
}

fn video_caps() -> gst::Caps {
    gst_video::VideoCapsBuilder::new()
        .format(gst_video::VideoFormat::Rgb)
        .width(VIDEO_WIDTH as i32)
        .height(VIDEO_HEIGHT as i32)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_kind_classification() {
        assert_eq!(
            StreamKind::from_caps_name("audio/x-raw"),
            Some(StreamKind::Audio)
        );
        assert_eq!(
            StreamKind::from_caps_name("audio/mpeg"),
            Some(StreamKind::Audio)
        );
        assert_eq!(
            StreamKind::from_caps_name("video/x-raw"),
            Some(StreamKind::Video)
        );
        assert_eq!(
            StreamKind::from_caps_name("video/x-h264"),
            Some(StreamKind::Video)
        );
        assert_eq!(StreamKind::from_caps_name("text/x-raw"), None);
        assert_eq!(StreamKind::from_caps_name("application/x-id3"), None);
        // Prefix match must be on the full class, not the word.
        assert_eq!(StreamKind::from_caps_name("audiofoo"), None);
    }

    #[test]
    fn test_stream_kind_labels() {
        assert_eq!(StreamKind::Audio.label(), "audio");
        assert_eq!(StreamKind::Video.label(), "video");
    }
}
