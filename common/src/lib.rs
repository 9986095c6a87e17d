//! Common types for Roomcast.
//!
//! This crate defines the frame protocol shared by the media source, the
//! processing pipeline and the call transport: every stage exchanges
//! [`Frame`] values, and captions leave the pipeline as JSON-serialized
//! [`AppMessage`] payloads on the call's data channel.
//!
//! # Frame flow
//!
//! The media source decodes a local file into [`AudioFrame`]s and
//! [`ImageFrame`]s, already normalized to the fixed formats below. The
//! pipeline stages may consume a frame, replace it with derived frames, or
//! pass it through untouched. Frames are immutable once constructed and
//! ownership moves with them; a producer never touches a frame again after
//! handing it off.
//!
//! # Examples
//!
//! ```
//! use common::{AppMessage, Frame, TextFrame};
//!
//! let caption = AppMessage::caption("a dog chasing a ball");
//! let json = serde_json::to_string(&caption).unwrap();
//! assert!(json.contains("\"type\":\"gst\""));
//!
//! let frame = Frame::Text(TextFrame::new("hello"));
//! assert_eq!(frame.kind(), "text");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample rate every audio frame is normalized to.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Channel count every audio frame is normalized to.
pub const AUDIO_CHANNELS: u32 = 1;

/// Width every image frame is normalized to.
pub const VIDEO_WIDTH: u32 = 1024;

/// Height every image frame is normalized to.
pub const VIDEO_HEIGHT: u32 = 576;

/// Error types shared between the bot's components.
#[derive(Error, Debug)]
pub enum MediaError {
    /// A fatal setup problem: bad file path, decode backend unavailable.
    /// Raised at construction time, never during playback.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An asynchronous decode backend failure reported during playback.
    #[error("decode backend error: {0}")]
    Backend(String),

    /// An external AI service (speech, vision) failed a request.
    #[error("service error: {0}")]
    Service(String),

    /// The call transport rejected or dropped a delivery.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for MediaError {
    fn from(e: std::io::Error) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Raw audio samples, S16LE interleaved mono at [`AUDIO_SAMPLE_RATE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<u8>,
}

impl AudioFrame {
    pub fn new(samples: Vec<u8>) -> Self {
        Self { samples }
    }
}

/// Raw RGB pixels at a fixed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageFrame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }
}

/// A request for the vision service: describe `pixels` following `prompt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionRequestFrame {
    pub prompt: String,
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl VisionRequestFrame {
    /// Build a vision request from an image, copying its pixel payload.
    pub fn from_image(prompt: impl Into<String>, image: &ImageFrame) -> Self {
        Self {
            prompt: prompt.into(),
            pixels: image.pixels.clone(),
            width: image.width,
            height: image.height,
        }
    }
}

/// A piece of text moving through the pipeline (e.g. a vision description).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub text: String,
}

impl TextFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Out-of-band application message delivered to call participants over the
/// data channel.
///
/// The wire format is JSON with a `type` discriminator, matching what call
/// clients expect: `{"type":"gst","text":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl AppMessage {
    /// Caption message tag understood by the call clients.
    pub const CAPTION_KIND: &'static str = "gst";

    /// Build a caption message carrying `text`.
    pub fn caption(text: impl Into<String>) -> Self {
        Self {
            kind: Self::CAPTION_KIND.to_string(),
            text: text.into(),
        }
    }
}

/// The pipeline's unit of data exchange.
///
/// A closed tagged union: stages match on the variant they care about and
/// pass everything else through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Audio(AudioFrame),
    Image(ImageFrame),
    VisionRequest(VisionRequestFrame),
    Text(TextFrame),
    AppMessage(AppMessage),
}

impl Frame {
    /// Short variant name for diagnostics and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::Image(_) => "image",
            Self::VisionRequest(_) => "vision-request",
            Self::Text(_) => "text",
            Self::AppMessage(_) => "app-message",
        }
    }

    /// Payload size in bytes, for accounting.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Audio(f) => f.samples.len(),
            Self::Image(f) => f.pixels.len(),
            Self::VisionRequest(f) => f.pixels.len(),
            Self::Text(f) => f.text.len(),
            Self::AppMessage(m) => m.text.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_message_wire_format() {
        let msg = AppMessage::caption("a red bicycle");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"gst","text":"a red bicycle"}"#);

        let back: AppMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.kind, AppMessage::CAPTION_KIND);
    }

    #[test]
    fn test_frame_kind_names() {
        assert_eq!(Frame::Audio(AudioFrame::new(vec![0, 1])).kind(), "audio");
        assert_eq!(
            Frame::Image(ImageFrame::new(vec![0; 12], 2, 2)).kind(),
            "image"
        );
        assert_eq!(Frame::Text(TextFrame::new("hi")).kind(), "text");
        assert_eq!(
            Frame::AppMessage(AppMessage::caption("hi")).kind(),
            "app-message"
        );
    }

    #[test]
    fn test_vision_request_copies_image() {
        let image = ImageFrame::new(vec![7; 48], 4, 4);
        let req = VisionRequestFrame::from_image("describe", &image);

        assert_eq!(req.prompt, "describe");
        assert_eq!(req.pixels, image.pixels);
        assert_eq!((req.width, req.height), (image.width, image.height));
        // Original image is untouched and still usable downstream.
        assert_eq!(image.pixels.len(), 48);
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(
            Frame::Audio(AudioFrame::new(vec![0; 320])).payload_len(),
            320
        );
        assert_eq!(Frame::Text(TextFrame::new("abc")).payload_len(), 3);
    }

    #[test]
    fn test_media_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: MediaError = io_err.into();
        assert!(matches!(err, MediaError::Configuration(_)));
        assert!(err.to_string().contains("no such file"));
    }
}
