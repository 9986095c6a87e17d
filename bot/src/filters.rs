//! Pipeline-side frame filters.
//!
//! Two small stages sit between the media source and the AI services:
//!
//! - [`VisionGate`] rate-limits vision requests: at most one per period,
//!   derived from the image frames flowing past it.
//! - [`CaptionRelay`] copies every text frame onto the call's data channel
//!   as an application message, keeping the text flowing downstream.

use anyhow::Result;
use async_trait::async_trait;
use common::{AppMessage, Frame, VisionRequestFrame};
use std::time::{Duration, Instant};

use crate::pipeline::FrameProcessor;

/// Prompt attached to every vision request.
const VISION_PROMPT: &str = "Describe what you see in a very short sentence";

/// Emits a vision request for at most one image frame per period.
///
/// Every image frame passes through unchanged; when at least `period` has
/// elapsed since the last request (or no request has been made yet), the
/// frame is additionally wrapped into a [`VisionRequestFrame`] emitted ahead
/// of it.
pub struct VisionGate {
    period: Duration,
    last_trigger: Option<Instant>,
}

impl VisionGate {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_trigger: None,
        }
    }

    /// Debounce decision, split out so the clock can be driven in tests.
    fn should_trigger(&mut self, now: Instant) -> bool {
        let due = match self.last_trigger {
            None => true,
            Some(last) => now.duration_since(last) >= self.period,
        };
        if due {
            self.last_trigger = Some(now);
        }
        due
    }
}

#[async_trait]
impl FrameProcessor for VisionGate {
    async fn process_frame(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::Image(image) => {
                if self.should_trigger(Instant::now()) {
                    log::debug!(
                        "Requesting vision description for {}x{} frame",
                        image.width,
                        image.height
                    );
                    let request = VisionRequestFrame::from_image(VISION_PROMPT, &image);
                    Ok(vec![Frame::VisionRequest(request), Frame::Image(image)])
                } else {
                    Ok(vec![Frame::Image(image)])
                }
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "vision-gate"
    }
}

/// Mirrors text frames onto the data channel as caption app messages.
///
/// Each text frame produces exactly two outputs, in order: the caption
/// [`AppMessage`] wrapping the text, then the original frame unchanged.
pub struct CaptionRelay;

#[async_trait]
impl FrameProcessor for CaptionRelay {
    async fn process_frame(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::Text(text) => {
                let caption = AppMessage::caption(text.text.clone());
                Ok(vec![Frame::AppMessage(caption), Frame::Text(text)])
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "caption-relay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AudioFrame, ImageFrame, TextFrame};

    fn image() -> Frame {
        Frame::Image(ImageFrame::new(vec![3; 27], 3, 3))
    }

    #[test]
    fn test_gate_debounce_schedule() {
        // Frames at 0s, 4s, 11s, 15s with a 10s period: triggers at 0s and
        // 11s only.
        let mut gate = VisionGate::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(gate.should_trigger(t0));
        assert!(!gate.should_trigger(t0 + Duration::from_secs(4)));
        assert!(gate.should_trigger(t0 + Duration::from_secs(11)));
        assert!(!gate.should_trigger(t0 + Duration::from_secs(15)));
    }

    #[test]
    fn test_gate_triggers_exactly_at_period() {
        let mut gate = VisionGate::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(gate.should_trigger(t0));
        assert!(gate.should_trigger(t0 + Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_gate_emits_request_then_image() {
        let mut gate = VisionGate::new(Duration::from_secs(10));

        let out = gate.process_frame(image()).await.unwrap();
        assert_eq!(out.len(), 2);
        match &out[0] {
            Frame::VisionRequest(req) => {
                assert_eq!(req.prompt, VISION_PROMPT);
                assert_eq!(req.pixels, vec![3; 27]);
                assert_eq!((req.width, req.height), (3, 3));
            }
            other => panic!("expected vision request, got {}", other.kind()),
        }
        // The original image is re-emitted unchanged.
        assert_eq!(out[1], image());
    }

    #[tokio::test]
    async fn test_gate_passes_suppressed_image_unchanged() {
        let mut gate = VisionGate::new(Duration::from_secs(3600));

        let first = gate.process_frame(image()).await.unwrap();
        assert_eq!(first.len(), 2);

        let second = gate.process_frame(image()).await.unwrap();
        assert_eq!(second, vec![image()]);
    }

    #[tokio::test]
    async fn test_gate_ignores_non_image_frames() {
        let mut gate = VisionGate::new(Duration::from_secs(10));
        let audio = Frame::Audio(AudioFrame::new(vec![1, 2, 3, 4]));

        let out = gate.process_frame(audio.clone()).await.unwrap();
        assert_eq!(out, vec![audio]);
        // A non-image frame must not consume the trigger.
        assert!(gate.last_trigger.is_none());
    }

    #[tokio::test]
    async fn test_relay_wraps_then_forwards() {
        let mut relay = CaptionRelay;
        let text = Frame::Text(TextFrame::new("a boat on a lake"));

        let out = relay.process_frame(text.clone()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            Frame::AppMessage(AppMessage::caption("a boat on a lake"))
        );
        assert_eq!(out[1], text);
    }

    #[tokio::test]
    async fn test_relay_passes_other_frames() {
        let mut relay = CaptionRelay;
        let out = relay.process_frame(image()).await.unwrap();
        assert_eq!(out, vec![image()]);
    }
}
