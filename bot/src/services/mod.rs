//! Clients for the external AI services the bot delegates to.
//!
//! Both services sit behind a trait so the pipeline stages never depend on
//! a concrete vendor:
//!
//! - `tts`: text to speech. Ships an ElevenLabs HTTP client producing raw
//!   16 kHz mono PCM.
//! - `vision`: image description. Ships a client for a local HTTP inference
//!   endpoint.
//!
//! Request failures are logged and swallowed by the pipeline stages; a
//! flaky service degrades the captions, it does not stop playback.

mod tts;
mod vision;

pub use tts::{ElevenLabsSpeech, SpeechBackend, SpeechSynthesizer};
pub use vision::{HttpVision, VisionBackend, VisionDescriber};
