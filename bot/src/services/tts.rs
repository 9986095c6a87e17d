//! Speech synthesis: text frames in, audio frames out.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use common::{AudioFrame, Frame};
use reqwest::Client;
use serde_json::json;

use crate::pipeline::FrameProcessor;

/// 200 ms of S16LE mono PCM at 16 kHz.
const AUDIO_CHUNK_BYTES: usize = 6400;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";

/// A text-to-speech service.
///
/// Implementations return raw S16LE mono PCM at the bot's fixed sample
/// rate; the processor takes care of framing.
#[async_trait]
pub trait SpeechBackend: Send {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// ElevenLabs streaming TTS endpoint, requesting `pcm_16000` output so the
/// response drops straight into the bot's audio format.
pub struct ElevenLabsSpeech {
    client: Client,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsSpeech {
    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
        }
    }
}

#[async_trait]
impl SpeechBackend for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{ELEVENLABS_API_BASE}/text-to-speech/{}/stream?output_format=pcm_16000",
            self.voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": "eleven_turbo_v2",
            }))
            .send()
            .await
            .context("speech request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("speech service returned {status}: {body}");
        }

        let audio = response
            .bytes()
            .await
            .context("failed to read speech response body")?;
        Ok(audio.to_vec())
    }
}

/// Pipeline stage turning text frames into spoken audio frames.
///
/// Consumes the text (captions have already been relayed upstream) and
/// emits the synthesized PCM as fixed-size audio frames. A failed request
/// is logged and yields nothing.
pub struct SpeechSynthesizer {
    backend: Box<dyn SpeechBackend>,
}

impl SpeechSynthesizer {
    pub fn new(backend: Box<dyn SpeechBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FrameProcessor for SpeechSynthesizer {
    async fn process_frame(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::Text(text) => match self.backend.synthesize(&text.text).await {
                Ok(pcm) => {
                    log::debug!(
                        "Synthesized {} bytes of speech for: {:?}",
                        pcm.len(),
                        text.text
                    );
                    Ok(chunk_pcm(pcm)
                        .into_iter()
                        .map(|samples| Frame::Audio(AudioFrame::new(samples)))
                        .collect())
                }
                Err(e) => {
                    log::error!("Speech synthesis failed: {e:#}");
                    Ok(Vec::new())
                }
            },
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "speech"
    }
}

/// Split a PCM buffer into transmit-sized chunks, preserving order. The
/// final chunk keeps whatever remains.
fn chunk_pcm(pcm: Vec<u8>) -> Vec<Vec<u8>> {
    if pcm.is_empty() {
        return Vec::new();
    }
    pcm.chunks(AUDIO_CHUNK_BYTES)
        .map(|chunk| chunk.to_vec())
        .collect()
}
