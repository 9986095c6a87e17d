//! Vision inference: image descriptions for caption and speech output.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::{Frame, TextFrame};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::pipeline::FrameProcessor;

/// A vision inference service.
#[async_trait]
pub trait VisionBackend: Send {
    /// Describe raw RGB pixels following `prompt`.
    async fn describe(
        &self,
        prompt: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<String>;
}

#[derive(Serialize)]
struct DescribeRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    /// Base64-encoded raw RGB pixels.
    image: String,
}

#[derive(Deserialize)]
struct DescribeResponse {
    text: String,
}

/// HTTP client for a vision inference endpoint.
///
/// Posts the prompt plus base64-encoded pixels as JSON and expects a
/// `{"text": "..."}` reply. Meant for a local model server, so there is no
/// auth; the endpoint is configuration.
pub struct HttpVision {
    client: Client,
    endpoint: String,
}

impl HttpVision {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl VisionBackend for HttpVision {
    async fn describe(
        &self,
        prompt: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<String> {
        let request = DescribeRequest {
            prompt,
            width,
            height,
            image: STANDARD.encode(pixels),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("vision request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("vision service returned {status}: {body}");
        }

        let parsed: DescribeResponse = response
            .json()
            .await
            .context("failed to parse vision response")?;
        Ok(parsed.text)
    }
}

/// Pipeline stage answering vision requests with text descriptions.
///
/// Consumes each vision request and emits the description as a text frame;
/// every other frame passes through. A failed request is logged and yields
/// nothing.
pub struct VisionDescriber {
    backend: Box<dyn VisionBackend>,
}

impl VisionDescriber {
    pub fn new(backend: Box<dyn VisionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FrameProcessor for VisionDescriber {
    async fn process_frame(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::VisionRequest(req) => {
                match self
                    .backend
                    .describe(&req.prompt, &req.pixels, req.width, req.height)
                    .await
                {
                    Ok(description) => {
                        log::info!("Vision description: {description:?}");
                        Ok(vec![Frame::Text(TextFrame::new(description))])
                    }
                    Err(e) => {
                        log::error!("Vision inference failed: {e:#}");
                        Ok(Vec::new())
                    }
                }
            }
            other => Ok(vec![other]),
        }
    }

    fn name(&self) -> &'static str {
        "vision"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ImageFrame, VisionRequestFrame};

    struct Echo;

    #[async_trait]
    impl VisionBackend for Echo {
        async fn describe(
            &self,
            prompt: &str,
            pixels: &[u8],
            width: u32,
            height: u32,
        ) -> Result<String> {
            Ok(format!("{prompt}/{}b/{width}x{height}", pixels.len()))
        }
    }

    struct Failing;

    #[async_trait]
    impl VisionBackend for Failing {
        async fn describe(
            &self,
            _prompt: &str,
            _pixels: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<String> {
            bail!("model offline")
        }
    }

    fn request() -> Frame {
        let image = ImageFrame::new(vec![0; 12], 2, 2);
        Frame::VisionRequest(VisionRequestFrame::from_image("what is this", &image))
    }

    #[tokio::test]
    async fn test_request_becomes_text() {
        let mut stage = VisionDescriber::new(Box::new(Echo));
        let out = stage.process_frame(request()).await.unwrap();
        assert_eq!(
            out,
            vec![Frame::Text(TextFrame::new("what is this/12b/2x2"))]
        );
    }

    #[tokio::test]
    async fn test_failure_yields_nothing() {
        let mut stage = VisionDescriber::new(Box::new(Failing));
        let out = stage.process_frame(request()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_image_passes_through() {
        let mut stage = VisionDescriber::new(Box::new(Failing));
        let image = Frame::Image(ImageFrame::new(vec![1; 3], 1, 1));
        let out = stage.process_frame(image.clone()).await.unwrap();
        assert_eq!(out, vec![image]);
    }

    #[test]
    fn test_describe_request_serializes_pixels_as_base64() {
        let req = DescribeRequest {
            prompt: "p",
            width: 1,
            height: 1,
            image: STANDARD.encode([255u8, 0, 0]),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["image"], "/wAA");
        assert_eq!(json["prompt"], "p");
    }
}
