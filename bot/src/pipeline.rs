//! Frame-processing pipeline runtime.
//!
//! A [`Pipeline`] is an ordered list of [`FrameProcessor`]s driven by a
//! single cooperative task: frames arrive on the source queue, cascade
//! through the processors in order, and the survivors are forwarded to the
//! transport's outgoing queue. Each processor maps one input frame to a
//! possibly-empty sequence of output frames; the outputs of stage `i` become
//! the inputs of stage `i + 1`.
//!
//! Processors that talk to external services are expected to log their own
//! request failures and return an empty batch instead of erroring; only
//! hard, unrecoverable errors should propagate out of `process_frame` and
//! stop the pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::Frame;
use tokio::sync::mpsc;

/// A single stage of the frame pipeline.
#[async_trait]
pub trait FrameProcessor: Send {
    /// Process one frame, producing zero or more output frames.
    ///
    /// Ownership of `frame` transfers in; a stage that only inspects a
    /// frame re-emits it unchanged.
    async fn process_frame(&mut self, frame: Frame) -> Result<Vec<Frame>>;

    /// Stage name for diagnostics.
    fn name(&self) -> &'static str;
}

/// An ordered chain of frame processors.
pub struct Pipeline {
    processors: Vec<Box<dyn FrameProcessor>>,
}

impl Pipeline {
    pub fn new(processors: Vec<Box<dyn FrameProcessor>>) -> Self {
        Self { processors }
    }

    /// Drive frames from `input` through every stage and into `output`.
    ///
    /// Runs until the input channel closes (source dropped its sender) or
    /// the output channel closes (transport gone), then returns. All stages
    /// run on this one task; there is no intra-pipeline parallelism, so
    /// frame order is preserved end to end.
    pub async fn run(
        mut self,
        mut input: mpsc::UnboundedReceiver<Frame>,
        output: mpsc::UnboundedSender<Frame>,
    ) -> Result<()> {
        log::info!(
            "Pipeline running with {} stage(s): {}",
            self.processors.len(),
            self.stage_names().join(" -> ")
        );

        while let Some(frame) = input.recv().await {
            let mut batch = vec![frame];

            for processor in &mut self.processors {
                let mut next = Vec::new();
                for frame in batch {
                    let produced = processor
                        .process_frame(frame)
                        .await
                        .with_context(|| format!("stage {} failed", processor.name()))?;
                    next.extend(produced);
                }
                batch = next;
                if batch.is_empty() {
                    break;
                }
            }

            for frame in batch {
                if output.send(frame).is_err() {
                    log::info!("Pipeline output closed, stopping");
                    return Ok(());
                }
            }
        }

        log::info!("Pipeline input closed, stopping");
        Ok(())
    }

    fn stage_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TextFrame;

    /// Re-emits every text frame twice.
    struct Doubler;

    #[async_trait]
    impl FrameProcessor for Doubler {
        async fn process_frame(&mut self, frame: Frame) -> Result<Vec<Frame>> {
            Ok(vec![frame.clone(), frame])
        }

        fn name(&self) -> &'static str {
            "doubler"
        }
    }

    /// Swallows every frame.
    struct Sink;

    #[async_trait]
    impl FrameProcessor for Sink {
        async fn process_frame(&mut self, _frame: Frame) -> Result<Vec<Frame>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "sink"
        }
    }

    fn text(s: &str) -> Frame {
        Frame::Text(TextFrame::new(s))
    }

    #[tokio::test]
    async fn test_cascade_order() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        let pipeline = Pipeline::new(vec![Box::new(Doubler), Box::new(Doubler)]);
        in_tx.send(text("a")).unwrap();
        in_tx.send(text("b")).unwrap();
        drop(in_tx);

        pipeline.run(in_rx, out_tx).await.unwrap();

        let mut got = Vec::new();
        while let Some(frame) = out_rx.recv().await {
            got.push(frame);
        }
        // Two doubling stages: each input frame comes out four times, and
        // "a" outputs all precede "b" outputs.
        assert_eq!(got.len(), 8);
        assert!(got[..4].iter().all(|f| *f == text("a")));
        assert!(got[4..].iter().all(|f| *f == text("b")));
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        let pipeline = Pipeline::new(vec![Box::new(Sink), Box::new(Doubler)]);
        in_tx.send(text("dropped")).unwrap();
        drop(in_tx);

        pipeline.run(in_rx, out_tx).await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_passthrough() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        let pipeline = Pipeline::new(Vec::new());
        in_tx.send(text("x")).unwrap();
        drop(in_tx);

        pipeline.run(in_rx, out_tx).await.unwrap();
        assert_eq!(out_rx.recv().await, Some(text("x")));
        assert!(out_rx.recv().await.is_none());
    }
}
