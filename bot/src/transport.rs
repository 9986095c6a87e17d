//! Call transport seam.
//!
//! The bot only ever touches the call through a narrow surface: frames go
//! into the room over an mpsc channel and session events come back out.
//! `main` owns both channel ends and wires them up; the transport's job is
//! to deliver the pipeline's output into the room (audio to the microphone
//! track, images to the camera track, app messages to the data channel) and
//! to report when the first participant shows up, the signal that starts
//! playback. The actual signaling and media transport behind that surface
//! is someone else's problem.
//!
//! [`LoopbackTransport`] is the in-process implementation used for local
//! runs and tests: it simulates a participant joining and accounts for the
//! frames it would have transmitted.

use anyhow::Result;
use async_trait::async_trait;
use common::Frame;
use std::time::Duration;
use tokio::sync::mpsc;

/// Session events surfaced by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Another participant joined the room for the first time.
    FirstParticipantJoined,
    /// The transport left the room (session limit or outgoing side closed).
    SessionEnded,
}

/// A connection to a call room.
#[async_trait]
pub trait Transport: Send {
    /// Session event stream. Yields `Some` exactly once.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Deliver pipeline output into the room until the outgoing channel
    /// closes or the session duration limit is reached.
    async fn run(&mut self, outgoing: mpsc::UnboundedReceiver<Frame>) -> Result<()>;
}

/// Transport stand-in that stays on this machine.
///
/// Joins nothing: after `join_delay` it reports a first participant so the
/// usual start path runs, then logs and counts whatever the pipeline sends.
pub struct LoopbackTransport {
    bot_name: String,
    join_delay: Duration,
    session_limit: Duration,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl LoopbackTransport {
    pub fn new(bot_name: impl Into<String>, join_delay: Duration, session_limit: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            bot_name: bot_name.into(),
            join_delay,
            session_limit,
            event_tx,
            event_rx: Some(event_rx),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.take()
    }

    async fn run(&mut self, mut outgoing: mpsc::UnboundedReceiver<Frame>) -> Result<()> {
        log::info!("\"{}\" joined the room (loopback transport)", self.bot_name);

        let event_tx = self.event_tx.clone();
        let join_delay = self.join_delay;
        tokio::spawn(async move {
            tokio::time::sleep(join_delay).await;
            let _ = event_tx.send(TransportEvent::FirstParticipantJoined);
        });

        let deadline = tokio::time::sleep(self.session_limit);
        tokio::pin!(deadline);

        let mut audio_bytes: u64 = 0;
        let mut image_frames: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    log::info!("Session duration limit reached");
                    break;
                }
                frame = outgoing.recv() => {
                    let Some(frame) = frame else {
                        break;
                    };
                    match frame {
                        Frame::Audio(audio) => {
                            // Microphone track.
                            audio_bytes += audio.samples.len() as u64;
                        }
                        Frame::Image(_) => {
                            // Camera track.
                            image_frames += 1;
                        }
                        Frame::AppMessage(msg) => {
                            let json = serde_json::to_string(&msg)?;
                            log::info!("Data channel message: {json}");
                        }
                        other => {
                            log::debug!("Dropping {} frame at transport", other.kind());
                        }
                    }
                }
            }
        }

        log::info!(
            "\"{}\" left the room after {} audio bytes and {} video frames",
            self.bot_name,
            audio_bytes,
            image_frames
        );
        let _ = self.event_tx.send(TransportEvent::SessionEnded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AppMessage, AudioFrame, TextFrame};

    #[tokio::test]
    async fn test_join_event_fires() {
        let mut transport =
            LoopbackTransport::new("bot", Duration::from_millis(1), Duration::from_secs(60));
        let mut events = transport.take_events().unwrap();
        assert!(transport.take_events().is_none());

        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { transport.run(out_rx).await });

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::FirstParticipantJoined)
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_run_ends_when_outgoing_closes() {
        let mut transport =
            LoopbackTransport::new("bot", Duration::from_millis(1), Duration::from_secs(60));
        let mut events = transport.take_events().unwrap();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        out_tx
            .send(Frame::Audio(AudioFrame::new(vec![0; 64])))
            .unwrap();
        out_tx
            .send(Frame::AppMessage(AppMessage::caption("hi")))
            .unwrap();
        out_tx.send(Frame::Text(TextFrame::new("ignored"))).unwrap();
        drop(out_tx);

        transport.run(out_rx).await.unwrap();

        // Both the join and the session-end notifications arrive; their
        // relative order depends on how fast the outgoing side drained.
        let got = [events.recv().await.unwrap(), events.recv().await.unwrap()];
        assert!(got.contains(&TransportEvent::FirstParticipantJoined));
        assert!(got.contains(&TransportEvent::SessionEnded));
    }

    #[tokio::test]
    async fn test_run_ends_at_session_limit() {
        let mut transport =
            LoopbackTransport::new("bot", Duration::from_secs(60), Duration::from_millis(20));
        let (_out_tx, out_rx) = mpsc::unbounded_channel();

        // The outgoing channel never closes; the session limit must end the
        // run on its own.
        transport.run(out_rx).await.unwrap();
    }
}
