//! Playback statistics for the media source.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counts frames emitted by the appsink callbacks.
///
/// The counters are shared with the decode threads; everything else is local
/// to whoever logs. Cloning shares the counters.
#[derive(Clone, Debug)]
pub(super) struct SourceStats {
    audio_frames: Arc<AtomicU64>,
    video_frames: Arc<AtomicU64>,
    last_log: Instant,
    last_total: u64,
}

impl SourceStats {
    pub fn new() -> Self {
        Self {
            audio_frames: Arc::new(AtomicU64::new(0)),
            video_frames: Arc::new(AtomicU64::new(0)),
            last_log: Instant::now(),
            last_total: 0,
        }
    }

    /// Counter handle for the audio appsink callback.
    pub fn audio_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.audio_frames)
    }

    /// Counter handle for the video appsink callback.
    pub fn video_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.video_frames)
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames.load(Ordering::Relaxed)
    }

    pub fn video_frames(&self) -> u64 {
        self.video_frames.load(Ordering::Relaxed)
    }

    /// Log emitted-frame totals if the interval elapsed and anything moved.
    pub fn maybe_log(&mut self, interval: Duration) {
        if self.last_log.elapsed() < interval {
            return;
        }

        let audio = self.audio_frames();
        let video = self.video_frames();
        let total = audio + video;
        if total == self.last_total {
            // Nothing decoded since the last report; stay quiet.
            return;
        }

        log::info!("Source stats: {} audio / {} video frames emitted", audio, video);
        self.last_total = total;
        self.last_log = Instant::now();
    }
}

impl Default for SourceStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_counters() {
        let stats = SourceStats::new();
        stats.audio_handle().fetch_add(3, Ordering::Relaxed);
        stats.video_handle().fetch_add(1, Ordering::Relaxed);

        assert_eq!(stats.audio_frames(), 3);
        assert_eq!(stats.video_frames(), 1);

        let clone = stats.clone();
        clone.audio_handle().fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.audio_frames(), 4);
    }
}
