use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub video_frames: u64,
    pub audio_frames: u64,
    /// Header and payload bytes of every packet received.
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
pub struct ClientStats {
    video_frames: AtomicU64,
    audio_frames: AtomicU64,
    bytes_received: AtomicU64,
}

impl ClientStats {
    pub(crate) fn record_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_video(&self) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_audio(&self) {
        self.audio_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            video_frames: self.video_frames.load(Ordering::Relaxed),
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.video_frames.store(0, Ordering::Relaxed);
        self.audio_frames.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
    }
}
