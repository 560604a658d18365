use std::sync::{Arc, RwLock};

use crate::protocol::{AudioFrame, VideoFrame};

/// Gets the decoded frame and its pixel bytes, i.e. the payload past the video sub-header.
pub type VideoCallback = Arc<dyn Fn(&VideoFrame, &[u8]) + Send + Sync>;
/// Gets the decoded frame and the raw little-endian sample bytes.
pub type AudioCallback = Arc<dyn Fn(&AudioFrame, &[u8]) + Send + Sync>;
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Registered handlers. Each is cloned out of its lock before being called,
/// so a handler may replace handlers or call back into the client.
#[derive(Default)]
pub(crate) struct Callbacks {
    video: RwLock<Option<VideoCallback>>,
    audio: RwLock<Option<AudioCallback>>,
    disconnect: RwLock<Option<DisconnectCallback>>,
}

fn current<T: ?Sized>(slot: &RwLock<Option<Arc<T>>>) -> Option<Arc<T>> {
    slot.read().ok().and_then(|g| g.clone())
}

fn replace<T: ?Sized>(slot: &RwLock<Option<Arc<T>>>, value: Arc<T>) {
    match slot.write() {
        Ok(mut g) => *g = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}

impl Callbacks {
    pub(crate) fn set_video(&self, cb: VideoCallback) {
        replace(&self.video, cb);
    }

    pub(crate) fn set_audio(&self, cb: AudioCallback) {
        replace(&self.audio, cb);
    }

    pub(crate) fn set_disconnect(&self, cb: DisconnectCallback) {
        replace(&self.disconnect, cb);
    }

    pub(crate) fn on_video(&self, frame: &VideoFrame, raw: &[u8]) {
        if let Some(cb) = current(&self.video) {
            cb(frame, raw);
        }
    }

    pub(crate) fn on_audio(&self, frame: &AudioFrame, raw: &[u8]) {
        if let Some(cb) = current(&self.audio) {
            cb(frame, raw);
        }
    }

    pub(crate) fn on_disconnect(&self) {
        if let Some(cb) = current(&self.disconnect) {
            cb();
        }
    }
}
