//! Live capture stream handle
//!
//! A `CaptureStream` is a cheap, cloneable handle to one screen-share grant.
//! The platform side keeps the matching `EndedTrigger` and fires it when the
//! user revokes sharing from the browser or OS UI.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Settings the platform actually granted for the video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

struct StreamInner {
    id: String,
    settings: TrackSettings,
    ended: watch::Sender<bool>,
    stopped: AtomicBool,
}

/// Handle to a live screen stream
#[derive(Clone)]
pub struct CaptureStream {
    inner: Arc<StreamInner>,
}

/// Platform-side half used to signal that the user ended sharing
#[derive(Clone)]
pub struct EndedTrigger {
    inner: Arc<StreamInner>,
}

impl CaptureStream {
    /// Create a stream plus the trigger the platform fires on revocation
    pub fn new(settings: TrackSettings) -> (Self, EndedTrigger) {
        let (ended, _) = watch::channel(false);
        let inner = Arc::new(StreamInner {
            id: Uuid::new_v4().to_string(),
            settings,
            ended,
            stopped: AtomicBool::new(false),
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            EndedTrigger { inner },
        )
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn settings(&self) -> TrackSettings {
        self.inner.settings
    }

    /// Whether the user has revoked this share
    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    /// Resolve once the share is revoked. Returns immediately if it already was.
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail.
        let _ = rx.wait_for(|ended| *ended).await;
    }

    /// Stop all tracks. Returns `true` only for the call that did the stopping.
    pub fn stop_tracks(&self) -> bool {
        !self.inner.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("id", &self.inner.id)
            .field("settings", &self.inner.settings)
            .field("ended", &self.is_ended())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl EndedTrigger {
    /// Signal that the user revoked sharing. Only the first call has an effect.
    pub fn fire(&self) -> bool {
        let was_ended = self.inner.ended.send_replace(true);
        if !was_ended {
            tracing::info!("Capture stream {} ended by the user", self.inner.id);
        }
        !was_ended
    }
}
