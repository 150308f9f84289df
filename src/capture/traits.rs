//! Capture trait definitions
//!
//! Platform-agnostic contract for screen-share sources.

use super::stream::{CaptureStream, TrackSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while acquiring a capture source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Screen capture permission denied")]
    PermissionDenied,

    #[error("No capture source available")]
    NotAvailable,

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Requested capture quality
///
/// Targets are advisory. The platform may grant less than asked for and
/// that is never treated as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConstraints {
    /// Preferred frame width in pixels
    pub ideal_width: u32,

    /// Upper bound on frame width
    pub max_width: u32,

    /// Preferred frame height in pixels
    pub ideal_height: u32,

    /// Upper bound on frame height
    pub max_height: u32,

    /// Preferred frame rate
    pub ideal_frame_rate: u32,

    /// Upper bound on frame rate
    pub max_frame_rate: u32,

    /// Always draw the cursor into the captured frames
    pub cursor_always: bool,

    /// Capture tab/system audio alongside video
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1920,
            max_width: 3840,
            ideal_height: 1080,
            max_height: 2160,
            ideal_frame_rate: 15,
            max_frame_rate: 30,
            cursor_always: true,
            audio: false,
        }
    }
}

impl CaptureConstraints {
    /// Describe how the granted settings fall short of the ideal, if they do
    pub fn shortfall(&self, granted: &TrackSettings) -> Option<String> {
        let mut notes = Vec::new();
        if granted.width < self.ideal_width || granted.height < self.ideal_height {
            notes.push(format!(
                "resolution {}x{} (wanted {}x{})",
                granted.width, granted.height, self.ideal_width, self.ideal_height
            ));
        }
        if granted.frame_rate < self.ideal_frame_rate {
            notes.push(format!(
                "frame rate {} (wanted {})",
                granted.frame_rate, self.ideal_frame_rate
            ));
        }

        if notes.is_empty() {
            None
        } else {
            Some(notes.join(", "))
        }
    }
}

/// A platform screen-share facility
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Ask the platform for a live screen stream
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<CaptureStream, CaptureError>;

    /// Stop every track of the stream. Calling this twice is a no-op.
    fn release(&self, stream: &CaptureStream) {
        if stream.stop_tracks() {
            tracing::debug!("Released capture stream {}", stream.id());
        }
    }
}
