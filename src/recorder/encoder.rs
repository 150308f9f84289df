//! Media encoder contract
//!
//! The platform encoder turns a live stream into timed binary fragments.
//! Fragments are pushed through a `ChunkSender`; the encoder drops its
//! sender once the final fragment has been flushed after a stop request,
//! which is how the recorder learns that finalization is complete.

use crate::capture::{CaptureError, CaptureStream};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel half the encoder uses to deliver fragments
pub type ChunkSender = mpsc::UnboundedSender<Vec<u8>>;

/// Format preferences, most efficient first
pub const DEFAULT_MIME_PREFERENCES: [&str; 4] = [
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
    "video/mp4",
];

/// Type assigned to the blob when no preference was supported
pub const FALLBACK_MIME_TYPE: &str = "video/webm";

/// Recording errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
}

/// Result type alias for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// A platform media encoder
#[async_trait]
pub trait MediaEncoder: Send {
    /// Whether the encoder can produce the given MIME type
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Begin encoding `stream`, emitting a fragment every `slice`
    ///
    /// An empty `mime_type` lets the encoder pick its own default.
    async fn start(
        &mut self,
        stream: &CaptureStream,
        mime_type: &str,
        slice: Duration,
        chunks: ChunkSender,
    ) -> RecorderResult<()>;

    /// Swap the input track without interrupting the output sequence
    async fn replace_track(&mut self, stream: &CaptureStream) -> RecorderResult<()>;

    /// Flush the last fragment and drop the chunk sender
    async fn request_stop(&mut self) -> RecorderResult<()>;
}

/// Pick the first preferred MIME type the encoder supports
pub fn select_mime_type<S: AsRef<str>>(
    encoder: &dyn MediaEncoder,
    preferences: &[S],
) -> Option<String> {
    preferences
        .iter()
        .map(AsRef::as_ref)
        .find(|candidate| !candidate.is_empty() && encoder.is_type_supported(candidate))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEncoder;

    #[test]
    fn test_select_prefers_first_supported() {
        let encoder = FakeEncoder::supporting(&["video/webm;codecs=vp8", "video/webm"]);
        let picked = select_mime_type(&encoder, &DEFAULT_MIME_PREFERENCES);
        assert_eq!(picked.as_deref(), Some("video/webm;codecs=vp8"));
    }

    #[test]
    fn test_select_none_supported() {
        let encoder = FakeEncoder::supporting(&["video/x-matroska"]);
        assert!(select_mime_type(&encoder, &DEFAULT_MIME_PREFERENCES).is_none());
    }

    #[test]
    fn test_select_skips_empty_candidates() {
        let encoder = FakeEncoder::supporting(&["", "video/mp4"]);
        let prefs = vec![String::new(), "video/mp4".to_string()];
        assert_eq!(select_mime_type(&encoder, &prefs).as_deref(), Some("video/mp4"));
    }
}
